//! Mail sources: where raw messages come from.
//!
//! [`imap::ImapSource`] talks to a server; [`local::EmlDirSource`] reads a
//! directory of `.eml` files so the same pipeline can run offline.

pub mod imap;
pub mod local;

use std::fmt;

use crate::error::Result;

/// Opaque message identifier, valid only within the session that issued it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageRef(pub String);

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A session that can enumerate and fetch raw messages.
pub trait MailSource {
    /// Every message currently in the selected folder. No filtering.
    fn list(&mut self) -> Result<Vec<MessageRef>>;

    /// Complete raw bytes of one message.
    fn fetch(&mut self, id: &MessageRef) -> Result<Vec<u8>>;

    /// End the session. Called once, after processing, even on failure.
    fn close(&mut self) -> Result<()>;
}
