//! Decoded attachment parts.

/// One message part whose content-disposition is `attachment`.
///
/// The filename comes straight from the message headers and is untrusted;
/// it must be sanitized before being used as a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Filename from `Content-Disposition` (or `Content-Type` `name=`), if any.
    pub filename: Option<String>,

    /// MIME content type (e.g. `"application/zip"`).
    pub content_type: String,

    /// Decoded content (transfer encoding already removed).
    pub contents: Vec<u8>,
}

impl Attachment {
    /// Size of the decoded content in bytes.
    pub fn size(&self) -> u64 {
        self.contents.len() as u64
    }
}
