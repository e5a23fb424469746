//! Centralized error types for mailharvest.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mailharvest library.
#[derive(Error, Debug)]
pub enum HarvestError {
    /// A required setting is absent or unusable.
    #[error("Missing or invalid configuration '{key}': {hint}")]
    Config { key: String, hint: String },

    /// The mail session could not be established or authenticated.
    #[error("Could not connect to '{server}': {reason}")]
    Connection { server: String, reason: String },

    /// A protocol-level failure inside an established session.
    #[error("IMAP error: {0}")]
    Imap(#[from] imap::Error),

    /// The raw message could not be decoded.
    #[error("MIME decoding error: {0}")]
    Mime(String),

    /// The archive is corrupt or not a zip file.
    #[error("Could not extract archive '{path}': {source}")]
    Extraction {
        path: PathBuf,
        source: zip::result::ZipError,
    },

    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The destination already holds a file and the conflict policy forbids replacing it.
    #[error("Destination already exists: {0}")]
    Conflict(PathBuf),
}

/// Convenience alias for `Result<T, HarvestError>`.
pub type Result<T> = std::result::Result<T, HarvestError>;

impl HarvestError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a `Config` variant for a missing or unusable key.
    pub fn config(key: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::Config {
            key: key.into(),
            hint: hint.into(),
        }
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Imap(_))
    }

    /// Fatal errors stop the run; everything else is recovered per message or per attachment.
    pub fn is_fatal(&self) -> bool {
        self.is_config() || self.is_connection()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(HarvestError::config("imap.server", "set EMAIL_SERVER").is_fatal());
        assert!(HarvestError::Connection {
            server: "mail.example.com".into(),
            reason: "refused".into(),
        }
        .is_fatal());
        assert!(!HarvestError::Mime("bad".into()).is_fatal());
        assert!(!HarvestError::Conflict(PathBuf::from("a.js")).is_fatal());
        assert!(!HarvestError::io("x", std::io::Error::other("boom")).is_fatal());
    }

    #[test]
    fn test_display_includes_context() {
        let err = HarvestError::config("imap.username", "set EMAIL_USER");
        let msg = err.to_string();
        assert!(msg.contains("imap.username"));
        assert!(msg.contains("EMAIL_USER"));
    }
}
