//! Error types for archive extraction operations.

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Main error type for extraction operations.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The stream does not start with a record this reader understands.
    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    /// The stream ended before a header or entry was complete.
    #[error("Archive truncated: {0}")]
    Truncated(String),

    /// An encrypted entry was met and the password prompt was dismissed.
    #[error("Password required")]
    PasswordRequired,

    /// The supplied password does not match the entry's encryption header.
    #[error("Invalid password for entry: {0}")]
    InvalidPassword(String),

    /// The entry uses a compression method or encryption scheme that is not handled.
    #[error("Unsupported entry {entry}: {reason}")]
    UnsupportedEntry {
        /// Entry path as stored in the archive
        entry: String,
        /// What made the entry unreadable
        reason: String,
    },

    /// Compressed data could not be decoded.
    #[error("Corrupted archive: {0}")]
    Corrupted(String),

    /// The decoded entry does not match its recorded CRC-32 or size.
    #[error("Checksum mismatch for entry: {0}")]
    ChecksumMismatch(String),

    /// A security violation was detected during extraction.
    #[error("Security violation: {0}")]
    Security(#[from] SecurityError),

    /// The extraction size limit was exceeded.
    #[error("Size limit exceeded: {current} bytes > {limit} bytes")]
    SizeLimitExceeded {
        /// Current extracted size in bytes
        current: u64,
        /// Configured size limit in bytes
        limit: u64,
    },

    /// The session was asked to open something that is not a ZIP archive.
    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// An I/O error occurred during extraction.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The extraction was cancelled by the user.
    #[error("Cancelled by user")]
    Cancelled,
}

/// Security-related errors during extraction.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// Path traversal attempt detected (e.g., "../../../etc/passwd").
    #[error("Path traversal attempt: {0}")]
    PathTraversal(String),

    /// Absolute path not allowed in archive entries.
    #[error("Absolute path not allowed: {0}")]
    AbsolutePath(String),

    /// Entry name that cannot be represented as a file name.
    #[error("Invalid entry name: {0}")]
    InvalidName(String),
}

/// Coarse failure category reported to callers of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MalformedHeader,
    Truncated,
    PasswordRequired,
    ExtractionFailed,
    IoError,
    Cancelled,
    InvalidRequest,
}

impl ExtractError {
    /// Category of this error in the session-level taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractError::MalformedHeader(_) => ErrorKind::MalformedHeader,
            ExtractError::Truncated(_) => ErrorKind::Truncated,
            ExtractError::PasswordRequired => ErrorKind::PasswordRequired,
            ExtractError::InvalidPassword(_)
            | ExtractError::UnsupportedEntry { .. }
            | ExtractError::Corrupted(_)
            | ExtractError::ChecksumMismatch(_)
            | ExtractError::Security(_)
            | ExtractError::SizeLimitExceeded { .. } => ErrorKind::ExtractionFailed,
            ExtractError::UnsupportedContentType(_) => ErrorKind::InvalidRequest,
            ExtractError::Io(_) => ErrorKind::IoError,
            ExtractError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Classify an error raised while pulling decoded bytes out of an entry.
    ///
    /// Decoders report bad input as `InvalidInput`/`InvalidData`, and a source
    /// that ends early surfaces as `UnexpectedEof`.
    pub(crate) fn from_entry_read(entry: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => {
                ExtractError::Truncated(format!("{}: {}", entry, err))
            }
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => {
                ExtractError::Corrupted(format!("{}: {}", entry, err))
            }
            _ => ExtractError::Io(err),
        }
    }
}
