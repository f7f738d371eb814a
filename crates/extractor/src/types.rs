//! Type definitions for archive extraction.

use crate::staging::StagingRoot;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Compression method recorded in a local file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Bzip2,
    /// AES marker method (99); the real method lives in the extra field.
    Aes,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            12 => CompressionMethod::Bzip2,
            99 => CompressionMethod::Aes,
            _ => CompressionMethod::Unknown(value),
        }
    }
}

/// Metadata for a single entry, as read from its local file header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryHeader {
    /// Path of the entry within the archive (slash separated, untrusted)
    pub path: String,

    /// Whether this entry is a directory marker
    pub is_directory: bool,

    /// Whether the entry payload is encrypted
    pub is_encrypted: bool,

    /// How the payload is compressed
    pub method: CompressionMethod,

    /// Compressed size in bytes, unknown when a data descriptor follows the payload
    pub compressed_size: Option<u64>,

    /// Uncompressed size in bytes, unknown when a data descriptor follows the payload
    pub uncompressed_size: Option<u64>,
}

/// Options for extracting an archive.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Maximum total extracted size in bytes (default: 20 GB)
    pub size_limit_bytes: Option<u64>,

    /// Chunk size used when copying decoded entry data to disk
    pub buffer_size: usize,

    /// Minimum pause before the first byte is written, so a progress
    /// indicator is visible even for tiny archives
    pub progress_delay: Duration,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            size_limit_bytes: Some(20 * 1024 * 1024 * 1024), // 20 GB
            buffer_size: 4096,
            progress_delay: Duration::ZERO,
        }
    }
}

/// Statistics about a completed extraction operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractStats {
    /// Number of files successfully extracted
    pub files_extracted: u64,

    /// Total bytes written to disk
    pub bytes_written: u64,

    /// Duration of the extraction operation (in seconds)
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

impl Default for ExtractStats {
    fn default() -> Self {
        Self {
            files_extracted: 0,
            bytes_written: 0,
            duration: Duration::from_secs(0),
        }
    }
}

/// A finished extraction: the staged tree and how it was produced.
#[derive(Debug)]
pub struct Extraction {
    pub root: StagingRoot,
    pub stats: ExtractStats,
}

// Helper module for Duration serialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
