//! # zipstage
//!
//! Streaming extraction of ZIP archives into per-session staging directories.
//!
//! The archive is read strictly front to back from any [`std::io::Read`]
//! source, so it works on pipes and content streams that cannot seek. Every
//! extraction lands in its own UUID-named directory below a cache directory
//! chosen by the caller.
//!
//! ## Features
//!
//! - Stored, Deflate and Bzip2 entries, including ZIP64 sizes and data descriptors
//! - Traditional PKWARE (ZipCrypto) encryption, with the password requested
//!   lazily and at most once through a [`PasswordOracle`]
//! - Zip-slip protection: entries that would escape the staging root fail the extraction
//! - CRC-32 and size verification, size limits, progress and cancellation
//!
//! ## Example
//!
//! ```rust,no_run
//! use zipstage::{extract, probe, ExtractOptions, NoPassword};
//! use std::fs::File;
//! use std::path::Path;
//! use std::sync::atomic::AtomicBool;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Look at the first entry
//! if let Some(entry) = probe(Path::new("archive.zip"))? {
//!     println!("First entry: {} (encrypted: {})", entry.path, entry.is_encrypted);
//! }
//!
//! let options = ExtractOptions::default();
//! let cancel_flag = Arc::new(AtomicBool::new(false));
//! let progress_cb = |file: &str, bytes: u64, _total: Option<u64>| {
//!     println!("Extracting: {} ({} bytes)", file, bytes);
//!     true // Continue extraction
//! };
//!
//! let extraction = extract(
//!     File::open("archive.zip")?,
//!     Path::new("cache"),
//!     NoPassword,
//!     &options,
//!     &progress_cb,
//!     cancel_flag,
//! )?;
//!
//! println!(
//!     "Extracted {} files into {}",
//!     extraction.stats.files_extracted,
//!     extraction.root.path().display()
//! );
//! # Ok(())
//! # }
//! ```

pub mod browse;
mod cp437;
pub mod crypto;
pub mod error;
pub mod extract;
pub mod header;
pub mod mime;
pub mod password;
pub mod probe;
pub mod safety;
pub mod session;
pub mod staging;
pub mod stream;
pub mod types;

// Re-export main types
pub use browse::{BrowseError, BrowserEntry, Selection, StagingBrowser};
pub use error::{ErrorKind, ExtractError, SecurityError};
pub use password::{ChannelOracle, NoPassword, Password, PasswordOracle, PasswordRequest};
pub use session::{ArchiveSource, ExtractRequest, ExtractionSession, SessionUi, ZIP_CONTENT_TYPE};
pub use staging::{sweep_stale, StagingRoot};
pub use types::{CompressionMethod, EntryHeader, ExtractOptions, ExtractStats, Extraction};

use std::io::Read;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Type alias for progress callback functions.
///
/// The callback receives:
/// - `file`: The file just written, relative to the staging root
/// - `bytes_written`: Number of bytes written so far, across all files
/// - `total_bytes`: Size of that file
///
/// Returns `true` to continue extraction, `false` to cancel.
pub type ProgressCallback = dyn Fn(&str, u64, Option<u64>) -> bool + Send + Sync;

/// Read the first entry header of the archive at `path`.
///
/// Returns `None` for an archive without entries.
pub fn probe(path: &Path) -> Result<Option<EntryHeader>, ExtractError> {
    probe::probe_path(path)
}

/// Extract a ZIP stream into a new staging root below `staging_parent`.
///
/// # Errors
///
/// Returns an error if:
/// - The stream is not a ZIP archive, or ends early
/// - An entry is corrupted, fails its checksum, or uses an unsupported method
/// - Security violations are detected (path traversal, size limits)
/// - A password is required and not supplied, or is incorrect
/// - Extraction is cancelled
/// - I/O errors occur
pub fn extract<R: Read, O: PasswordOracle>(
    source: R,
    staging_parent: &Path,
    oracle: O,
    options: &ExtractOptions,
    progress_cb: &ProgressCallback,
    cancel_flag: Arc<AtomicBool>,
) -> Result<Extraction, ExtractError> {
    extract::extract_stream(source, staging_parent, oracle, options, progress_cb, cancel_flag)
}
