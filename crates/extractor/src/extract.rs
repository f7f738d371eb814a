//! Streaming extraction of a ZIP archive into a fresh staging root.

use crate::crypto::ZipCryptoKeys;
use crate::error::ExtractError;
use crate::header::LocalFileHeader;
use crate::password::{PasswordOracle, PasswordSlot};
use crate::safety::{check_size_limits, resolve_within, sanitize_entry_path};
use crate::staging::StagingRoot;
use crate::stream::{check_supported, ZipStream};
use crate::types::{ExtractOptions, ExtractStats, Extraction};
use crate::ProgressCallback;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// Extract every file entry of a ZIP stream below a new staging root in `staging_parent`.
///
/// This function performs secure extraction with the following features:
/// - Entry names are sanitized; a traversal attempt fails the whole extraction
/// - Size limit enforcement
/// - Progress tracking with cancellation support
/// - The password is requested from `oracle` at most once, and only when an
///   encrypted entry actually has to be decoded
///
/// Directory entries are not materialized; directories only exist as parents
/// of extracted files. On success the staging root belongs to the caller. On
/// failure the partially written root is removed.
pub fn extract_stream<R, O>(
    source: R,
    staging_parent: &Path,
    oracle: O,
    options: &ExtractOptions,
    progress_cb: &ProgressCallback,
    cancel_flag: Arc<AtomicBool>,
) -> Result<Extraction, ExtractError>
where
    R: Read,
    O: PasswordOracle,
{
    let start_time = Instant::now();
    let mut staging = None;

    let result = extract_entries(
        source,
        staging_parent,
        oracle,
        options,
        progress_cb,
        &cancel_flag,
        &mut staging,
    );

    match result {
        Ok(mut stats) => {
            // An archive without file entries still yields an (empty) root.
            let root = match staging {
                Some(root) => root,
                None => StagingRoot::create(staging_parent)?,
            };
            stats.duration = start_time.elapsed();
            tracing::info!(
                root = %root.path().display(),
                files = stats.files_extracted,
                bytes = stats.bytes_written,
                "extraction complete"
            );
            Ok(Extraction { root, stats })
        }
        Err(e) => {
            if let Some(root) = staging {
                discard_partial(root);
            }
            Err(e)
        }
    }
}

fn extract_entries<R, O>(
    source: R,
    staging_parent: &Path,
    oracle: O,
    options: &ExtractOptions,
    progress_cb: &ProgressCallback,
    cancel_flag: &AtomicBool,
    staging: &mut Option<StagingRoot>,
) -> Result<ExtractStats, ExtractError>
where
    R: Read,
    O: PasswordOracle,
{
    let buffer_size = options.buffer_size.max(1);
    let mut stream = ZipStream::with_capacity(buffer_size, source);
    let mut passwords = PasswordSlot::new(oracle);
    let mut buf = vec![0u8; buffer_size];
    let mut stats = ExtractStats::default();
    let mut delay_pending = !options.progress_delay.is_zero();

    while let Some(header) = stream.next_entry()? {
        if cancel_flag.load(Ordering::Relaxed) {
            return Err(ExtractError::Cancelled);
        }

        if header.is_directory() {
            tracing::debug!(entry = %header.file_name, "skipping directory entry");
            if !stream.skip_entry(&header)? {
                // Compressed payload of unknown size: decode to find its end.
                let keys = entry_keys(&header, &mut passwords)?;
                stream.copy_entry(&header, keys, &mut buf, |_| Ok(()))?;
            }
            continue;
        }

        check_supported(&header)?;
        let relative = sanitize_entry_path(&header.file_name)?;
        let keys = entry_keys(&header, &mut passwords)?;

        let root_path = staging_root_path(staging, staging_parent)?;
        let destination = resolve_within(&root_path, &relative)?;
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(&destination)?;

        if delay_pending {
            thread::sleep(options.progress_delay);
            delay_pending = false;
        }

        tracing::debug!(entry = %header.file_name, "extracting");
        let written_before = stats.bytes_written;
        stream.copy_entry(&header, keys, &mut buf, |chunk| {
            if cancel_flag.load(Ordering::Relaxed) {
                return Err(ExtractError::Cancelled);
            }

            let new_total = stats.bytes_written + chunk.len() as u64;
            if !check_size_limits(new_total, options.size_limit_bytes) {
                return Err(ExtractError::SizeLimitExceeded {
                    current: new_total,
                    limit: options.size_limit_bytes.unwrap_or(0),
                });
            }

            file.write_all(chunk)?;
            stats.bytes_written = new_total;
            Ok(())
        })?;
        file.flush()?;

        stats.files_extracted += 1;

        let continue_extraction = progress_cb(
            &relative.to_string_lossy(),
            stats.bytes_written,
            Some(stats.bytes_written - written_before),
        );
        if !continue_extraction {
            return Err(ExtractError::Cancelled);
        }
    }

    Ok(stats)
}

/// Keys for an encrypted entry, obtaining the archive password on first use.
fn entry_keys<O: PasswordOracle>(
    header: &LocalFileHeader,
    passwords: &mut PasswordSlot<O>,
) -> Result<Option<ZipCryptoKeys>, ExtractError> {
    if !header.is_encrypted() {
        return Ok(None);
    }
    let password = passwords.get()?;
    Ok(Some(ZipCryptoKeys::derive(password.as_bytes())))
}

/// Path of the staging root, creating it when the first file is about to be written.
fn staging_root_path(
    staging: &mut Option<StagingRoot>,
    staging_parent: &Path,
) -> io::Result<PathBuf> {
    if let Some(root) = staging.as_ref() {
        return Ok(root.path().to_path_buf());
    }
    let root = StagingRoot::create(staging_parent)?;
    let path = root.path().to_path_buf();
    *staging = Some(root);
    Ok(path)
}

fn discard_partial(root: StagingRoot) {
    let path = root.path().to_path_buf();
    match root.remove() {
        Ok(()) => tracing::debug!(root = %path.display(), "removed partial staging root"),
        Err(e) => {
            tracing::warn!(root = %path.display(), "failed to remove partial staging root: {}", e)
        }
    }
}
