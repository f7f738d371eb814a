//! Security and safety checks for archive extraction.
//!
//! Entry names come straight out of the archive and are untrusted. They are
//! turned into relative paths segment by segment so that nothing can be
//! written outside the staging root (zip-slip).

use crate::error::SecurityError;
use std::path::{Component, Path, PathBuf};

/// Validates an archive entry name and turns it into a relative path.
///
/// The name is split on both `/` and `\`. Empty and `.` segments are dropped.
/// The following are rejected:
/// - a leading separator (absolute path)
/// - a drive prefix such as `C:`
/// - any `..` segment
/// - NUL bytes
/// - a name that normalizes to nothing
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use zipstage::safety::sanitize_entry_path;
///
/// let safe_path = sanitize_entry_path("dir/file.txt").unwrap();
/// assert_eq!(safe_path, Path::new("dir/file.txt"));
///
/// assert!(sanitize_entry_path("../../etc/passwd").is_err());
/// assert!(sanitize_entry_path("/etc/passwd").is_err());
/// ```
pub fn sanitize_entry_path(name: &str) -> Result<PathBuf, SecurityError> {
    if name.starts_with('/') || name.starts_with('\\') {
        return Err(SecurityError::AbsolutePath(name.to_string()));
    }

    if name.contains('\0') {
        return Err(SecurityError::InvalidName(name.to_string()));
    }

    let mut normalized = PathBuf::new();

    for segment in name.split(['/', '\\']) {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(SecurityError::PathTraversal(format!(
                    "Path contains '..' component: {}",
                    name
                )));
            }
            _ if is_drive_prefix(segment) => {
                return Err(SecurityError::AbsolutePath(name.to_string()));
            }
            _ => {}
        }

        // A segment must stay a single plain component on this platform.
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) => normalized.push(part),
            _ => {
                return Err(SecurityError::InvalidName(name.to_string()));
            }
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(SecurityError::InvalidName(format!(
            "Path normalizes to empty: {:?}",
            name
        )));
    }

    Ok(normalized)
}

/// `C:` style prefixes, which would make the joined path absolute on Windows.
fn is_drive_prefix(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Joins a sanitized relative path onto `root` and double checks the result stays below it.
pub fn resolve_within(root: &Path, relative: &Path) -> Result<PathBuf, SecurityError> {
    let joined = root.join(relative);
    if relative.is_absolute() || !joined.starts_with(root) {
        return Err(SecurityError::PathTraversal(relative.display().to_string()));
    }
    Ok(joined)
}

/// Checks if the current extracted size exceeds the configured limit.
///
/// # Examples
///
/// ```
/// use zipstage::safety::check_size_limits;
///
/// assert!(check_size_limits(1000, Some(2000)));
/// assert!(!check_size_limits(3000, Some(2000)));
/// assert!(check_size_limits(999_999_999, None));
/// ```
pub fn check_size_limits(current_bytes: u64, limit: Option<u64>) -> bool {
    limit.map_or(true, |max_bytes| current_bytes <= max_bytes)
}
