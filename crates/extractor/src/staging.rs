//! Staging directories: one uniquely named root per extraction.
//!
//! Roots live under a caller-chosen cache directory as `<cache>/<uuid>`.
//! Nothing is removed implicitly; a successful root belongs to the caller
//! until it calls [`StagingRoot::remove`], and [`sweep_stale`] clears roots
//! left behind by earlier runs.

use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// A freshly created, uniquely named extraction directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagingRoot {
    id: Uuid,
    path: PathBuf,
}

impl StagingRoot {
    /// Create a new root below `parent`, creating `parent` if needed.
    ///
    /// The root itself is created with `create_dir`, so an existing directory
    /// with the same name is an error rather than silently shared.
    pub fn create(parent: &Path) -> io::Result<Self> {
        fs::create_dir_all(parent)?;
        let id = Uuid::new_v4();
        let path = parent.join(id.to_string());
        fs::create_dir(&path)?;
        tracing::debug!(root = %path.display(), "created staging root");
        Ok(Self { id, path })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the root and everything extracted into it.
    pub fn remove(self) -> io::Result<()> {
        fs::remove_dir_all(&self.path)
    }
}

/// Remove staging roots under `parent` whose last modification is older than `max_age`.
///
/// Only directories named like a UUID are considered, so unrelated content in
/// a shared cache directory is left alone. Returns how many roots were removed.
pub fn sweep_stale(parent: &Path, max_age: Duration) -> io::Result<usize> {
    let read_dir = match fs::read_dir(parent) {
        Ok(rd) => rd,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let now = SystemTime::now();
    let mut removed = 0;

    for entry_result in read_dir {
        let entry = entry_result?;
        let name = entry.file_name();
        let is_root = name
            .to_str()
            .map(|n| Uuid::parse_str(n).is_ok())
            .unwrap_or(false);
        if !is_root {
            continue;
        }

        let metadata = entry.metadata()?;
        if !metadata.is_dir() {
            continue;
        }

        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or(Duration::ZERO);

        if age >= max_age {
            match fs::remove_dir_all(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::warn!(root = %entry.path().display(), "failed to sweep staging root: {}", e);
                }
            }
        }
    }

    Ok(removed)
}
