//! Navigation over an extracted staging root.
//!
//! The browser never leaves the root it was opened on: names are resolved
//! one component at a time and "up" stops at the root.

use crate::mime;
use crate::staging::StagingRoot;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum BrowseError {
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Not a file: {0}")]
    NotAFile(String),

    #[error("Invalid entry name: {0}")]
    InvalidName(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

/// One row of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserEntry {
    pub name: String,
    /// Absolute path on disk
    pub path: PathBuf,
    /// Path relative to the staging root
    pub relative_path: PathBuf,
    pub is_directory: bool,
    pub size: Option<u64>,
    /// Content type, for files only
    pub mime_type: Option<String>,
}

/// A file picked by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    /// Absolute path of the selected file
    pub path: PathBuf,
    pub mime_type: String,
}

/// Directory cursor confined to one staging root.
#[derive(Debug, Clone)]
pub struct StagingBrowser {
    root: PathBuf,
    current: PathBuf,
}

impl StagingBrowser {
    pub fn new(root: &StagingRoot) -> Self {
        Self::at(root.path())
    }

    /// Open a browser on any directory, treating it as the root.
    pub fn at(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            current: root.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn current(&self) -> &Path {
        &self.current
    }

    pub fn is_at_root(&self) -> bool {
        self.current == self.root
    }

    /// Current directory relative to the root (empty at the root).
    pub fn relative_current(&self) -> &Path {
        self.current.strip_prefix(&self.root).unwrap_or(Path::new(""))
    }

    /// Entries of the current directory: directories first, then by name ignoring case.
    pub fn list(&self) -> Result<Vec<BrowserEntry>, BrowseError> {
        let mut entries = Vec::new();

        for entry_result in fs::read_dir(&self.current)? {
            let entry = match entry_result {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("skipping entry due to error: {}", e);
                    continue;
                }
            };

            let path = entry.path();
            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "skipping entry due to metadata error: {}", e);
                    continue;
                }
            };

            entries.push(self.entry_for(path, metadata.is_dir(), metadata.len()));
        }

        entries.sort_by(compare_entries);
        Ok(entries)
    }

    /// Descend into the subdirectory `name` of the current directory.
    pub fn enter(&mut self, name: &str) -> Result<(), BrowseError> {
        let target = self.child(name)?;
        if !fs::symlink_metadata(&target)?.is_dir() {
            return Err(BrowseError::NotADirectory(name.to_string()));
        }
        self.current = target;
        Ok(())
    }

    /// Move to the parent directory. Returns `false` when already at the root.
    pub fn navigate_up(&mut self) -> bool {
        if self.is_at_root() {
            return false;
        }
        match self.current.parent() {
            Some(parent) if parent.starts_with(&self.root) => {
                self.current = parent.to_path_buf();
                true
            }
            _ => {
                self.current = self.root.clone();
                true
            }
        }
    }

    /// Pick the file `name` in the current directory.
    pub fn select(&self, name: &str) -> Result<Selection, BrowseError> {
        let target = self.child(name)?;
        if !fs::symlink_metadata(&target)?.is_file() {
            return Err(BrowseError::NotAFile(name.to_string()));
        }
        let mime_type = mime::resolve_path(&target);
        tracing::debug!(path = %target.display(), mime_type = %mime_type, "selected file");
        Ok(Selection {
            path: target,
            mime_type,
        })
    }

    /// Resolve a path relative to the root, one component at a time.
    pub fn select_relative(&self, relative: &Path) -> Result<Selection, BrowseError> {
        let mut browser = Self::at(&self.root);
        let mut components = relative.components().peekable();

        while let Some(component) = components.next() {
            let Component::Normal(part) = component else {
                return Err(BrowseError::InvalidName(relative.display().to_string()));
            };
            let name = part.to_string_lossy();
            if components.peek().is_some() {
                browser.enter(&name)?;
            } else {
                return browser.select(&name);
            }
        }

        Err(BrowseError::InvalidName(relative.display().to_string()))
    }

    /// Every entry below the root, depth first, each level ordered like [`list`](Self::list).
    pub fn walk(&self) -> Result<Vec<BrowserEntry>, BrowseError> {
        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .follow_links(false)
            .sort_by(|a, b| {
                let a_dir = a.file_type().is_dir();
                let b_dir = b.file_type().is_dir();
                order_names(
                    a_dir,
                    &a.file_name().to_string_lossy(),
                    b_dir,
                    &b.file_name().to_string_lossy(),
                )
            });

        let mut entries = Vec::new();
        for entry in walker {
            let entry = entry?;
            let is_directory = entry.file_type().is_dir();
            let size = if is_directory { 0 } else { entry.metadata()?.len() };
            entries.push(self.entry_for(entry.into_path(), is_directory, size));
        }
        Ok(entries)
    }

    fn child(&self, name: &str) -> Result<PathBuf, BrowseError> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) => Ok(self.current.join(part)),
            _ => Err(BrowseError::InvalidName(name.to_string())),
        }
    }

    fn entry_for(&self, path: PathBuf, is_directory: bool, len: u64) -> BrowserEntry {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let relative_path = path
            .strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| PathBuf::from(&name));

        BrowserEntry {
            name,
            relative_path,
            is_directory,
            size: (!is_directory).then_some(len),
            mime_type: (!is_directory).then(|| mime::resolve_path(&path)),
            path,
        }
    }
}

fn compare_entries(a: &BrowserEntry, b: &BrowserEntry) -> Ordering {
    order_names(a.is_directory, &a.name, b.is_directory, &b.name)
}

fn order_names(a_dir: bool, a_name: &str, b_dir: bool, b_name: &str) -> Ordering {
    match (a_dir, b_dir) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a_name.to_lowercase().cmp(&b_name.to_lowercase()),
    }
}
