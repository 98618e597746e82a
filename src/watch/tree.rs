//! Walking the monitored tree and remembering which files it holds
//!
//! A directory that is moved into the root, renamed or removed arrives as a
//! single watch event for the directory. Walks expand additions into their
//! files; [`KnownFiles`] expands removals into tombstones for the files that
//! used to be beneath it.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use walkdir::WalkDir;

use super::ignore::PathFilter;
use super::relative_path;

/// Files found under one directory of the root
#[derive(Debug, Clone, Default)]
pub struct TreeListing {
    /// Eligible files as (relative, absolute), sorted by relative path
    pub files: Vec<(String, PathBuf)>,
    pub ignored: Vec<String>,
    pub errors: Vec<(String, String)>,
}

/// Walk `start` (the root or a directory beneath it) recursively.
///
/// `.git` directories are pruned; every other file is checked against the
/// filter with root-relative paths. Blocking.
pub fn list_files(root: &Path, start: &Path, filter: &PathFilter) -> TreeListing {
    let mut listing = TreeListing::default();

    let walker = WalkDir::new(start)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || entry.file_name() != ".git");

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e
                    .path()
                    .and_then(|p| relative_path(root, p))
                    .unwrap_or_else(|| start.display().to_string());
                tracing::warn!("Skipping unreadable entry {}: {}", path, e);
                listing.errors.push((path, e.to_string()));
                continue;
            }
        };

        if entry.file_type().is_dir() {
            continue;
        }
        let Some(relative) = relative_path(root, entry.path()) else {
            continue;
        };

        if filter.is_ignored(root, &relative) {
            listing.ignored.push(relative);
            continue;
        }
        listing.files.push((relative, entry.into_path()));
    }

    listing
}

/// Root-relative paths of files seen on disk during a session.
///
/// Only files are tracked, never directories. Cloning yields another handle
/// to the same set.
#[derive(Debug, Clone, Default)]
pub struct KnownFiles {
    inner: Arc<Mutex<BTreeSet<String>>>,
}

impl KnownFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, relative_path: impl Into<String>) {
        self.inner.lock().insert(relative_path.into());
    }

    pub fn contains(&self, relative_path: &str) -> bool {
        self.inner.lock().contains(relative_path)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Forget `relative_path` and every file beneath it.
    ///
    /// Returns the forgotten paths in order; empty when nothing was known,
    /// including for directories that never held an eligible file.
    pub fn remove_tree(&self, relative_path: &str) -> Vec<String> {
        let mut known = self.inner.lock();
        let prefix = format!("{}/", relative_path);

        let mut removed: Vec<String> = known
            .range(prefix.clone()..)
            .take_while(|path| path.starts_with(&prefix))
            .cloned()
            .collect();
        for path in &removed {
            known.remove(path);
        }

        if known.remove(relative_path) {
            removed.insert(0, relative_path.to_string());
        }
        removed
    }
}
