//! Filesystem watch source
//!
//! Wraps a `notify` watcher in a [`Stream`] of [`WatchEvent`]s and folds
//! them into the ledger. Only changes after the watch starts are reported;
//! uploading pre-existing files is the bulk importer's job. Dropping the
//! stream drops the watcher, which closes the OS-level watch handle.

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::ignore::PathFilter;
use super::ledger::ChangeLedger;
use super::relative_path;
use super::tree::{list_files, KnownFiles, TreeListing};
use crate::error::{ChronicleError, Result};
use crate::types::{ChangeKind, ChangeRecord, PendingContent, WatchEvent};

/// Lazy, infinite stream of events under one directory
pub struct WatchStream {
    root: PathBuf,
    events: UnboundedReceiverStream<WatchEvent>,
    _watcher: Box<dyn Watcher + Send>,
}

impl WatchStream {
    /// Start watching `root` recursively
    pub fn watch(root: &Path) -> Result<Self> {
        let root = root.canonicalize().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ChronicleError::DirectoryNotFound(root.display().to_string())
            } else {
                ChronicleError::Io(e)
            }
        })?;
        if !root.is_dir() {
            return Err(ChronicleError::DirectoryNotFound(
                root.display().to_string(),
            ));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            match result {
                Ok(event) => {
                    for watch_event in map_event(&event) {
                        // Receiver gone means the session is shutting down
                        if tx.send(watch_event).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => tracing::warn!("File watcher error: {}", e),
            }
        })?;
        watcher.watch(&root, RecursiveMode::Recursive)?;

        tracing::info!("Watching {}", root.display());

        Ok(Self {
            root,
            events: UnboundedReceiverStream::new(rx),
            _watcher: Box::new(watcher),
        })
    }

    /// Canonical monitored root
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Stream for WatchStream {
    type Item = WatchEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}

/// Translate a raw notify event into zero or more watch events
pub fn map_event(event: &Event) -> Vec<WatchEvent> {
    let each = |kind: ChangeKind| -> Vec<WatchEvent> {
        event
            .paths
            .iter()
            .map(|p| WatchEvent::new(kind, p.clone()))
            .collect()
    };

    match &event.kind {
        EventKind::Create(_) => each(ChangeKind::Added),
        EventKind::Remove(_) => each(ChangeKind::Removed),
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => each(ChangeKind::Removed),
            RenameMode::To => each(ChangeKind::Added),
            RenameMode::Both => {
                let mut out = Vec::with_capacity(2);
                if let Some(from) = event.paths.first() {
                    out.push(WatchEvent::new(ChangeKind::Removed, from.clone()));
                }
                if let Some(to) = event.paths.get(1) {
                    out.push(WatchEvent::new(ChangeKind::Added, to.clone()));
                }
                out
            }
            _ => event
                .paths
                .iter()
                .map(|p| {
                    let kind = if p.exists() {
                        ChangeKind::Added
                    } else {
                        ChangeKind::Removed
                    };
                    WatchEvent::new(kind, p.clone())
                })
                .collect(),
        },
        EventKind::Modify(_) => each(ChangeKind::Modified),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

/// Folds watch events for one root into its ledger.
///
/// Cloning yields another handle to the same ledger and known-file set.
#[derive(Debug, Clone)]
pub struct Ingestor {
    root: PathBuf,
    ledger: ChangeLedger,
    filter: PathFilter,
    known: KnownFiles,
}

impl Ingestor {
    pub fn new(root: impl Into<PathBuf>, ledger: ChangeLedger, filter: PathFilter) -> Self {
        Self {
            root: root.into(),
            ledger,
            filter,
            known: KnownFiles::new(),
        }
    }

    pub fn known(&self) -> &KnownFiles {
        &self.known
    }

    /// Remember every eligible file already on disk, so removing a directory
    /// that predates the watch still reaches its files. Returns the count.
    pub async fn scan(&self) -> Result<usize> {
        let listing = self.list(self.root.clone()).await?;
        for (relative, _) in listing.files {
            self.known.insert(relative);
        }
        tracing::debug!(
            "{} files known under {}",
            self.known.len(),
            self.root.display()
        );
        Ok(self.known.len())
    }

    /// Fold one event into the ledger unless it is ignored.
    ///
    /// A directory that appears is walked and each eligible file recorded; a
    /// path that disappears yields tombstones for every known file at or
    /// beneath it. Returns the records that were stored. Never touches the
    /// network.
    pub async fn ingest(&self, event: &WatchEvent) -> Vec<ChangeRecord> {
        let Some(relative) = relative_path(&self.root, &event.absolute_path) else {
            return Vec::new();
        };
        if self.filter.is_ignored_at_root(&self.root, &relative) {
            tracing::debug!("Ignored change: {}", relative);
            return Vec::new();
        }

        let records = match event.kind {
            ChangeKind::Removed => self.removed(&relative),
            ChangeKind::Added | ChangeKind::Modified => {
                match tokio::fs::metadata(&event.absolute_path).await {
                    Ok(meta) if meta.is_dir() => match event.kind {
                        ChangeKind::Added => self.directory_added(&event.absolute_path).await,
                        _ => Vec::new(),
                    },
                    Ok(_) => self.read_file(relative, &event.absolute_path).await,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => self.removed(&relative),
                    Err(e) => {
                        tracing::warn!("Could not stat {}: {}", event.absolute_path.display(), e);
                        Vec::new()
                    }
                }
            }
        };

        for record in &records {
            tracing::info!(
                "Change detected: {} ({:?})",
                record.relative_path,
                event.kind
            );
            self.ledger.record(record.clone());
        }
        records
    }

    /// Drive a watch stream into the ledger until the stream ends
    pub async fn run(self, mut stream: WatchStream) {
        while let Some(event) = stream.next().await {
            self.ingest(&event).await;
        }
        tracing::info!("Watch on {} closed", self.root.display());
    }

    async fn read_file(&self, relative: String, absolute: &Path) -> Vec<ChangeRecord> {
        match tokio::fs::read(absolute).await {
            Ok(bytes) => {
                self.known.insert(relative.clone());
                vec![ChangeRecord::new(relative, PendingContent::Text(decode_text(bytes)))]
            }
            // Deleted again before we got to it
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => self.removed(&relative),
            Err(e) => {
                tracing::warn!("Could not read {}: {}", absolute.display(), e);
                Vec::new()
            }
        }
    }

    async fn directory_added(&self, directory: &Path) -> Vec<ChangeRecord> {
        let listing = match self.list(directory.to_path_buf()).await {
            Ok(listing) => listing,
            Err(e) => {
                tracing::warn!("Could not walk {}: {}", directory.display(), e);
                return Vec::new();
            }
        };

        let mut records = Vec::with_capacity(listing.files.len());
        for (relative, absolute) in listing.files {
            records.extend(self.read_file(relative, &absolute).await);
        }
        records
    }

    fn removed(&self, relative: &str) -> Vec<ChangeRecord> {
        self.known
            .remove_tree(relative)
            .into_iter()
            .map(ChangeRecord::tombstone)
            .collect()
    }

    async fn list(&self, start: PathBuf) -> Result<TreeListing> {
        let root = self.root.clone();
        let filter = self.filter.clone();
        tokio::task::spawn_blocking(move || list_files(&root, &start, &filter))
            .await
            .map_err(|e| ChronicleError::Internal(format!("tree walk panicked: {}", e)))
    }
}

/// Text is assumed; invalid UTF-8 is replaced rather than rejected
pub(crate) fn decode_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind};
    use tempfile::tempdir;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut ev = Event::new(kind);
        for p in paths {
            ev = ev.add_path(PathBuf::from(p));
        }
        ev
    }

    #[test]
    fn test_map_event_kinds() {
        let created = map_event(&event(EventKind::Create(CreateKind::File), &["/r/a"]));
        assert_eq!(created, vec![WatchEvent::new(ChangeKind::Added, "/r/a")]);

        let modified = map_event(&event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/r/a"],
        ));
        assert_eq!(modified[0].kind, ChangeKind::Modified);

        let removed = map_event(&event(EventKind::Remove(RemoveKind::File), &["/r/a"]));
        assert_eq!(removed[0].kind, ChangeKind::Removed);

        assert!(map_event(&event(
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
            &["/r/a"]
        ))
        .is_empty());
        assert!(map_event(&event(EventKind::Any, &["/r/a"])).is_empty());
    }

    #[test]
    fn test_rename_both_splits() {
        let events = map_event(&event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/r/old.txt", "/r/new.txt"],
        ));
        assert_eq!(
            events,
            vec![
                WatchEvent::new(ChangeKind::Removed, "/r/old.txt"),
                WatchEvent::new(ChangeKind::Added, "/r/new.txt"),
            ]
        );
    }

    fn ingestor(root: &Path) -> Ingestor {
        let filter = PathFilter::new(".gitignore", "log.txt");
        Ingestor::new(root, ChangeLedger::new(), filter)
    }

    #[tokio::test]
    async fn test_ingest_records_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "hello").unwrap();
        let ingestor = ingestor(dir.path());

        let records = ingestor
            .ingest(&WatchEvent::new(ChangeKind::Added, &path))
            .await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].relative_path, "a.txt");
        assert_eq!(ingestor.ledger.get("a.txt"), Some(PendingContent::from("hello")));
        assert!(ingestor.known().contains("a.txt"));
    }

    #[tokio::test]
    async fn test_ingest_skips_ignored_paths() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(".gitignore"), "*.tmp\n").unwrap();
        let path = dir.path().join("a.tmp");
        std::fs::write(&path, "scratch").unwrap();
        let ingestor = ingestor(dir.path());

        let records = ingestor
            .ingest(&WatchEvent::new(ChangeKind::Added, &path))
            .await;

        assert!(records.is_empty());
        assert!(ingestor.ledger.is_empty());
    }

    #[tokio::test]
    async fn test_ingest_skips_log_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.txt");
        std::fs::write(&path, "my local notes").unwrap();
        let ingestor = ingestor(dir.path());

        ingestor
            .ingest(&WatchEvent::new(ChangeKind::Modified, &path))
            .await;

        assert!(ingestor.ledger.is_empty());
        assert!(!ingestor.known().contains("log.txt"));
    }

    #[tokio::test]
    async fn test_ingest_removed_and_vanished() {
        let dir = tempdir().unwrap();
        let ingestor = ingestor(dir.path());
        let gone = dir.path().join("gone.txt");
        std::fs::write(&gone, "bye").unwrap();
        ingestor.ingest(&WatchEvent::new(ChangeKind::Added, &gone)).await;

        std::fs::remove_file(&gone).unwrap();
        ingestor.ingest(&WatchEvent::new(ChangeKind::Removed, &gone)).await;
        assert_eq!(ingestor.ledger.get("gone.txt"), Some(PendingContent::Tombstone));

        // Modified event for a known file that no longer exists
        let ghost = dir.path().join("ghost.txt");
        ingestor.known().insert("ghost.txt");
        ingestor.ingest(&WatchEvent::new(ChangeKind::Modified, &ghost)).await;
        assert_eq!(ingestor.ledger.get("ghost.txt"), Some(PendingContent::Tombstone));
    }

    #[tokio::test]
    async fn test_unknown_removal_records_nothing() {
        let dir = tempdir().unwrap();
        let ingestor = ingestor(dir.path());

        // An empty directory going away must not tombstone the directory path
        let records = ingestor
            .ingest(&WatchEvent::new(ChangeKind::Removed, dir.path().join("empty")))
            .await;

        assert!(records.is_empty());
        assert!(ingestor.ledger.is_empty());
    }

    #[tokio::test]
    async fn test_ingest_skips_git_contents() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git/HEAD"), "ref").unwrap();
        let ingestor = ingestor(dir.path());

        let head = dir.path().join(".git/HEAD");
        ingestor.ingest(&WatchEvent::new(ChangeKind::Modified, head)).await;
        let git = dir.path().join(".git");
        ingestor.ingest(&WatchEvent::new(ChangeKind::Added, git)).await;

        assert!(ingestor.ledger.is_empty());
    }

    #[tokio::test]
    async fn test_directory_moved_in_records_every_file() {
        let outside = tempdir().unwrap();
        std::fs::create_dir_all(outside.path().join("pkg/src")).unwrap();
        std::fs::write(outside.path().join("pkg/a.txt"), "inside").unwrap();
        std::fs::write(outside.path().join("pkg/src/lib.rs"), "fn main() {}").unwrap();
        let dir = tempdir().unwrap();
        let ingestor = ingestor(dir.path());

        let pkg = dir.path().join("pkg");
        std::fs::rename(outside.path().join("pkg"), &pkg).unwrap();
        let records = ingestor.ingest(&WatchEvent::new(ChangeKind::Added, &pkg)).await;

        assert_eq!(records.len(), 2);
        assert_eq!(ingestor.ledger.get("pkg/a.txt"), Some(PendingContent::from("inside")));
        assert!(ingestor.ledger.get("pkg/src/lib.rs").is_some());
        assert!(ingestor.ledger.get("pkg").is_none());

        // A plain modify on the directory itself is not a reason to re-read it
        let snapshot = ingestor.ledger.drain().unwrap();
        assert_eq!(snapshot.records.len(), 2);
        ingestor.ingest(&WatchEvent::new(ChangeKind::Modified, &pkg)).await;
        assert!(ingestor.ledger.is_empty());
    }

    #[tokio::test]
    async fn test_directory_rename_and_removal_tombstone_children() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("pkg/src")).unwrap();
        std::fs::write(dir.path().join("pkg/a.txt"), "inside").unwrap();
        std::fs::write(dir.path().join("pkg/src/lib.rs"), "lib").unwrap();
        let ingestor = ingestor(dir.path());
        assert_eq!(ingestor.scan().await.unwrap(), 2);

        let from = dir.path().join("pkg");
        let to = dir.path().join("lib");
        std::fs::rename(&from, &to).unwrap();
        let rename = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(from.clone())
            .add_path(to.clone());
        for watch_event in map_event(&rename) {
            ingestor.ingest(&watch_event).await;
        }

        assert_eq!(ingestor.ledger.get("pkg/a.txt"), Some(PendingContent::Tombstone));
        assert_eq!(ingestor.ledger.get("pkg/src/lib.rs"), Some(PendingContent::Tombstone));
        assert_eq!(ingestor.ledger.get("lib/a.txt"), Some(PendingContent::from("inside")));
        assert!(ingestor.ledger.get("pkg").is_none());

        std::fs::remove_dir_all(&to).unwrap();
        let removal = map_event(&event(
            EventKind::Remove(RemoveKind::Folder),
            &[to.to_str().unwrap()],
        ));
        for watch_event in removal {
            ingestor.ingest(&watch_event).await;
        }

        assert_eq!(ingestor.ledger.get("lib/a.txt"), Some(PendingContent::Tombstone));
        assert_eq!(ingestor.ledger.get("lib/src/lib.rs"), Some(PendingContent::Tombstone));
        assert!(ingestor.ledger.get("lib").is_none());
        assert!(ingestor.known().is_empty());
    }

    #[tokio::test]
    async fn test_ingest_nested_path_uses_forward_slashes() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("docs/guide")).unwrap();
        let path = dir.path().join("docs/guide/intro.md");
        std::fs::write(&path, "# Intro").unwrap();
        let ingestor = ingestor(dir.path());

        ingestor
            .ingest(&WatchEvent::new(ChangeKind::Modified, &path))
            .await;
        assert!(ingestor.ledger.get("docs/guide/intro.md").is_some());
    }

    #[test]
    fn test_watch_missing_directory() {
        let dir = tempdir().unwrap();
        let err = WatchStream::watch(&dir.path().join("missing")).err().unwrap();
        assert!(matches!(err, ChronicleError::DirectoryNotFound(_)));
    }

    #[test]
    fn test_decode_text_lossy() {
        assert_eq!(decode_text(b"plain".to_vec()), "plain");
        assert_eq!(decode_text(vec![b'a', 0xff, b'b']), "a\u{fffd}b");
    }
}
