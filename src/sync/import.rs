//! Bulk importer for first-time synchronization
//!
//! Walks the whole monitored tree (recursively) and upserts every file that
//! is not ignored. No summaries are generated and the change log is untouched,
//! even when a local file shares its name.

use serde::Serialize;

use super::{Reconciler, UpsertOutcome};
use crate::error::{ChronicleError, Result};
use crate::types::PendingContent;
use crate::watch::{decode_text, list_files};

/// Outcome of a bulk import
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub uploaded: Vec<String>,
    pub unchanged: Vec<String>,
    pub ignored: Vec<String>,
    pub conflicts: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl ImportReport {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty() && self.failed.is_empty()
    }
}

/// Import every eligible file under the reconciler's root
pub async fn import_tree(reconciler: &Reconciler) -> Result<ImportReport> {
    let root = reconciler.root().to_path_buf();
    if !root.is_dir() {
        return Err(ChronicleError::DirectoryNotFound(root.display().to_string()));
    }

    let filter = reconciler.filter().clone();
    let listing = tokio::task::spawn_blocking(move || list_files(&root, &root, &filter))
        .await
        .map_err(|e| ChronicleError::Internal(format!("import walk panicked: {}", e)))?;

    let files = listing.files;
    let mut report = ImportReport {
        ignored: listing.ignored,
        failed: listing.errors,
        ..Default::default()
    };

    let message = reconciler.config().import_message.clone();
    tracing::info!(
        "Importing {} files from {}",
        files.len(),
        reconciler.root().display()
    );

    for (relative, absolute) in files {
        let content = match tokio::fs::read(&absolute).await {
            Ok(bytes) => PendingContent::Text(decode_text(bytes)),
            Err(e) => {
                tracing::warn!("Could not read {}: {}", absolute.display(), e);
                report.failed.push((relative, e.to_string()));
                continue;
            }
        };

        match reconciler.upsert(&relative, &content, &message).await {
            Ok(UpsertOutcome::Written { .. }) => {
                tracing::debug!("Imported {}", relative);
                report.uploaded.push(relative);
            }
            Ok(UpsertOutcome::Unchanged) => report.unchanged.push(relative),
            Ok(UpsertOutcome::Conflict) => {
                tracing::warn!("Version conflict importing {}", relative);
                report.conflicts.push(relative);
            }
            Err(e) => {
                tracing::error!("Import of {} failed: {}", relative, e);
                report.failed.push((relative, e.to_string()));
            }
        }
    }

    tracing::info!(
        "Initial import done: {} uploaded, {} unchanged, {} ignored, {} failed",
        report.uploaded.len(),
        report.unchanged.len(),
        report.ignored.len(),
        report.failed.len() + report.conflicts.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChronicleConfig;
    use crate::remote::{Collaborators, DisabledSummarizer, MemoryRemote};
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn reconciler(root: &Path, remote: &MemoryRemote) -> Reconciler {
        let collaborators = Collaborators::in_memory(remote.clone(), Arc::new(DisabledSummarizer));
        Reconciler::new(root, "notes", &collaborators, ChronicleConfig::default())
    }

    fn tree() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("docs/deep")).unwrap();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::write(root.join("a.txt"), "hello").unwrap();
        std::fs::write(root.join("scratch.tmp"), "junk").unwrap();
        std::fs::write(root.join(".gitignore"), "*.tmp\n").unwrap();
        std::fs::write(root.join("docs/guide.md"), "# Guide").unwrap();
        std::fs::write(root.join("docs/deep/notes.md"), "deep").unwrap();
        std::fs::write(root.join(".git/HEAD"), "ref: refs/heads/main").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_import_is_recursive_and_filtered() {
        let dir = tree();
        let remote = MemoryRemote::with_repo("notes");

        let report = import_tree(&reconciler(dir.path(), &remote)).await.unwrap();

        assert_eq!(
            report.uploaded,
            vec![".gitignore", "a.txt", "docs/deep/notes.md", "docs/guide.md"]
        );
        assert_eq!(report.ignored, vec!["scratch.tmp"]);
        assert_eq!(remote.file("notes", "docs/deep/notes.md").as_deref(), Some("deep"));
        assert!(remote.file("notes", "scratch.tmp").is_none());
        assert!(remote.file("notes", ".git/HEAD").is_none());
        // Import never touches the change log
        assert!(remote.file("notes", "log.txt").is_none());
        assert!(remote
            .writes()
            .iter()
            .all(|w| w.message == "Auto-upload from folder"));
    }

    #[tokio::test]
    async fn test_second_import_writes_nothing() {
        let dir = tree();
        let remote = MemoryRemote::with_repo("notes");
        let reconciler = reconciler(dir.path(), &remote);

        import_tree(&reconciler).await.unwrap();
        let writes = remote.writes().len();
        let second = import_tree(&reconciler).await.unwrap();

        assert!(second.uploaded.is_empty());
        assert_eq!(second.unchanged.len(), 4);
        assert_eq!(remote.writes().len(), writes);
    }

    #[tokio::test]
    async fn test_import_updates_existing_remote_files() {
        let dir = tree();
        let remote = MemoryRemote::with_repo("notes");
        remote.seed("notes", "a.txt", "stale");

        let report = import_tree(&reconciler(dir.path(), &remote)).await.unwrap();

        assert!(report.uploaded.contains(&"a.txt".to_string()));
        assert_eq!(remote.file("notes", "a.txt").as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_import_failure_is_per_file() {
        let dir = tree();
        let remote = MemoryRemote::with_repo("notes");
        remote.fail_path("a.txt");

        let report = import_tree(&reconciler(dir.path(), &remote)).await.unwrap();

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.uploaded.len(), 3);
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn test_import_leaves_remote_log_alone() {
        let dir = tree();
        std::fs::write(dir.path().join("log.txt"), "my local notes").unwrap();
        let remote = MemoryRemote::with_repo("notes");
        remote.seed("notes", "log.txt", "File: old.txt\nSummary: history\n\n");

        let report = import_tree(&reconciler(dir.path(), &remote)).await.unwrap();

        assert!(report.ignored.contains(&"log.txt".to_string()));
        assert!(!report.uploaded.contains(&"log.txt".to_string()));
        assert_eq!(
            remote.file("notes", "log.txt").as_deref(),
            Some("File: old.txt\nSummary: history\n\n")
        );
        assert_eq!(remote.writes_to("log.txt"), 0);
    }

    #[tokio::test]
    async fn test_import_missing_root() {
        let dir = tempdir().unwrap();
        let remote = MemoryRemote::with_repo("notes");
        let err = import_tree(&reconciler(&dir.path().join("nope"), &remote))
            .await
            .unwrap_err();
        assert!(matches!(err, ChronicleError::DirectoryNotFound(_)));
    }
}
