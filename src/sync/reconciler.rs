//! Remote reconciler: versioned upserts and the aggregated change log

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Local, Utc};

use super::{append_log_text, PassReport, SyncCyclePass};
use crate::config::ChronicleConfig;
use crate::error::{ChronicleError, Result};
use crate::remote::{with_timeout, Collaborators, PutOutcome, RemoteStore, Summarizer};
use crate::types::{ChangeRecord, PendingContent, RemoteFileHandle};
use crate::watch::PathFilter;

/// Result of writing one path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Written { version: String },
    /// Remote content already matches, or a tombstone for a path that does not exist
    Unchanged,
    Conflict,
}

/// Reconciles pending records of one monitored root against one repository
#[derive(Clone)]
pub struct Reconciler {
    root: PathBuf,
    repo_id: String,
    store: Arc<dyn RemoteStore>,
    summarizer: Arc<dyn Summarizer>,
    filter: PathFilter,
    config: ChronicleConfig,
}

impl Reconciler {
    pub fn new(
        root: impl Into<PathBuf>,
        repo_id: impl Into<String>,
        collaborators: &Collaborators,
        config: ChronicleConfig,
    ) -> Self {
        Self {
            root: root.into(),
            repo_id: repo_id.into(),
            store: collaborators.store.clone(),
            summarizer: collaborators.summarizer.clone(),
            filter: PathFilter::from_config(&config),
            config,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }

    pub fn config(&self) -> &ChronicleConfig {
        &self.config
    }

    /// Which paths may be mirrored; the change log is never one of them
    pub fn filter(&self) -> &PathFilter {
        &self.filter
    }

    /// Commit message for a periodic pass
    pub fn commit_message(&self) -> String {
        format!(
            "{}: {}",
            self.config.commit_prefix,
            Local::now().format("%Y-%m-%d %H:%M:%S")
        )
    }

    /// Reconcile every record of the pass, then append the pass log.
    ///
    /// Errors on one path never stop the others; everything ends up in the
    /// report. Only conflicts and transport failures are offered for retry.
    pub async fn run_pass(&self, mut pass: SyncCyclePass) -> PassReport {
        let message = self.commit_message();
        let mut report = PassReport {
            pass_id: pass.id.to_string(),
            started_at: Some(pass.started_at),
            ..Default::default()
        };

        tracing::info!(
            "Sync pass {} started with {} pending paths",
            pass.id,
            pass.records.len()
        );

        let records = std::mem::take(&mut pass.records);
        for record in records {
            let path = record.relative_path.clone();

            if self.filter.is_ignored(&self.root, &path) {
                tracing::debug!("Skipping now-ignored path {}", path);
                report.ignored.push(path);
                continue;
            }

            match self.reconcile_record(&record, &message).await {
                Ok(RecordResult::Written(summary)) => {
                    pass.push_entry(&path, &summary);
                    report.written.push(path);
                }
                Ok(RecordResult::Unchanged) => report.unchanged.push(path),
                Ok(RecordResult::Conflict) => {
                    tracing::warn!("Version conflict on {}, skipping for this pass", path);
                    report.conflicts.push(path);
                    report.retry.push(record);
                }
                Err(e) => {
                    tracing::error!("Sync of {} failed: {}", path, e);
                    // Refusals such as 403 or 413 would fail the same way again
                    if e.is_transport() {
                        report.retry.push(record);
                    }
                    report.failed.push((path, e.to_string()));
                }
            }
        }

        if !pass.log_text().is_empty() {
            match self.append_log(pass.log_text(), &message).await {
                Ok(()) => report.log_appended = true,
                Err(e) => {
                    tracing::error!("Appending to {} failed: {}", self.config.log_file, e);
                    report.log_error = Some(e.to_string());
                }
            }
        }

        report.completed_at = Some(Utc::now());
        tracing::info!(
            "Sync pass {} finished: {} written, {} unchanged, {} ignored, {} conflicts, {} failed",
            pass.id,
            report.written.len(),
            report.unchanged.len(),
            report.ignored.len(),
            report.conflicts.len(),
            report.failed.len()
        );
        report
    }

    async fn reconcile_record(&self, record: &ChangeRecord, message: &str) -> Result<RecordResult> {
        let path = &record.relative_path;
        let handle = self.fetch(path).await?;

        if is_noop(&handle, &record.content) {
            return Ok(RecordResult::Unchanged);
        }

        let summary = self
            .summarize(handle.old_content(), record.content.as_str())
            .await;

        match self.write(&handle, record.content.as_str(), message).await? {
            PutOutcome::Written { version } => {
                tracing::info!("{} committed ({})", path, version);
                Ok(RecordResult::Written(summary))
            }
            PutOutcome::Conflict => Ok(RecordResult::Conflict),
        }
    }

    /// Fetch-compare-write without summarization, as used by the importer
    pub async fn upsert(
        &self,
        relative_path: &str,
        content: &PendingContent,
        message: &str,
    ) -> Result<UpsertOutcome> {
        let handle = self.fetch(relative_path).await?;
        if is_noop(&handle, content) {
            return Ok(UpsertOutcome::Unchanged);
        }

        Ok(match self.write(&handle, content.as_str(), message).await? {
            PutOutcome::Written { version } => UpsertOutcome::Written { version },
            PutOutcome::Conflict => UpsertOutcome::Conflict,
        })
    }

    /// Summary of a change; never fails, falls back to the placeholder
    pub async fn summarize(&self, old_text: &str, new_text: &str) -> String {
        let result = with_timeout(
            self.config.request_timeout(),
            self.summarizer.summarize(old_text, new_text),
        )
        .await;

        match result {
            Ok(summary) if !summary.trim().is_empty() => summary,
            Ok(_) => self.config.summary_placeholder.clone(),
            Err(e) => {
                tracing::warn!("Summary unavailable: {}", e);
                self.config.summary_placeholder.clone()
            }
        }
    }

    /// Append text to the remote log with the same fetch-then-write protocol
    pub async fn append_log(&self, entries: &str, message: &str) -> Result<()> {
        let log_file = &self.config.log_file;

        for attempt in 1..=self.config.log_append_attempts {
            let handle = self.fetch(log_file).await?;
            let updated = append_log_text(handle.old_content(), entries);

            match self.write(&handle, &updated, message).await? {
                PutOutcome::Written { .. } => {
                    tracing::info!("{} updated", log_file);
                    return Ok(());
                }
                PutOutcome::Conflict => {
                    tracing::warn!(
                        "{} changed while appending (attempt {}/{})",
                        log_file,
                        attempt,
                        self.config.log_append_attempts
                    );
                }
            }
        }

        Err(ChronicleError::Conflict(format!(
            "{} kept changing during append",
            log_file
        )))
    }

    async fn fetch(&self, path: &str) -> Result<RemoteFileHandle> {
        with_timeout(
            self.config.request_timeout(),
            self.store.fetch_handle(&self.repo_id, path),
        )
        .await
    }

    async fn write(
        &self,
        handle: &RemoteFileHandle,
        content: &str,
        message: &str,
    ) -> Result<PutOutcome> {
        with_timeout(
            self.config.request_timeout(),
            self.store.put(
                &self.repo_id,
                &handle.path,
                content,
                handle.version_token.as_deref(),
                message,
            ),
        )
        .await
    }
}

enum RecordResult {
    Written(String),
    Unchanged,
    Conflict,
}

fn is_noop(handle: &RemoteFileHandle, content: &PendingContent) -> bool {
    match (&handle.content, content) {
        (None, PendingContent::Tombstone) => true,
        (Some(remote), pending) => remote == pending.as_str(),
        (None, PendingContent::Text(_)) => false,
    }
}
