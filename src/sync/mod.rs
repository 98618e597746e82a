//! Sync core: periodic passes over the change ledger and the bulk importer
//!
//! A pass drains the ledger, reconciles every pending path against the remote
//! store with version tokens, and appends one aggregated entry to the remote
//! change log. Passes run on a single worker task and never overlap.

mod import;
mod reconciler;
mod worker;

pub use import::{import_tree, ImportReport};
pub use reconciler::{Reconciler, UpsertOutcome};
pub use worker::{SyncCommand, SyncWorker, WorkerStatus};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::types::ChangeRecord;
use crate::watch::LedgerSnapshot;

/// One drain-reconcile-log unit of work; never persisted
#[derive(Debug, Clone)]
pub struct SyncCyclePass {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub records: Vec<ChangeRecord>,
    log_buffer: String,
}

impl SyncCyclePass {
    pub fn new(records: Vec<ChangeRecord>) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            records,
            log_buffer: String::new(),
        }
    }

    /// Record a reconciled path in the pass log
    pub fn push_entry(&mut self, relative_path: &str, summary: &str) {
        self.log_buffer.push_str(&format_log_entry(relative_path, summary));
    }

    pub fn log_text(&self) -> &str {
        &self.log_buffer
    }
}

impl From<LedgerSnapshot> for SyncCyclePass {
    fn from(snapshot: LedgerSnapshot) -> Self {
        Self::new(snapshot.records)
    }
}

/// `File: <path>\nSummary: <summary>\n\n`
pub fn format_log_entry(relative_path: &str, summary: &str) -> String {
    format!("File: {}\nSummary: {}\n\n", relative_path, summary.trim())
}

/// Append `entries` to the current log text, keeping entries newline-delimited
pub fn append_log_text(current: &str, entries: &str) -> String {
    if current.is_empty() {
        entries.to_string()
    } else if current.ends_with('\n') {
        format!("{}{}", current, entries)
    } else {
        format!("{}\n{}", current, entries)
    }
}

/// Outcome of one sync pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct PassReport {
    pub pass_id: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Paths written to the remote store
    pub written: Vec<String>,
    /// Paths skipped because an ignore rule now matches them
    pub ignored: Vec<String>,
    /// Paths whose remote content already matched
    pub unchanged: Vec<String>,
    /// Paths rejected because of a stale version token
    pub conflicts: Vec<String>,
    /// Paths abandoned because of a transport or remote error
    pub failed: Vec<(String, String)>,
    pub log_appended: bool,
    pub log_error: Option<String>,
    /// Records to hand back to the ledger for the next pass
    #[serde(skip)]
    pub retry: Vec<ChangeRecord>,
}

impl PassReport {
    pub fn processed(&self) -> usize {
        self.written.len()
            + self.ignored.len()
            + self.unchanged.len()
            + self.conflicts.len()
            + self.failed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty() && self.failed.is_empty() && self.log_error.is_none()
    }
}
