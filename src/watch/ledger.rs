//! Pending-change ledger shared by the ingest and scheduler tasks

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::types::{ChangeRecord, PendingContent, RelativePath};

/// Latest observed state per relative path, last write wins.
///
/// Cloning yields another handle to the same ledger.
#[derive(Debug, Clone, Default)]
pub struct ChangeLedger {
    inner: Arc<Mutex<HashMap<RelativePath, PendingContent>>>,
}

impl ChangeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest state of a path, replacing any pending record
    pub fn record(&self, change: ChangeRecord) {
        let mut pending = self.inner.lock();
        if pending
            .insert(change.relative_path.clone(), change.content)
            .is_some()
        {
            tracing::trace!("Coalesced pending change for {}", change.relative_path);
        }
    }

    /// Put a record back unless a newer change for the path is already pending.
    ///
    /// Returns whether the record was stored.
    pub fn requeue(&self, change: ChangeRecord) -> bool {
        let mut pending = self.inner.lock();
        if pending.contains_key(&change.relative_path) {
            return false;
        }
        pending.insert(change.relative_path, change.content);
        true
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Pending record for a path
    pub fn get(&self, relative_path: &str) -> Option<PendingContent> {
        self.inner.lock().get(relative_path).cloned()
    }

    /// Swap the ledger for an empty one and return what was pending.
    ///
    /// Returns `None` when nothing is pending so callers can skip the pass.
    pub fn drain(&self) -> Option<LedgerSnapshot> {
        let taken = {
            let mut pending = self.inner.lock();
            if pending.is_empty() {
                return None;
            }
            std::mem::take(&mut *pending)
        };

        let mut records: Vec<ChangeRecord> = taken
            .into_iter()
            .map(|(relative_path, content)| ChangeRecord {
                relative_path,
                content,
            })
            .collect();
        records.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

        Some(LedgerSnapshot {
            taken_at: Utc::now(),
            records,
        })
    }
}

/// Records drained from the ledger at one instant
#[derive(Debug, Clone)]
pub struct LedgerSnapshot {
    pub taken_at: DateTime<Utc>,
    pub records: Vec<ChangeRecord>,
}

impl LedgerSnapshot {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_write_wins() {
        let ledger = ChangeLedger::new();
        for i in 0..5 {
            ledger.record(ChangeRecord::new("notes.md", format!("v{}", i)));
        }
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get("notes.md"), Some(PendingContent::from("v4")));
    }

    #[test]
    fn test_tombstone_replaces_content() {
        let ledger = ChangeLedger::new();
        ledger.record(ChangeRecord::new("a.txt", "hello"));
        ledger.record(ChangeRecord::tombstone("a.txt"));
        assert_eq!(ledger.get("a.txt"), Some(PendingContent::Tombstone));

        ledger.record(ChangeRecord::new("a.txt", "back"));
        assert_eq!(ledger.get("a.txt"), Some(PendingContent::from("back")));
    }

    #[test]
    fn test_drain_swaps_for_empty() {
        let ledger = ChangeLedger::new();
        assert!(ledger.drain().is_none());

        ledger.record(ChangeRecord::new("b.txt", "2"));
        ledger.record(ChangeRecord::new("a.txt", "1"));

        let snapshot = ledger.drain().unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.records[0].relative_path, "a.txt");
        assert!(ledger.is_empty());
        assert!(ledger.drain().is_none());

        // Changes after the drain belong to the next cycle
        ledger.record(ChangeRecord::new("a.txt", "3"));
        assert_eq!(ledger.len(), 1);
        assert_eq!(snapshot.records[0].content, PendingContent::from("1"));
    }

    #[test]
    fn test_requeue_never_overwrites_newer_change() {
        let ledger = ChangeLedger::new();
        assert!(ledger.requeue(ChangeRecord::new("a.txt", "old")));
        assert_eq!(ledger.get("a.txt"), Some(PendingContent::from("old")));

        ledger.record(ChangeRecord::new("a.txt", "newer"));
        assert!(!ledger.requeue(ChangeRecord::new("a.txt", "old")));
        assert_eq!(ledger.get("a.txt"), Some(PendingContent::from("newer")));
    }

    #[test]
    fn test_clones_share_state() {
        let ledger = ChangeLedger::new();
        let handle = ledger.clone();
        handle.record(ChangeRecord::new("x", "y"));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_concurrent_records() {
        let ledger = ChangeLedger::new();
        let threads: Vec<_> = (0..8)
            .map(|t| {
                let ledger = ledger.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        ledger.record(ChangeRecord::new(format!("f{}", i % 10), format!("{}", t)));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(ledger.len(), 10);
    }
}
