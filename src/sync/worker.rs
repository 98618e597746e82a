//! Sync cycle scheduler
//!
//! One background task per session. Every interval it drains the ledger and
//! runs a pass inline, so passes can never overlap. Ticks that fall due while a
//! pass is still running are skipped rather than queued.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::{PassReport, Reconciler, SyncCyclePass};
use crate::error::{ChronicleError, Result};
use crate::watch::ChangeLedger;

/// Commands for the sync worker
#[derive(Debug)]
pub enum SyncCommand {
    /// Run a pass now and report it (`None` if nothing was pending)
    SyncNow(oneshot::Sender<Option<PassReport>>),
    /// Run a final pass, then stop
    Stop(oneshot::Sender<Option<PassReport>>),
}

/// Snapshot of the worker's progress
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkerStatus {
    pub passes: u64,
    pub last_pass_at: Option<DateTime<Utc>>,
    pub last_report: Option<PassReport>,
    pub is_syncing: bool,
}

/// Background sync worker
pub struct SyncWorker {
    sender: mpsc::Sender<SyncCommand>,
    status: Arc<Mutex<WorkerStatus>>,
    handle: JoinHandle<()>,
}

impl SyncWorker {
    /// Start the scheduler for one ledger
    pub fn start(ledger: ChangeLedger, reconciler: Reconciler, period: Duration) -> Self {
        let (sender, mut receiver) = mpsc::channel::<SyncCommand>(16);
        let status = Arc::new(Mutex::new(WorkerStatus::default()));
        let requeue = reconciler.config().requeue_failed;

        let worker_status = status.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    cmd = receiver.recv() => {
                        match cmd {
                            Some(SyncCommand::SyncNow(reply)) => {
                                let report =
                                    Self::do_sync(&ledger, &reconciler, &worker_status, requeue)
                                        .await;
                                let _ = reply.send(report);
                            }
                            Some(SyncCommand::Stop(reply)) => {
                                // Final pass before stopping; nothing is requeued
                                let report =
                                    Self::do_sync(&ledger, &reconciler, &worker_status, false)
                                        .await;
                                let _ = reply.send(report);
                                break;
                            }
                            None => break,
                        }
                    }
                    _ = ticker.tick() => {
                        Self::do_sync(&ledger, &reconciler, &worker_status, requeue).await;
                    }
                }
            }

            tracing::info!("Sync worker for {} stopped", reconciler.repo_id());
        });

        Self {
            sender,
            status,
            handle,
        }
    }

    /// Drain the ledger and run one pass if anything is pending
    async fn do_sync(
        ledger: &ChangeLedger,
        reconciler: &Reconciler,
        status: &Arc<Mutex<WorkerStatus>>,
        requeue: bool,
    ) -> Option<PassReport> {
        let snapshot = ledger.drain()?;
        status.lock().is_syncing = true;

        let mut report = reconciler.run_pass(SyncCyclePass::from(snapshot)).await;

        if requeue {
            let retry = std::mem::take(&mut report.retry);
            let requeued = retry
                .into_iter()
                .filter(|record| ledger.requeue(record.clone()))
                .count();
            if requeued > 0 {
                tracing::info!("{} paths handed back for the next pass", requeued);
            }
        }

        let mut status = status.lock();
        status.is_syncing = false;
        status.passes += 1;
        status.last_pass_at = report.completed_at;
        status.last_report = Some(report.clone());

        Some(report)
    }

    /// Run a pass immediately
    pub async fn sync_now(&self) -> Result<Option<PassReport>> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(SyncCommand::SyncNow(reply))
            .await
            .map_err(|_| ChronicleError::Internal("Worker channel closed".to_string()))?;
        response
            .await
            .map_err(|_| ChronicleError::Internal("Worker dropped the request".to_string()))
    }

    /// Run a final pass and stop the worker
    pub async fn stop(&self) -> Result<Option<PassReport>> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(SyncCommand::Stop(reply))
            .await
            .map_err(|_| ChronicleError::Internal("Worker channel closed".to_string()))?;
        response
            .await
            .map_err(|_| ChronicleError::Internal("Worker dropped the request".to_string()))
    }

    pub fn status(&self) -> WorkerStatus {
        self.status.lock().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for SyncWorker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
