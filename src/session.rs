//! Monitoring sessions
//!
//! A session owns everything for one monitored root: the change ledger, the
//! watch ingest task and the sync worker. Sessions share no state; the
//! [`SessionManager`] only keeps them addressable by id.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::ChronicleConfig;
use crate::error::{ChronicleError, Result};
use crate::remote::{with_timeout, Collaborators, RepoHost};
use crate::sync::{import_tree, ImportReport, PassReport, Reconciler, SyncWorker, WorkerStatus};
use crate::types::{RepoAction, SessionInfo, SessionRequest, SessionSpec};
use crate::watch::{ChangeLedger, Ingestor, KnownFiles, WatchStream};

/// One running monitoring session
pub struct Session {
    id: Uuid,
    root: PathBuf,
    repo_id: String,
    started_at: DateTime<Utc>,
    ledger: ChangeLedger,
    known: KnownFiles,
    worker: SyncWorker,
    ingest: JoinHandle<()>,
    import_report: Option<ImportReport>,
}

impl Session {
    /// Prepare the repository, optionally import the tree, then start
    /// watching and syncing.
    ///
    /// Any failure here is fatal to the session; nothing keeps running.
    pub async fn start(
        spec: SessionSpec,
        collaborators: &Collaborators,
        config: ChronicleConfig,
    ) -> Result<Self> {
        config.validate()?;
        let root = resolve_root(&spec.directory_path).await?;

        prepare_repository(&spec, collaborators.host.as_ref(), &config).await?;

        let reconciler = Reconciler::new(&root, &spec.repo_id, collaborators, config.clone());
        let ledger = ChangeLedger::new();

        // Watch before importing so edits made during the import are not lost
        let stream = WatchStream::watch(&root)?;
        let ingestor = Ingestor::new(stream.root(), ledger.clone(), reconciler.filter().clone());
        ingestor.scan().await?;
        let known = ingestor.known().clone();
        let ingest = tokio::spawn(ingestor.run(stream));

        let import_report = if spec.import_existing {
            match import_tree(&reconciler).await {
                Ok(report) => Some(report),
                Err(e) => {
                    ingest.abort();
                    return Err(e);
                }
            }
        } else {
            None
        };

        let worker = SyncWorker::start(ledger.clone(), reconciler, config.sync_interval());
        let session = Self {
            id: Uuid::new_v4(),
            root,
            repo_id: spec.repo_id,
            started_at: Utc::now(),
            ledger,
            known,
            worker,
            ingest,
            import_report,
        };

        tracing::info!(
            "Session {} monitoring {} and syncing with {}",
            session.id,
            session.root.display(),
            session.repo_id
        );
        Ok(session)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ledger(&self) -> &ChangeLedger {
        &self.ledger
    }

    /// Files seen under the root since the session started
    pub fn known_files(&self) -> &KnownFiles {
        &self.known
    }

    /// Report of the initial import, if one was requested
    pub fn import_report(&self) -> Option<&ImportReport> {
        self.import_report.as_ref()
    }

    pub fn status(&self) -> WorkerStatus {
        self.worker.status()
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.to_string(),
            root: self.root.clone(),
            repo_id: self.repo_id.clone(),
            started_at: self.started_at,
            pending_changes: self.ledger.len(),
            last_pass_at: self.worker.status().last_pass_at,
        }
    }

    /// Run a sync pass without waiting for the next tick
    pub async fn sync_now(&self) -> Result<Option<PassReport>> {
        self.worker.sync_now().await
    }

    /// Close the watch, run a final pass and stop the worker
    pub async fn stop(&self) -> Result<Option<PassReport>> {
        self.ingest.abort();
        let report = self.worker.stop().await;
        tracing::info!("Session {} stopped", self.id);
        report
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.ingest.abort();
    }
}

async fn resolve_root(directory: &Path) -> Result<PathBuf> {
    let root = tokio::fs::canonicalize(directory).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ChronicleError::DirectoryNotFound(directory.display().to_string())
        } else {
            ChronicleError::Io(e)
        }
    })?;
    if !root.is_dir() {
        return Err(ChronicleError::DirectoryNotFound(
            directory.display().to_string(),
        ));
    }
    Ok(root)
}

async fn prepare_repository(
    spec: &SessionSpec,
    host: &dyn RepoHost,
    config: &ChronicleConfig,
) -> Result<()> {
    let timeout = config.request_timeout();
    match spec.repo_action {
        RepoAction::Create => {
            with_timeout(timeout, host.create(&spec.repo_id, spec.visibility)).await?;
            tracing::info!("Created repository {} ({:?})", spec.repo_id, spec.visibility);
        }
        RepoAction::UseExisting => {
            if !with_timeout(timeout, host.exists(&spec.repo_id)).await? {
                return Err(ChronicleError::RepoNotFound(spec.repo_id.clone()));
            }
        }
    }
    Ok(())
}

/// Registry of running sessions
#[derive(Clone)]
pub struct SessionManager {
    collaborators: Collaborators,
    config: ChronicleConfig,
    sessions: Arc<DashMap<Uuid, Arc<Session>>>,
}

impl SessionManager {
    pub fn new(collaborators: Collaborators, config: ChronicleConfig) -> Self {
        Self {
            collaborators,
            config,
            sessions: Arc::new(DashMap::new()),
        }
    }

    pub fn config(&self) -> &ChronicleConfig {
        &self.config
    }

    /// Validate a start command and launch a session for it
    pub async fn start(&self, request: &SessionRequest) -> Result<Arc<Session>> {
        let spec = request.validate()?;
        let session = Session::start(spec, &self.collaborators, self.config.clone()).await?;
        let session = Arc::new(session);
        self.sessions.insert(session.id(), session.clone());
        Ok(session)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        let id = Uuid::parse_str(id).ok()?;
        self.sessions.get(&id).map(|entry| entry.value().clone())
    }

    /// Running sessions, oldest first
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> =
            self.sessions.iter().map(|entry| entry.value().info()).collect();
        sessions.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Stop a session and forget it
    pub async fn stop(&self, id: &str) -> Result<Option<PassReport>> {
        let key = Uuid::parse_str(id).map_err(|_| ChronicleError::SessionNotFound(id.to_string()))?;
        let (_, session) = self
            .sessions
            .remove(&key)
            .ok_or_else(|| ChronicleError::SessionNotFound(id.to_string()))?;
        session.stop().await
    }

    /// Stop every session, used on shutdown
    pub async fn stop_all(&self) {
        let ids: Vec<Uuid> = self.sessions.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Err(e) = self.stop(&id.to_string()).await {
                tracing::warn!("Stopping session {} failed: {}", id, e);
            }
        }
    }
}
