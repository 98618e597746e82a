//! In-process remote used by tests and offline runs
//!
//! Behaves like a versioned content store: every accepted write gets a new
//! token, and writes carrying a stale token are rejected. Failures, forced
//! conflicts and latency can be injected per path.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{PutOutcome, RemoteFile, RemoteStore, RepoHost};
use crate::error::{ChronicleError, Result};
use crate::types::Visibility;

/// A write accepted by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutRecord {
    pub repo_id: String,
    pub path: String,
    pub content: String,
    pub message: String,
}

#[derive(Debug, Default)]
struct MemoryState {
    repos: HashMap<String, Visibility>,
    files: HashMap<(String, String), RemoteFile>,
    next_version: u64,
    writes: Vec<PutRecord>,
    failing: HashSet<String>,
    rejecting: HashSet<String>,
    conflicting: HashSet<String>,
    delays: HashMap<String, Duration>,
}

impl MemoryState {
    fn bump(&mut self) -> String {
        self.next_version += 1;
        format!("v{}", self.next_version)
    }
}

/// Cloning yields another handle to the same store
#[derive(Debug, Clone, Default)]
pub struct MemoryRemote {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with one existing repository
    pub fn with_repo(repo_id: &str) -> Self {
        let remote = Self::new();
        remote
            .state
            .lock()
            .repos
            .insert(repo_id.to_string(), Visibility::Private);
        remote
    }

    /// Write a file directly, as another client would. Returns its new token.
    pub fn seed(&self, repo_id: &str, path: &str, content: &str) -> String {
        let mut state = self.state.lock();
        let version = state.bump();
        state.files.insert(
            (repo_id.to_string(), path.to_string()),
            RemoteFile {
                content: content.to_string(),
                version: version.clone(),
            },
        );
        version
    }

    pub fn file(&self, repo_id: &str, path: &str) -> Option<String> {
        self.state
            .lock()
            .files
            .get(&(repo_id.to_string(), path.to_string()))
            .map(|f| f.content.clone())
    }

    pub fn version(&self, repo_id: &str, path: &str) -> Option<String> {
        self.state
            .lock()
            .files
            .get(&(repo_id.to_string(), path.to_string()))
            .map(|f| f.version.clone())
    }

    pub fn has_repo(&self, repo_id: &str) -> bool {
        self.state.lock().repos.contains_key(repo_id)
    }

    /// All accepted writes in order
    pub fn writes(&self) -> Vec<PutRecord> {
        self.state.lock().writes.clone()
    }

    /// Accepted writes for one path
    pub fn writes_to(&self, path: &str) -> usize {
        self.state
            .lock()
            .writes
            .iter()
            .filter(|w| w.path == path)
            .count()
    }

    /// Make every call touching `path` fail with a transport error
    pub fn fail_path(&self, path: &str) {
        self.state.lock().failing.insert(path.to_string());
    }

    /// Make every call touching `path` fail as the server refusing it
    pub fn reject_path(&self, path: &str) {
        self.state.lock().rejecting.insert(path.to_string());
    }

    /// Reject every write to `path` as a version conflict
    pub fn conflict_path(&self, path: &str) {
        self.state.lock().conflicting.insert(path.to_string());
    }

    /// Delay every call touching `path`
    pub fn delay_path(&self, path: &str, delay: Duration) {
        self.state.lock().delays.insert(path.to_string(), delay);
    }

    /// Remove injected failures, conflicts and delays
    pub fn heal(&self) {
        let mut state = self.state.lock();
        state.failing.clear();
        state.rejecting.clear();
        state.conflicting.clear();
        state.delays.clear();
    }

    async fn before_call(&self, path: &str) -> Result<()> {
        let (delay, failing, rejecting) = {
            let state = self.state.lock();
            (
                state.delays.get(path).copied(),
                state.failing.contains(path),
                state.rejecting.contains(path),
            )
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if failing {
            return Err(ChronicleError::Transport(format!(
                "connection reset while accessing {}",
                path
            )));
        }
        if rejecting {
            return Err(ChronicleError::Remote(format!("403 Forbidden: {}", path)));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn get(&self, repo_id: &str, path: &str) -> Result<Option<RemoteFile>> {
        self.before_call(path).await?;
        Ok(self
            .state
            .lock()
            .files
            .get(&(repo_id.to_string(), path.to_string()))
            .cloned())
    }

    async fn put(
        &self,
        repo_id: &str,
        path: &str,
        content: &str,
        version: Option<&str>,
        message: &str,
    ) -> Result<PutOutcome> {
        self.before_call(path).await?;

        let mut state = self.state.lock();
        if state.conflicting.contains(path) {
            return Ok(PutOutcome::Conflict);
        }

        let key = (repo_id.to_string(), path.to_string());
        let current = state.files.get(&key).map(|f| f.version.as_str());
        if current != version {
            return Ok(PutOutcome::Conflict);
        }

        let new_version = state.bump();
        state.files.insert(
            key,
            RemoteFile {
                content: content.to_string(),
                version: new_version.clone(),
            },
        );
        state.writes.push(PutRecord {
            repo_id: repo_id.to_string(),
            path: path.to_string(),
            content: content.to_string(),
            message: message.to_string(),
        });

        Ok(PutOutcome::Written {
            version: new_version,
        })
    }
}

#[async_trait]
impl RepoHost for MemoryRemote {
    async fn exists(&self, repo_id: &str) -> Result<bool> {
        Ok(self.has_repo(repo_id))
    }

    async fn create(&self, repo_id: &str, visibility: Visibility) -> Result<()> {
        let mut state = self.state.lock();
        if state.repos.contains_key(repo_id) {
            return Err(ChronicleError::Remote(format!(
                "repository {} already exists",
                repo_id
            )));
        }
        state.repos.insert(repo_id.to_string(), visibility);
        Ok(())
    }
}
