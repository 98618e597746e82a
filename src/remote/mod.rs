//! Remote collaborators: content store, repository host and summarizer
//!
//! The sync core only talks to these traits. Implementations:
//! - [`GitHubClient`]: GitHub contents API (`github` feature)
//! - [`GeminiSummarizer`]: Gemini `generateContent` (`gemini` feature)
//! - [`MemoryRemote`]: in-process store for tests and offline runs
//! - [`DisabledSummarizer`]: always fails, so the placeholder is logged
//!
//! # Feature Flags
//!
//! - `github`: enables the GitHub store/host
//! - `gemini`: enables the Gemini summarizer

#[cfg(feature = "gemini")]
mod gemini;
#[cfg(feature = "github")]
mod github;
mod memory;

#[cfg(feature = "gemini")]
pub use gemini::{GeminiConfig, GeminiSummarizer};
#[cfg(feature = "github")]
pub use github::{GitHubClient, GitHubConfig};
pub use memory::{MemoryRemote, PutRecord};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ChronicleError, Result};
use crate::types::{RemoteFileHandle, Visibility};

/// Current remote content of a path plus its version token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub content: String,
    pub version: String,
}

/// Outcome of a versioned write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    /// Write accepted; the new version token
    Written { version: String },
    /// The supplied version token was stale (or missing for an existing path)
    Conflict,
}

/// Versioned content store
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch a path. `Ok(None)` means not found, which is not an error.
    async fn get(&self, repo_id: &str, path: &str) -> Result<Option<RemoteFile>>;

    /// Write a path. `version` must be the current token when the path exists.
    async fn put(
        &self,
        repo_id: &str,
        path: &str,
        content: &str,
        version: Option<&str>,
        message: &str,
    ) -> Result<PutOutcome>;

    /// Fetch a path as a handle, mapping "not found" to an empty handle
    async fn fetch_handle(&self, repo_id: &str, path: &str) -> Result<RemoteFileHandle> {
        Ok(match self.get(repo_id, path).await? {
            Some(file) => RemoteFileHandle {
                path: path.to_string(),
                version_token: Some(file.version),
                content: Some(file.content),
            },
            None => RemoteFileHandle::missing(path),
        })
    }
}

/// Repository existence and creation
#[async_trait]
pub trait RepoHost: Send + Sync {
    async fn exists(&self, repo_id: &str) -> Result<bool>;

    async fn create(&self, repo_id: &str, visibility: Visibility) -> Result<()>;
}

/// Natural-language description of a change
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, old_text: &str, new_text: &str) -> Result<String>;
}

/// Summarizer used when no backend is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledSummarizer;

#[async_trait]
impl Summarizer for DisabledSummarizer {
    async fn summarize(&self, _old_text: &str, _new_text: &str) -> Result<String> {
        Err(ChronicleError::Summarizer(
            "no summarizer configured".to_string(),
        ))
    }
}

/// Prompt sent to language-model summarizers
pub fn summary_prompt(old_text: &str, new_text: &str) -> String {
    format!(
        "Compare the following code changes:\n\nOld:\n{}\n\nNew:\n{}\n\n\
         Give a short summary of what was changed.",
        old_text, new_text
    )
}

/// Bound a collaborator call; an elapsed timer becomes [`ChronicleError::Timeout`]
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ChronicleError::Timeout(limit)),
    }
}

/// Collaborators a session needs, shared across sessions
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn RemoteStore>,
    pub host: Arc<dyn RepoHost>,
    pub summarizer: Arc<dyn Summarizer>,
}

impl Collaborators {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        host: Arc<dyn RepoHost>,
        summarizer: Arc<dyn Summarizer>,
    ) -> Self {
        Self {
            store,
            host,
            summarizer,
        }
    }

    /// Store and host backed by one in-memory remote
    pub fn in_memory(remote: MemoryRemote, summarizer: Arc<dyn Summarizer>) -> Self {
        let remote = Arc::new(remote);
        Self {
            store: remote.clone(),
            host: remote,
            summarizer,
        }
    }

    /// GitHub store and host from the environment; Gemini summaries when a key is set
    #[cfg(feature = "github")]
    pub fn from_env(config: &crate::config::ChronicleConfig) -> Result<Self> {
        let github = GitHubConfig::from_env().ok_or_else(|| {
            ChronicleError::Config("GITHUB_TOKEN and GITHUB_USERNAME must be set".to_string())
        })?;
        let client = Arc::new(GitHubClient::new(github.with_branch(&config.branch)));

        Ok(Self {
            store: client.clone(),
            host: client,
            summarizer: summarizer_from_env(),
        })
    }
}

#[cfg(feature = "github")]
fn summarizer_from_env() -> Arc<dyn Summarizer> {
    #[cfg(feature = "gemini")]
    {
        if let Some(gemini) = GeminiSummarizer::from_env() {
            tracing::info!("Summaries via Gemini ({})", gemini.model());
            return Arc::new(gemini);
        }
    }

    tracing::warn!("No summarizer configured; log entries will use the placeholder");
    Arc::new(DisabledSummarizer)
}
