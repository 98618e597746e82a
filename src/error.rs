//! Error types for Chronicle

use std::time::Duration;

use thiserror::Error;

/// Result type alias for Chronicle operations
pub type Result<T> = std::result::Result<T, ChronicleError>;

/// Main error type for Chronicle
#[derive(Error, Debug)]
pub enum ChronicleError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Repository not found: {0}")]
    RepoNotFound(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Directory not found: {0}")]
    DirectoryNotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Summarizer error: {0}")]
    Summarizer(String),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    #[cfg(any(feature = "github", feature = "gemini"))]
    Http(#[from] reqwest::Error),

    #[error("HTTP request error: {0}")]
    #[cfg(not(any(feature = "github", feature = "gemini")))]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChronicleError {
    /// Network-level failures: the affected path is abandoned for this pass
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ChronicleError::Transport(_) | ChronicleError::Timeout(_) | ChronicleError::Http(_)
        )
    }

    /// Errors caused by the caller's request rather than by the system
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ChronicleError::InvalidInput(_)
                | ChronicleError::RepoNotFound(_)
                | ChronicleError::SessionNotFound(_)
                | ChronicleError::DirectoryNotFound(_)
        )
    }
}

impl From<toml::de::Error> for ChronicleError {
    fn from(e: toml::de::Error) -> Self {
        ChronicleError::Config(e.to_string())
    }
}
