//! Runtime configuration
//!
//! Settings come from an optional TOML file; anything not present falls back
//! to the defaults below. Credentials are never read from the file, they come
//! from the environment through the client `from_env` constructors.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ChronicleError, Result};

/// Default interval between sync cycles
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 10;

/// Placeholder logged when the summarizer is unavailable
pub const DEFAULT_SUMMARY_PLACEHOLDER: &str = "Could not generate summary.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChronicleConfig {
    /// Seconds between sync cycles
    pub sync_interval_secs: u64,
    /// Upper bound for every remote/summarizer call
    pub request_timeout_secs: u64,
    /// Remote path of the append-only change log
    pub log_file: String,
    /// Branch written to by the remote store
    pub branch: String,
    /// Name of the ignore file looked up in each directory
    pub ignore_file: String,
    /// Commit message prefix for periodic passes; a timestamp is appended
    pub commit_prefix: String,
    /// Commit message used by the bulk importer
    pub import_message: String,
    /// Text logged in place of a summary when summarization fails
    pub summary_placeholder: String,
    /// Fetch-then-write attempts when appending to the log races another writer
    pub log_append_attempts: u32,
    /// Hand conflicting or failed paths back to the ledger for the next pass
    pub requeue_failed: bool,
}

impl Default for ChronicleConfig {
    fn default() -> Self {
        Self {
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            request_timeout_secs: 30,
            log_file: "log.txt".to_string(),
            branch: "main".to_string(),
            ignore_file: ".gitignore".to_string(),
            commit_prefix: "Automated commit".to_string(),
            import_message: "Auto-upload from folder".to_string(),
            summary_placeholder: DEFAULT_SUMMARY_PLACEHOLDER.to_string(),
            log_append_attempts: 3,
            requeue_failed: true,
        }
    }
}

impl ChronicleConfig {
    /// Load from an explicit path, or from the default location if none given.
    ///
    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match default_config_path() {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&path)?;
        let config: ChronicleConfig = toml::from_str(&raw)?;
        config.validate()?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sync_interval_secs == 0 {
            return Err(ChronicleError::Config(
                "sync_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ChronicleError::Config(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.log_file.trim().is_empty() || self.ignore_file.trim().is_empty() {
            return Err(ChronicleError::Config(
                "log_file and ignore_file must not be empty".to_string(),
            ));
        }
        if self.log_append_attempts == 0 {
            return Err(ChronicleError::Config(
                "log_append_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// `~/.config/chronicle/config.toml` (platform equivalent)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("chronicle").join("config.toml"))
}
