//! Core types for Chronicle

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{ChronicleError, Result};

/// Relative path inside the monitored root, always `/`-separated
pub type RelativePath = String;

/// Latest observed state of a path waiting to be synced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "text", rename_all = "lowercase")]
pub enum PendingContent {
    /// File exists with this content
    Text(String),
    /// File was deleted
    Tombstone,
}

impl PendingContent {
    /// Content to write remotely; a tombstone is written as an empty file
    pub fn as_str(&self) -> &str {
        match self {
            PendingContent::Text(text) => text,
            PendingContent::Tombstone => "",
        }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self, PendingContent::Tombstone)
    }
}

impl From<String> for PendingContent {
    fn from(text: String) -> Self {
        PendingContent::Text(text)
    }
}

impl From<&str> for PendingContent {
    fn from(text: &str) -> Self {
        PendingContent::Text(text.to_string())
    }
}

/// A single pending change, keyed by relative path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub relative_path: RelativePath,
    pub content: PendingContent,
}

impl ChangeRecord {
    pub fn new(relative_path: impl Into<RelativePath>, content: impl Into<PendingContent>) -> Self {
        Self {
            relative_path: relative_path.into(),
            content: content.into(),
        }
    }

    pub fn tombstone(relative_path: impl Into<RelativePath>) -> Self {
        Self {
            relative_path: relative_path.into(),
            content: PendingContent::Tombstone,
        }
    }
}

/// Remote store's current state for a path, fetched fresh per reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFileHandle {
    pub path: String,
    /// `None` means the path does not exist remotely yet
    pub version_token: Option<String>,
    pub content: Option<String>,
}

impl RemoteFileHandle {
    /// Handle for a path the store reported as not found
    pub fn missing(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            version_token: None,
            content: None,
        }
    }

    pub fn exists(&self) -> bool {
        self.version_token.is_some()
    }

    /// Remote content, or empty when the path does not exist
    pub fn old_content(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

/// Kind of filesystem change observed by the watch source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// A filesystem event for a path under the monitored root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: ChangeKind,
    pub absolute_path: PathBuf,
}

impl WatchEvent {
    pub fn new(kind: ChangeKind, absolute_path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            absolute_path: absolute_path.into(),
        }
    }
}

/// Repository visibility used when creating a repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    #[default]
    Private,
}

impl Visibility {
    pub fn is_private(self) -> bool {
        matches!(self, Visibility::Private)
    }
}

impl std::str::FromStr for Visibility {
    type Err = ChronicleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            other => Err(ChronicleError::InvalidInput(format!(
                "unknown visibility '{}', expected public or private",
                other
            ))),
        }
    }
}

/// What to do with the target repository when a session starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepoAction {
    /// Create the repository before monitoring
    Create,
    /// Use a repository that must already exist
    UseExisting,
}

impl std::str::FromStr for RepoAction {
    type Err = ChronicleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "create" => Ok(RepoAction::Create),
            "use-existing" | "use_existing" | "existing" | "use" => Ok(RepoAction::UseExisting),
            other => Err(ChronicleError::InvalidInput(format!(
                "unknown repo action '{}', expected create or use-existing",
                other
            ))),
        }
    }
}

/// Parameters of a session start command
///
/// Field names on the wire follow the original form used by the web front-end
/// (`folderToMonitor`, `repoName`, ...). Everything is optional at the serde
/// level so that missing fields are reported by [`SessionRequest::validate`]
/// as client errors instead of deserialization failures.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionRequest {
    #[serde(rename = "folderToMonitor", alias = "directoryPath", default)]
    pub directory_path: Option<String>,
    #[serde(rename = "repoName", alias = "repoId", default)]
    pub repo_id: Option<String>,
    #[serde(rename = "repoAction", default)]
    pub repo_action: Option<String>,
    #[serde(rename = "repoVisibility", alias = "visibility", default)]
    pub visibility: Option<String>,
    #[serde(
        rename = "pushAllData",
        alias = "importExisting",
        default,
        deserialize_with = "deserialize_flag"
    )]
    pub import_existing: bool,
}

/// A validated session start command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSpec {
    pub directory_path: PathBuf,
    pub repo_id: String,
    pub repo_action: RepoAction,
    pub visibility: Visibility,
    pub import_existing: bool,
}

impl SessionRequest {
    /// Reject missing or malformed fields before any side effect happens
    pub fn validate(&self) -> Result<SessionSpec> {
        let directory = required(&self.directory_path, "folderToMonitor")?;
        let repo_id = required(&self.repo_id, "repoName")?;
        let repo_action = required(&self.repo_action, "repoAction")?.parse::<RepoAction>()?;
        let visibility = required(&self.visibility, "repoVisibility")?.parse::<Visibility>()?;

        if repo_id.contains('/') || repo_id.contains(char::is_whitespace) {
            return Err(ChronicleError::InvalidInput(format!(
                "invalid repository name '{}'",
                repo_id
            )));
        }

        Ok(SessionSpec {
            directory_path: PathBuf::from(shellexpand::tilde(directory).as_ref()),
            repo_id: repo_id.to_string(),
            repo_action,
            visibility,
            import_existing: self.import_existing,
        })
    }
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ChronicleError::InvalidInput(format!(
            "missing parameter: {}",
            field
        ))),
    }
}

/// Accept `true`, `"true"`, `"on"`, `"1"` so both HTML forms and JSON work
fn deserialize_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(b)) => b,
        Some(Flag::Text(s)) => matches!(
            s.trim().to_lowercase().as_str(),
            "true" | "on" | "1" | "yes"
        ),
        None => false,
    })
}

/// Serializable view of a running session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub root: PathBuf,
    pub repo_id: String,
    pub started_at: DateTime<Utc>,
    pub pending_changes: usize,
    pub last_pass_at: Option<DateTime<Utc>>,
}
