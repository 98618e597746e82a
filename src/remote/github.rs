//! GitHub contents API as remote store and repository host
//!
//! The blob `sha` returned by the contents API is the version token: a PUT
//! carrying a stale `sha` is rejected, which maps to [`PutOutcome::Conflict`].

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::{Deserialize, Serialize};

use super::{PutOutcome, RemoteFile, RemoteStore, RepoHost};
use crate::error::{ChronicleError, Result};
use crate::types::Visibility;

const USER_AGENT: &str = concat!("chronicle-sync/", env!("CARGO_PKG_VERSION"));

/// GitHub credentials and endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    pub token: String,
    /// Account that owns the mirrored repositories
    pub owner: String,
    pub api_url: String,
    pub branch: String,
}

impl GitHubConfig {
    /// Create config from environment variables
    pub fn from_env() -> Option<Self> {
        let token = std::env::var("GITHUB_TOKEN").ok()?;
        let owner = std::env::var("GITHUB_USERNAME").ok()?;
        let api_url = std::env::var("GITHUB_API_URL")
            .unwrap_or_else(|_| "https://api.github.com".to_string());

        Some(Self {
            token,
            owner,
            api_url,
            branch: "main".to_string(),
        })
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }
}

/// GitHub REST client
pub struct GitHubClient {
    client: reqwest::Client,
    config: GitHubConfig,
}

impl GitHubClient {
    pub fn new(config: GitHubConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Create client from environment variables
    pub fn from_env() -> Option<Self> {
        GitHubConfig::from_env().map(Self::new)
    }

    pub fn config(&self) -> &GitHubConfig {
        &self.config
    }

    /// API endpoint with each segment percent-encoded
    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
        let base = &self.config.api_url;
        let mut url = Url::parse(base).map_err(|e| {
            ChronicleError::Config(format!("invalid GitHub API URL '{}': {}", base, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                ChronicleError::Config(format!("GitHub API URL '{}' has no path", base))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn contents_url(&self, repo_id: &str, path: &str) -> Result<Url> {
        let prefix = ["repos", self.config.owner.as_str(), repo_id, "contents"];
        let path = path.split('/').filter(|segment| !segment.is_empty());
        self.endpoint(prefix.into_iter().chain(path))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.config.token)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
    }
}

#[derive(Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Serialize)]
struct PutRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Deserialize)]
struct PutResponse {
    content: PutResponseContent,
}

#[derive(Deserialize)]
struct PutResponseContent {
    sha: String,
}

#[derive(Serialize)]
struct CreateRepoRequest<'a> {
    name: &'a str,
    private: bool,
}

/// Decode a contents API body; GitHub wraps base64 at 60 columns
fn decode_content(encoded: &str) -> Result<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64
        .decode(compact)
        .map_err(|e| ChronicleError::Remote(format!("invalid base64 content: {}", e)))?;
    Ok(crate::watch::decode_text(bytes))
}

fn transport(e: reqwest::Error) -> ChronicleError {
    ChronicleError::Transport(e.to_string())
}

async fn api_error(response: reqwest::Response) -> ChronicleError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    ChronicleError::Remote(format!("Status {}: {}", status, body))
}

#[async_trait]
impl RemoteStore for GitHubClient {
    async fn get(&self, repo_id: &str, path: &str) -> Result<Option<RemoteFile>> {
        let url = self.contents_url(repo_id, path)?;
        let response = self
            .authorized(self.client.get(url))
            .query(&[("ref", self.config.branch.as_str())])
            .send()
            .await
            .map_err(transport)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let body: ContentsResponse = response.json().await.map_err(|e| {
            ChronicleError::Remote(format!("Failed to parse contents response: {}", e))
        })?;

        let content = match body.encoding.as_deref() {
            Some("base64") | None => decode_content(&body.content)?,
            Some(other) => {
                return Err(ChronicleError::Remote(format!(
                    "unsupported content encoding '{}' for {}",
                    other, path
                )))
            }
        };

        Ok(Some(RemoteFile {
            content,
            version: body.sha,
        }))
    }

    async fn put(
        &self,
        repo_id: &str,
        path: &str,
        content: &str,
        version: Option<&str>,
        message: &str,
    ) -> Result<PutOutcome> {
        let url = self.contents_url(repo_id, path)?;
        let payload = PutRequest {
            message,
            content: BASE64.encode(content.as_bytes()),
            branch: &self.config.branch,
            sha: version,
        };

        let response = self
            .authorized(self.client.put(url))
            .json(&payload)
            .send()
            .await
            .map_err(transport)?;

        match response.status() {
            // 409: sha does not match; 422: sha missing for an existing file
            StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                let body = response.text().await.unwrap_or_default();
                tracing::debug!("Contents PUT for {} rejected: {}", path, body);
                Ok(PutOutcome::Conflict)
            }
            status if status.is_success() => {
                let body: PutResponse = response.json().await.map_err(|e| {
                    ChronicleError::Remote(format!("Failed to parse put response: {}", e))
                })?;
                Ok(PutOutcome::Written {
                    version: body.content.sha,
                })
            }
            _ => Err(api_error(response).await),
        }
    }
}

#[async_trait]
impl RepoHost for GitHubClient {
    async fn exists(&self, repo_id: &str) -> Result<bool> {
        let url = self.endpoint(["repos", self.config.owner.as_str(), repo_id])?;
        let response = self
            .authorized(self.client.get(url))
            .send()
            .await
            .map_err(transport)?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(api_error(response).await),
        }
    }

    async fn create(&self, repo_id: &str, visibility: Visibility) -> Result<()> {
        let url = self.endpoint(["user", "repos"])?;
        let response = self
            .authorized(self.client.post(url))
            .json(&CreateRepoRequest {
                name: repo_id,
                private: visibility.is_private(),
            })
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        tracing::info!("Created repository {}/{}", self.config.owner, repo_id);
        Ok(())
    }
}
