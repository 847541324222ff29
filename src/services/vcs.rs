use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use url::Url;

use crate::core::config::Settings;

/// `owner/repo` identity extracted from a submitted repository URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RepoIdentity {
    pub(crate) owner: String,
    pub(crate) repo: String,
}

impl RepoIdentity {
    /// Fails soft: anything that is not a recognizable GitHub repository
    /// URL yields `None` and the caller renders the invalid-URL error.
    pub(crate) fn parse(raw: &str) -> Option<Self> {
        let url = Url::parse(raw.trim()).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }

        let host = url.host_str()?.to_ascii_lowercase();
        if host != "github.com" && host != "www.github.com" {
            return None;
        }

        // First two path segments; anything after (tree/, blob/, ...) is
        // browsing noise.
        let mut segments = url.path_segments()?.filter(|segment| !segment.is_empty());
        let owner = segments.next()?.to_string();
        let repo_raw = segments.next()?;
        let repo = repo_raw.strip_suffix(".git").unwrap_or(repo_raw).to_string();

        if owner.is_empty() || repo.is_empty() {
            return None;
        }

        Some(Self { owner, repo })
    }

    pub(crate) fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

#[async_trait]
pub(crate) trait VcsContentService: Send + Sync {
    /// Every blob path in the repository's default branch.
    async fn list_tree(&self, repo: &RepoIdentity) -> Result<Vec<String>>;

    /// File content at `path`, or `None` when the path does not exist.
    async fn fetch_file(&self, repo: &RepoIdentity, path: &str) -> Result<Option<String>>;
}

pub(crate) struct GithubContentService {
    client: Client,
    base_url: String,
    token: String,
}

impl GithubContentService {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Self> {
        let github = settings.github();
        if !github.has_token() {
            tracing::warn!("GITHUB_TOKEN not configured; unauthenticated API rate limits apply");
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(github.request_timeout))
            .user_agent("aula-rust")
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: github.api_base_url.trim_end_matches('/').to_string(),
            token: github.token.clone(),
        })
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(url).header("Accept", "application/vnd.github+json");
        if self.token.is_empty() {
            request
        } else {
            request.bearer_auth(&self.token)
        }
    }

    async fn default_branch(&self, repo: &RepoIdentity) -> Result<String> {
        let url = format!("{}/repos/{}/{}", self.base_url, repo.owner, repo.repo);
        let response = self.get(&url).send().await.context("Failed to call GitHub API")?;
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        if status == StatusCode::NOT_FOUND {
            anyhow::bail!("repository {} not found", repo.full_name());
        }
        if !status.is_success() {
            anyhow::bail!("GitHub API error ({status}): {}", extract_error_message(&body));
        }

        body.get("default_branch")
            .and_then(|value| value.as_str())
            .map(|branch| branch.to_string())
            .context("Missing default_branch in GitHub repository response")
    }
}

#[async_trait]
impl VcsContentService for GithubContentService {
    async fn list_tree(&self, repo: &RepoIdentity) -> Result<Vec<String>> {
        let branch = self.default_branch(repo).await?;
        let url = format!(
            "{}/repos/{}/{}/git/trees/{}?recursive=1",
            self.base_url, repo.owner, repo.repo, branch
        );

        let response = self.get(&url).send().await.context("Failed to call GitHub API")?;
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        if !status.is_success() {
            anyhow::bail!("GitHub API error ({status}): {}", extract_error_message(&body));
        }

        if body.get("truncated").and_then(|value| value.as_bool()).unwrap_or(false) {
            tracing::warn!(repo = %repo.full_name(), "GitHub tree listing truncated");
        }

        let entries = body
            .get("tree")
            .and_then(|value| value.as_array())
            .context("Missing tree in GitHub response")?;

        let paths = entries
            .iter()
            .filter(|entry| {
                entry.get("type").and_then(|value| value.as_str()) == Some("blob")
            })
            .filter_map(|entry| entry.get("path").and_then(|value| value.as_str()))
            .map(|path| path.to_string())
            .collect();

        Ok(paths)
    }

    async fn fetch_file(&self, repo: &RepoIdentity, path: &str) -> Result<Option<String>> {
        let url = format!(
            "{}/repos/{}/{}/contents/{}",
            self.base_url, repo.owner, repo.repo, path
        );

        let response = self.get(&url).send().await.context("Failed to call GitHub API")?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            anyhow::bail!("GitHub API error ({status}): {}", extract_error_message(&body));
        }

        let encoding = body.get("encoding").and_then(|value| value.as_str()).unwrap_or_default();
        if encoding != "base64" {
            // Blobs over the contents-API size limit come back without
            // inline content.
            anyhow::bail!("unsupported content encoding {encoding:?} for {path}");
        }

        let raw = body
            .get("content")
            .and_then(|value| value.as_str())
            .context("Missing content in GitHub response")?;

        let compact: String = raw.chars().filter(|ch| !ch.is_ascii_whitespace()).collect();
        let bytes = STANDARD.decode(compact).context("Invalid base64 in GitHub response")?;

        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }
}

fn extract_error_message(body: &Value) -> String {
    body.get("message")
        .and_then(|value| value.as_str())
        .map(|message| message.to_string())
        .unwrap_or_else(|| body.to_string())
}
