//! GitHub REST client: tree discovery and blob content fetch.
//!
//! Discovery chains four requests: repository metadata for the default
//! branch, the latest commit on that branch, then the recursive tree for the
//! commit's root tree SHA, keeping blob entries only. Blob contents come back
//! base64-encoded; anything that does not decode to UTF-8 is silently
//! dropped as binary. Both operations run under the shared retry policy and
//! the GitHub circuit breaker.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures_util::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::Semaphore;

use repo_summary_core::{call_with_retry, ApiError, ApiResult, CircuitBreaker, RetryPolicy};

use crate::models::state::{FetchedFile, TreeEntry};

static REPO_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://(?:www\.)?github\.com/([^/\s]+)/([^/\s]+?)(?:\.git)?/?$")
        .expect("static repo url pattern")
});

/// Extract `(owner, repo)` from a GitHub repository URL.
pub fn parse_repo_url(url: &str) -> ApiResult<(String, String)> {
    let caps = REPO_URL
        .captures(url.trim())
        .ok_or_else(|| ApiError::invalid_input(format!("not a GitHub repository URL: {url}")))?;
    Ok((caps[1].to_string(), caps[2].to_string()))
}

/// What the engine needs from a repository host.
#[async_trait]
pub trait RepositoryApi: Send + Sync {
    /// All blob entries of the repository's default branch.
    async fn list_tree(&self, repo_url: &str) -> ApiResult<Vec<TreeEntry>>;

    /// Decoded contents for the given entries; binary blobs are skipped.
    async fn fetch_blobs(&self, repo_url: &str, entries: &[TreeEntry])
        -> ApiResult<Vec<FetchedFile>>;
}

#[derive(Debug, Clone)]
pub struct GithubClientConfig {
    pub api_base: String,
    /// Optional bearer token; absence just means anonymous rate limits.
    pub token: Option<String>,
    pub timeout: Duration,
    /// Concurrent blob requests within one fetch.
    pub concurrency: usize,
}

impl Default for GithubClientConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            token: None,
            timeout: Duration::from_secs(30),
            concurrency: 25,
        }
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Deserialize)]
struct RepoInfo {
    default_branch: Option<String>,
}

#[derive(Deserialize)]
struct CommitEntry {
    commit: Option<CommitDetail>,
}

#[derive(Deserialize)]
struct CommitDetail {
    tree: Option<TreeRef>,
}

#[derive(Deserialize)]
struct TreeRef {
    sha: Option<String>,
}

#[derive(Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeNode>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct TreeNode {
    path: Option<String>,
    #[serde(rename = "type")]
    node_type: Option<String>,
    size: Option<u64>,
    sha: Option<String>,
}

#[derive(Deserialize)]
struct BlobResponse {
    content: Option<String>,
    encoding: Option<String>,
}

// ============================================================================
// Client
// ============================================================================

pub struct GithubClient {
    config: GithubClientConfig,
    client: reqwest::Client,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
}

impl GithubClient {
    pub fn new(
        config: GithubClientConfig,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
    ) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent("repo-summary")
            .build()
            .map_err(|e| ApiError::network(format!("failed to build http client: {e}")))?;
        Ok(Self {
            config,
            client,
            breaker,
            retry,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> ApiResult<T> {
        let mut request = self.client.get(url).header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(map_request_error)?;
        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status_error(status, &body));
        }
        response
            .json()
            .await
            .map_err(|e| ApiError::invalid_response(format!("GitHub response was not JSON: {e}")))
    }

    async fn list_tree_once(&self, owner: &str, repo: &str) -> ApiResult<Vec<TreeEntry>> {
        let base = self.config.api_base.trim_end_matches('/');

        let info: RepoInfo = self.get_json(&format!("{base}/repos/{owner}/{repo}")).await?;
        let branch = info.default_branch.unwrap_or_else(|| "main".to_string());

        let commits: Vec<CommitEntry> = self
            .get_json(&format!(
                "{base}/repos/{owner}/{repo}/commits?sha={branch}&per_page=1"
            ))
            .await?;
        let tree_sha = commits
            .into_iter()
            .next()
            .and_then(|c| c.commit)
            .and_then(|c| c.tree)
            .and_then(|t| t.sha)
            .ok_or_else(|| {
                ApiError::invalid_response(format!("no commits found on branch {branch}"))
            })?;

        let tree: TreeResponse = self
            .get_json(&format!(
                "{base}/repos/{owner}/{repo}/git/trees/{tree_sha}?recursive=1"
            ))
            .await?;
        if tree.truncated {
            tracing::warn!(owner, repo, "tree listing truncated by GitHub");
        }

        let entries: Vec<TreeEntry> = tree
            .tree
            .into_iter()
            .filter(|node| node.node_type.as_deref() == Some("blob"))
            .filter_map(|node| {
                let path = node.path.filter(|p| !p.is_empty())?;
                Some(TreeEntry::new(path, node.size, node.sha))
            })
            .collect();
        tracing::info!(owner, repo, blobs = entries.len(), "tree listed");
        Ok(entries)
    }

    async fn fetch_blob(&self, owner: &str, repo: &str, entry: &TreeEntry) -> ApiResult<Option<FetchedFile>> {
        let Some(sha) = &entry.sha else {
            return Ok(None);
        };
        let base = self.config.api_base.trim_end_matches('/');
        let blob: BlobResponse = self
            .get_json(&format!("{base}/repos/{owner}/{repo}/git/blobs/{sha}"))
            .await?;

        if blob.encoding.as_deref() != Some("base64") {
            return Ok(None);
        }
        let Some(raw) = blob.content else {
            return Ok(None);
        };
        let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        let Ok(bytes) = BASE64.decode(compact.as_bytes()) else {
            return Ok(None);
        };
        match String::from_utf8(bytes) {
            Ok(content) => Ok(Some(FetchedFile {
                path: entry.path.clone(),
                content,
            })),
            // Binary blob; skip without noise.
            Err(_) => Ok(None),
        }
    }

    async fn fetch_blobs_once(
        &self,
        owner: &str,
        repo: &str,
        entries: &[TreeEntry],
    ) -> ApiResult<Vec<FetchedFile>> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let futures = entries.iter().map(|entry| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|e| ApiError::network(format!("semaphore closed: {e}")))?;
                self.fetch_blob(owner, repo, entry).await
            }
        });

        let mut files = Vec::new();
        for result in join_all(futures).await {
            if let Some(file) = result? {
                files.push(file);
            }
        }
        tracing::debug!(
            owner,
            repo,
            requested = entries.len(),
            decoded = files.len(),
            "blobs fetched"
        );
        Ok(files)
    }
}

fn map_request_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::timeout(format!("GitHub request timed out: {err}"))
    } else {
        ApiError::network(format!("GitHub request failed: {err}"))
    }
}

fn map_status_error(status: u16, body: &str) -> ApiError {
    let snippet: String = body.chars().take(200).collect();
    match status {
        // GitHub reports rate limiting as 403; treat it as transient.
        403 | 429 => ApiError::rate_limited(format!("GitHub rate limit: {snippet}")),
        404 => ApiError::not_found("repository, branch, or blob not found"),
        401 => ApiError::access_denied("GitHub authentication failed"),
        500..=599 => ApiError::server_error(status, snippet),
        _ => ApiError::invalid_input(format!("GitHub API error {status}: {snippet}")),
    }
}

#[async_trait]
impl RepositoryApi for GithubClient {
    async fn list_tree(&self, repo_url: &str) -> ApiResult<Vec<TreeEntry>> {
        let (owner, repo) = parse_repo_url(repo_url)?;
        call_with_retry(&self.retry, &self.breaker, || {
            self.list_tree_once(&owner, &repo)
        })
        .await
    }

    async fn fetch_blobs(
        &self,
        repo_url: &str,
        entries: &[TreeEntry],
    ) -> ApiResult<Vec<FetchedFile>> {
        let (owner, repo) = parse_repo_url(repo_url)?;
        call_with_retry(&self.retry, &self.breaker, || {
            self.fetch_blobs_once(&owner, &repo, entries)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repo_url() {
        assert_eq!(
            parse_repo_url("https://github.com/acme/widgets").unwrap(),
            ("acme".to_string(), "widgets".to_string())
        );
        assert_eq!(
            parse_repo_url("http://www.github.com/acme/widgets.git").unwrap(),
            ("acme".to_string(), "widgets".to_string())
        );
        assert_eq!(
            parse_repo_url("https://github.com/acme/widgets/").unwrap(),
            ("acme".to_string(), "widgets".to_string())
        );
    }

    #[test]
    fn test_parse_repo_url_rejects_garbage() {
        assert!(matches!(
            parse_repo_url("https://gitlab.com/acme/widgets"),
            Err(ApiError::InvalidInput(_))
        ));
        assert!(parse_repo_url("github.com/acme/widgets").is_err());
        assert!(parse_repo_url("https://github.com/acme").is_err());
        assert!(parse_repo_url("").is_err());
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            map_status_error(403, "API rate limit exceeded"),
            ApiError::RateLimited(_)
        ));
        assert!(matches!(map_status_error(404, ""), ApiError::NotFound(_)));
        assert!(matches!(
            map_status_error(401, ""),
            ApiError::AccessDenied(_)
        ));
        assert!(matches!(
            map_status_error(502, "bad gateway"),
            ApiError::ServerError { status: 502, .. }
        ));
    }

    #[test]
    fn test_base64_whitespace_tolerance() {
        // GitHub inserts newlines into base64 payloads.
        let raw = "aGVsbG8g\nd29ybGQ=\n";
        let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = BASE64.decode(compact.as_bytes()).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "hello world");
    }
}
