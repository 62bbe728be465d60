//! Pull-request adapter: one interface, three hosting-platform backends.
//!
//! The backends differ in auth header, payload shape, URL encoding, and
//! response parsing; everything else is shared. A missing credential is a
//! soft-skip (`Ok(None)`), never an error: the orchestrator records the push
//! as `Branch pushed (PR not created)` instead.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::{Platform, PrConfig, RunConfig};
use crate::domain::error::{FleetError, Result};

const GITHUB_API: &str = "https://api.github.com";
const GITLAB_API: &str = "https://gitlab.com/api/v4";
const BITBUCKET_API: &str = "https://api.bitbucket.org/2.0";

const USER_AGENT: &str = concat!("repofleet/", env!("CARGO_PKG_VERSION"));

/// Opens a pull/merge request on one hosting platform.
#[async_trait]
pub trait PullRequestBackend: Send + Sync {
    /// Returns the PR URL, `Ok(None)` when skipped for missing credentials,
    /// or an error carrying the platform's diagnostic message.
    async fn create_pull_request(
        &self,
        owner_repo: &str,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> Result<Option<String>>;
}

/// Select the backend once at startup.
pub fn backend_for(config: &RunConfig) -> Box<dyn PullRequestBackend> {
    let token = config.auth.token.clone();
    let api_base = config.pr.api_base_url.clone();
    let timeout = config.operation_timeout_secs;
    match config.pr.platform {
        Platform::Github => Box::new(GithubBackend::new(token, api_base, timeout)),
        Platform::Gitlab => Box::new(GitlabBackend::new(token, api_base, timeout)),
        Platform::Bitbucket => Box::new(BitbucketBackend::new(
            config.auth.username.clone(),
            token,
            api_base,
            timeout,
        )),
    }
}

fn http_client(timeout_secs: u64) -> reqwest::Client {
    let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
    if timeout_secs > 0 {
        builder = builder.timeout(Duration::from_secs(timeout_secs));
    }
    builder.build().expect("reqwest client")
}

fn missing_token(token: &Option<String>) -> bool {
    token.as_deref().unwrap_or("").is_empty()
}

/// Pull a string field out of a JSON response, descending dotted segments.
fn string_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut cursor = value;
    for segment in path {
        cursor = cursor.get(segment)?;
    }
    cursor.as_str()
}

/// Best-effort diagnostic from an error response body.
fn diagnostic(value: &Value, path: &[&str], status: reqwest::StatusCode) -> String {
    match string_at(value, path) {
        Some(message) => format!("{status}: {message}"),
        None => format!("{status}: {value}"),
    }
}

// ── GitHub ────────────────────────────────────────────────────────────────

pub struct GithubBackend {
    client: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

impl GithubBackend {
    pub fn new(token: Option<String>, api_base: Option<String>, timeout_secs: u64) -> Self {
        Self {
            client: http_client(timeout_secs),
            api_base: api_base.unwrap_or_else(|| GITHUB_API.to_string()),
            token,
        }
    }
}

#[async_trait]
impl PullRequestBackend for GithubBackend {
    async fn create_pull_request(
        &self,
        owner_repo: &str,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> Result<Option<String>> {
        if missing_token(&self.token) {
            info!(repo = %owner_repo, "no token configured; skipping PR creation");
            return Ok(None);
        }
        let url = format!("{}/repos/{}/pulls", self.api_base, owner_repo);
        let payload = json!({
            "title": title,
            "body": body,
            "head": head,
            "base": base,
        });

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("token {}", self.token.as_deref().unwrap_or("")),
            )
            .header("Accept", "application/vnd.github.v3+json")
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let value: Value = response.json().await?;
        match string_at(&value, &["html_url"]) {
            Some(pr_url) => {
                info!(url = %pr_url, "pull request created");
                Ok(Some(pr_url.to_string()))
            }
            None => Err(FleetError::PullRequestRejected(diagnostic(
                &value,
                &["message"],
                status,
            ))),
        }
    }
}

// ── GitLab ────────────────────────────────────────────────────────────────

pub struct GitlabBackend {
    client: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

impl GitlabBackend {
    pub fn new(token: Option<String>, api_base: Option<String>, timeout_secs: u64) -> Self {
        Self {
            client: http_client(timeout_secs),
            api_base: api_base.unwrap_or_else(|| GITLAB_API.to_string()),
            token,
        }
    }
}

#[async_trait]
impl PullRequestBackend for GitlabBackend {
    async fn create_pull_request(
        &self,
        owner_repo: &str,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> Result<Option<String>> {
        if missing_token(&self.token) {
            info!(repo = %owner_repo, "no token configured; skipping MR creation");
            return Ok(None);
        }
        // GitLab addresses projects by their URL-encoded full path as a
        // single path segment.
        let project_id = urlencoding::encode(owner_repo);
        let url = format!("{}/projects/{}/merge_requests", self.api_base, project_id);
        let payload = json!({
            "source_branch": head,
            "target_branch": base,
            "title": title,
            "description": body,
        });

        let response = self
            .client
            .post(&url)
            .header("PRIVATE-TOKEN", self.token.as_deref().unwrap_or(""))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let value: Value = response.json().await?;
        match string_at(&value, &["web_url"]) {
            Some(mr_url) => {
                info!(url = %mr_url, "merge request created");
                Ok(Some(mr_url.to_string()))
            }
            None => Err(FleetError::PullRequestRejected(diagnostic(
                &value,
                &["message"],
                status,
            ))),
        }
    }
}

// ── Bitbucket ─────────────────────────────────────────────────────────────

pub struct BitbucketBackend {
    client: reqwest::Client,
    api_base: String,
    username: String,
    token: Option<String>,
}

impl BitbucketBackend {
    pub fn new(
        username: String,
        token: Option<String>,
        api_base: Option<String>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            client: http_client(timeout_secs),
            api_base: api_base.unwrap_or_else(|| BITBUCKET_API.to_string()),
            username,
            token,
        }
    }
}

#[async_trait]
impl PullRequestBackend for BitbucketBackend {
    async fn create_pull_request(
        &self,
        owner_repo: &str,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> Result<Option<String>> {
        if missing_token(&self.token) {
            info!(repo = %owner_repo, "no app password configured; skipping PR creation");
            return Ok(None);
        }
        let url = format!("{}/repositories/{}/pullrequests", self.api_base, owner_repo);
        let payload = json!({
            "title": title,
            "description": body,
            "source": { "branch": { "name": head } },
            "destination": { "branch": { "name": base } },
        });

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.username, self.token.as_deref())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let value: Value = response.json().await?;
        // Bitbucket nests the canonical URL one level down.
        match string_at(&value, &["links", "html", "href"]) {
            Some(pr_url) => {
                info!(url = %pr_url, "pull request created");
                Ok(Some(pr_url.to_string()))
            }
            None => Err(FleetError::PullRequestRejected(diagnostic(
                &value,
                &["error", "message"],
                status,
            ))),
        }
    }
}

/// Convenience driver used by the orchestrator: applies the configured
/// title/body/base and logs the attempt.
pub async fn open_pull_request(
    backend: &dyn PullRequestBackend,
    pr: &PrConfig,
    owner_repo: &str,
    head_branch: &str,
) -> Result<Option<String>> {
    info!(
        repo = %owner_repo,
        head = %head_branch,
        base = %pr.base_branch,
        "creating pull request"
    );
    let result = backend
        .create_pull_request(owner_repo, head_branch, &pr.base_branch, &pr.title, &pr.body)
        .await;
    if let Err(e) = &result {
        warn!(repo = %owner_repo, error = %e, "pull request creation failed");
    }
    result
}
