//! Issue tracker access (GitHub REST v3)
//!
//! Only two reads are needed: one issue's body, and a recency-ordered search
//! for beginner-friendly issues.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::config::OnrampConfig;
use crate::error::{OnrampError, OnrampResult};

static REPO_FULL_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"github\.com/([\w\-]+/[\w\-\.]+)").expect("repo name pattern is valid")
});

static ISSUE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/issues/(\d+)").expect("issue number pattern is valid"));

/// Search hit returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueSummary {
    pub id: u64,
    pub title: String,
    pub url: String,
    #[serde(rename = "repoName")]
    pub repo_name: String,
    pub labels: Vec<String>,
}

/// `owner/name` and number of one issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueCoordinates {
    pub repo_full_name: String,
    pub number: u64,
}

impl IssueCoordinates {
    /// Extract coordinates from a repository URL and an issue URL.
    pub fn parse(repo_url: &str, issue_url: &str) -> OnrampResult<Self> {
        let repo_full_name = REPO_FULL_NAME
            .captures(repo_url)
            .and_then(|caps| caps.get(1))
            .map(|m| {
                let name = m.as_str();
                name.strip_suffix(".git").unwrap_or(name).to_string()
            })
            .ok_or_else(|| OnrampError::invalid_reference(repo_url))?;

        let number = ISSUE_NUMBER
            .captures(issue_url)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .ok_or_else(|| OnrampError::invalid_reference(issue_url))?;

        Ok(Self {
            repo_full_name,
            number,
        })
    }
}

/// Search query for open issues carrying `label` that match comma-separated skills.
pub fn skills_query(skills: &str, label: &str) -> String {
    let terms = skills
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    format!("{terms} is:issue is:open label:\"{label}\"")
        .trim_start()
        .to_string()
}

/// Read access to an issue tracker.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Body of issue `number` in `repo_full_name` (`owner/name`); `None` when empty.
    async fn issue_body(&self, repo_full_name: &str, number: u64) -> OnrampResult<Option<String>>;

    /// Newest-first issues matching `query`, at most `limit`.
    async fn search_issues(&self, query: &str, limit: usize) -> OnrampResult<Vec<IssueSummary>>;
}

#[derive(Deserialize)]
struct IssueResponse {
    body: Option<String>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    id: u64,
    title: String,
    html_url: String,
    repository_url: String,
    #[serde(default)]
    labels: Vec<Label>,
}

#[derive(Deserialize)]
struct Label {
    name: String,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

impl From<SearchItem> for IssueSummary {
    fn from(item: SearchItem) -> Self {
        // .../repos/{owner}/{name}
        let mut segments = item.repository_url.rsplit('/');
        let name = segments.next().unwrap_or_default();
        let owner = segments.next().unwrap_or_default();
        Self {
            id: item.id,
            title: item.title,
            url: item.html_url,
            repo_name: format!("{owner}/{name}"),
            labels: item.labels.into_iter().map(|l| l.name).collect(),
        }
    }
}

/// GitHub REST client.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(api_url: &str, token: Option<String>) -> OnrampResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("onramp/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| OnrampError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_config(config: &OnrampConfig) -> OnrampResult<Self> {
        if config.github_token.is_none() {
            tracing::warn!("GITHUB_PAT not set, using unauthenticated GitHub API (low rate limit)");
        }
        Self::new(&config.github_api_url, config.github_token.clone())
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self
            .http
            .get(format!("{}{path}", self.api_url))
            .header(reqwest::header::ACCEPT, "application/vnd.github+json");
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send_json<T: for<'de> Deserialize<'de>>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> OnrampResult<T> {
        let response = request
            .send()
            .await
            .map_err(|e| OnrampError::issue_lookup(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.message)
                .unwrap_or_else(|_| status.to_string());
            tracing::error!(%status, %message, "GitHub API error");
            return Err(OnrampError::issue_lookup(message));
        }

        response
            .json()
            .await
            .map_err(|e| OnrampError::issue_lookup(format!("unexpected response: {e}")))
    }
}

#[async_trait]
impl IssueTracker for GitHubClient {
    async fn issue_body(&self, repo_full_name: &str, number: u64) -> OnrampResult<Option<String>> {
        let issue: IssueResponse = self
            .send_json(self.get(&format!("/repos/{repo_full_name}/issues/{number}")))
            .await?;
        tracing::debug!(repo = repo_full_name, number, "Fetched issue");
        Ok(issue.body.filter(|b| !b.trim().is_empty()))
    }

    async fn search_issues(&self, query: &str, limit: usize) -> OnrampResult<Vec<IssueSummary>> {
        let per_page = limit.clamp(1, 100).to_string();
        let request = self.get("/search/issues").query(&[
            ("q", query),
            ("sort", "created"),
            ("order", "desc"),
            ("per_page", per_page.as_str()),
        ]);
        let results: SearchResponse = self.send_json(request).await?;
        let issues: Vec<IssueSummary> = results
            .items
            .into_iter()
            .take(limit)
            .map(IssueSummary::from)
            .collect();
        tracing::info!(count = issues.len(), query, "Found issues");
        Ok(issues)
    }
}
