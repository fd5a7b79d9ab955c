//! Pipeline configuration
//!
//! Defaults mirror the deployed service; every field can be overridden from
//! the environment via [`OnrampConfig::from_env`], and the binaries layer
//! CLI flags on top.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Accepted repository references. Anchored at the start only, so suffixes
/// such as `.git` or `/tree/main` still pass.
pub const DEFAULT_REFERENCE_PATTERN: &str = r"^https://github\.com/[\w\-]+/[\w\-\.]+";

/// Levels of directory listing below the repository root.
pub const DEFAULT_MAX_TREE_DEPTH: usize = 4;

/// Cap on issue search results.
pub const DEFAULT_ISSUE_RESULT_LIMIT: usize = 15;

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OnrampConfig {
    /// Regex a repository reference must match before it is fetched.
    pub reference_pattern: String,
    /// Maximum depth of the structural tree.
    pub max_tree_depth: usize,
    /// Maximum issues returned by a skill search.
    pub issue_result_limit: usize,
    /// Label required on searched issues.
    pub issue_label: String,
    /// Parent directory for working areas (None = system temp dir).
    pub work_root: Option<PathBuf>,
    /// git executable used for shallow clones.
    pub git_binary: String,
    /// Base URL of the Ollama-compatible generation backend.
    pub generation_url: String,
    /// Model name sent with each generation request.
    pub generation_model: String,
    /// Upper bound on a single generation call.
    pub generation_timeout_secs: u64,
    /// GitHub REST API base URL.
    pub github_api_url: String,
    /// Personal access token for the GitHub API.
    pub github_token: Option<String>,
}

impl Default for OnrampConfig {
    fn default() -> Self {
        Self {
            reference_pattern: DEFAULT_REFERENCE_PATTERN.to_string(),
            max_tree_depth: DEFAULT_MAX_TREE_DEPTH,
            issue_result_limit: DEFAULT_ISSUE_RESULT_LIMIT,
            issue_label: "good first issue".to_string(),
            work_root: None,
            git_binary: "git".to_string(),
            generation_url: "http://localhost:11434".to_string(),
            generation_model: "codellama".to_string(),
            generation_timeout_secs: 900,
            github_api_url: "https://api.github.com".to_string(),
            github_token: None,
        }
    }
}

impl OnrampConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(pattern) = std::env::var("ONRAMP_REFERENCE_PATTERN") {
            config.reference_pattern = pattern;
        }
        if let Ok(depth) = std::env::var("ONRAMP_MAX_TREE_DEPTH") {
            if let Ok(n) = depth.parse() {
                config.max_tree_depth = n;
            }
        }
        if let Ok(limit) = std::env::var("ONRAMP_ISSUE_LIMIT") {
            if let Ok(n) = limit.parse() {
                config.issue_result_limit = n;
            }
        }
        if let Ok(label) = std::env::var("ONRAMP_ISSUE_LABEL") {
            config.issue_label = label;
        }
        if let Ok(dir) = std::env::var("ONRAMP_WORK_ROOT") {
            config.work_root = Some(PathBuf::from(dir));
        }
        if let Ok(git) = std::env::var("ONRAMP_GIT") {
            config.git_binary = git;
        }
        if let Ok(url) = std::env::var("OLLAMA_BASE_URL") {
            config.generation_url = url;
        }
        if let Ok(model) = std::env::var("OLLAMA_MODEL") {
            config.generation_model = model;
        }
        if let Ok(secs) = std::env::var("ONRAMP_GENERATION_TIMEOUT_SECS") {
            if let Ok(n) = secs.parse() {
                config.generation_timeout_secs = n;
            }
        }
        if let Ok(url) = std::env::var("GITHUB_API_URL") {
            config.github_api_url = url;
        }
        config.github_token = std::env::var("GITHUB_PAT")
            .ok()
            .filter(|token| !token.trim().is_empty());

        config
    }

    /// Generation timeout as a [`Duration`]
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    /// Directory that receives working areas
    pub fn resolved_work_root(&self) -> PathBuf {
        self.work_root.clone().unwrap_or_else(std::env::temp_dir)
    }
}
