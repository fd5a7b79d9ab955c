//! Repository acquisition: reference validation and shallow fetch.

use async_trait::async_trait;
use regex::Regex;
use std::path::Path;
use tokio::process::Command;

use crate::error::{OnrampError, OnrampResult};

/// Fetches the latest revision of a repository into an empty directory.
#[async_trait]
pub trait RepositorySource: Send + Sync {
    /// Shallow-fetch `reference` into `dest`, which exists and is empty.
    ///
    /// Network, authentication, and not-found failures all surface as
    /// [`OnrampError::Acquisition`].
    async fn fetch(&self, reference: &str, dest: &Path) -> OnrampResult<()>;
}

/// Shallow clone through the `git` CLI.
#[derive(Debug, Clone)]
pub struct GitCliSource {
    git_binary: String,
    depth: u32,
}

impl Default for GitCliSource {
    fn default() -> Self {
        Self::new("git")
    }
}

impl GitCliSource {
    pub fn new(git_binary: impl Into<String>) -> Self {
        Self {
            git_binary: git_binary.into(),
            depth: 1,
        }
    }
}

#[async_trait]
impl RepositorySource for GitCliSource {
    async fn fetch(&self, reference: &str, dest: &Path) -> OnrampResult<()> {
        let depth = self.depth.to_string();
        let output = Command::new(&self.git_binary)
            .args(["clone", "--depth", &depth, "--quiet", "--", reference])
            .arg(dest)
            // Never block on a credential prompt
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| OnrampError::acquisition(reference, format!("failed to run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OnrampError::acquisition(reference, stderr.trim()));
        }
        Ok(())
    }
}

/// Accepts or rejects repository references before anything is fetched.
#[derive(Debug, Clone)]
pub struct ReferenceValidator {
    pattern: Regex,
}

impl ReferenceValidator {
    pub fn new(pattern: &str) -> OnrampResult<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| OnrampError::config(format!("invalid reference pattern: {e}")))?;
        Ok(Self { pattern })
    }

    pub fn is_valid(&self, reference: &str) -> bool {
        self.pattern.is_match(reference)
    }

    pub fn validate(&self, reference: &str) -> OnrampResult<()> {
        if self.is_valid(reference) {
            Ok(())
        } else {
            Err(OnrampError::invalid_reference(reference))
        }
    }
}

/// Human-facing repository name: the last non-empty path segment without a
/// trailing `.git`.
pub fn display_name(reference: &str) -> String {
    let last = reference
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(reference);
    last.strip_suffix(".git").unwrap_or(last).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_REFERENCE_PATTERN;

    fn validator() -> ReferenceValidator {
        ReferenceValidator::new(DEFAULT_REFERENCE_PATTERN).unwrap()
    }

    #[test]
    fn test_accepts_github_urls() {
        let v = validator();
        assert!(v.is_valid("https://github.com/rust-lang/rust"));
        assert!(v.is_valid("https://github.com/tokio-rs/tokio.git"));
        assert!(v.is_valid("https://github.com/user_1/my.repo"));
    }

    #[test]
    fn test_rejects_other_references() {
        let v = validator();
        for reference in [
            "",
            "github.com/rust-lang/rust",
            "http://github.com/rust-lang/rust",
            "https://gitlab.com/a/b",
            "https://github.com/only-owner",
            "file:///etc",
            " https://github.com/a/b",
        ] {
            assert!(
                matches!(v.validate(reference), Err(OnrampError::InvalidReference { .. })),
                "expected rejection for {reference:?}"
            );
        }
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let result = ReferenceValidator::new("([");
        assert!(matches!(result, Err(OnrampError::Config { .. })));
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("https://github.com/tokio-rs/tokio"), "tokio");
        assert_eq!(display_name("https://github.com/tokio-rs/tokio.git"), "tokio");
        assert_eq!(display_name("https://github.com/tokio-rs/tokio/"), "tokio");
        assert_eq!(display_name("https://github.com/a/my.github.io"), "my.github.io");
    }

    #[tokio::test]
    async fn test_git_source_missing_binary_is_acquisition_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = GitCliSource::new("definitely-not-a-git-binary");
        let result = source.fetch("https://github.com/a/b", dir.path()).await;
        assert!(matches!(result, Err(OnrampError::Acquisition { .. })));
    }
}
