//! Contribution plan service
//!
//! Owns the long-lived collaborators (cache, issue tracker, generation
//! client) and runs each request through them. Built once at startup and
//! shared by `Arc`; [`ContributionPlanService::shutdown`] tears the cache down.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::assist::{self, CodeReview};
use crate::config::OnrampConfig;
use crate::error::{OnrampError, OnrampResult};
use crate::issues::{skills_query, GitHubClient, IssueCoordinates, IssueSummary, IssueTracker};
use crate::llm::{decode_ndjson, Generator, OllamaClient, TextStream};
use crate::plan::{assemble_plan_prompt, parse_plan, render_tree, ContributionStep};
use crate::repo::{
    GitCliSource, ReferenceValidator, RepoAnalysis, RepositoryCache, TeardownReport, TreeBuilder,
};

/// Issue body used when the tracker has none.
pub const NO_DESCRIPTION: &str = "No description provided.";

/// Pipeline stage of a contribution plan request, for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanStage {
    ValidateReferences,
    EnsureCached,
    FetchIssueMetadata,
    AssemblePrompt,
    Generate,
    ParsePlan,
}

impl std::fmt::Display for PlanStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ValidateReferences => "validate_references",
            Self::EnsureCached => "ensure_cached",
            Self::FetchIssueMetadata => "fetch_issue_metadata",
            Self::AssemblePrompt => "assemble_prompt",
            Self::Generate => "generate",
            Self::ParsePlan => "parse_plan",
        };
        f.write_str(name)
    }
}

/// Request for a guided contribution plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContributionRequest {
    pub repo_url: String,
    pub issue_url: String,
    pub issue_title: String,
}

/// Ordered plan returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContributionPlan {
    pub plan: Vec<ContributionStep>,
}

pub struct ContributionPlanService {
    config: OnrampConfig,
    cache: Arc<RepositoryCache>,
    issues: Arc<dyn IssueTracker>,
    generator: Arc<dyn Generator>,
}

impl ContributionPlanService {
    pub fn new(
        config: OnrampConfig,
        cache: Arc<RepositoryCache>,
        issues: Arc<dyn IssueTracker>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self {
            config,
            cache,
            issues,
            generator,
        }
    }

    /// Wire the production collaborators from configuration.
    pub fn from_config(config: OnrampConfig) -> OnrampResult<Self> {
        let cache = RepositoryCache::new(
            Arc::new(GitCliSource::new(config.git_binary.clone())),
            TreeBuilder::new(config.max_tree_depth),
            ReferenceValidator::new(&config.reference_pattern)?,
            config.resolved_work_root(),
        );
        let issues = GitHubClient::from_config(&config)?;
        let generator = OllamaClient::from_config(&config)?;
        tracing::info!(
            generation = %generator.endpoint(),
            model = %config.generation_model,
            work_root = %config.resolved_work_root().display(),
            "Contribution plan service ready"
        );
        Ok(Self::new(
            config,
            Arc::new(cache),
            Arc::new(issues),
            Arc::new(generator),
        ))
    }

    pub fn config(&self) -> &OnrampConfig {
        &self.config
    }

    pub fn cache(&self) -> &RepositoryCache {
        &self.cache
    }

    /// Analyze a repository (cache hit or shallow fetch plus tree walk).
    pub async fn analyze_repository(&self, reference: &str) -> OnrampResult<RepoAnalysis> {
        let entry = self.cache.analyze(reference).await?;
        Ok(entry.analysis())
    }

    /// Text of one file in an analyzed repository.
    pub async fn read_file(&self, reference: &str, relative_path: &str) -> OnrampResult<String> {
        self.cache.resolve_file(reference, relative_path).await
    }

    /// Newest beginner-friendly issues matching comma-separated skills.
    pub async fn find_issues(&self, skills: &str) -> OnrampResult<Vec<IssueSummary>> {
        let query = skills_query(skills, &self.config.issue_label);
        tracing::debug!(%query, "Searching issues");
        self.issues
            .search_issues(&query, self.config.issue_result_limit)
            .await
            .map_err(as_issue_lookup)
    }

    /// Build a step-by-step plan for one issue of one repository.
    pub async fn contribution_plan(
        &self,
        request: &ContributionRequest,
    ) -> OnrampResult<ContributionPlan> {
        let repo = request.repo_url.as_str();

        tracing::debug!(repo, stage = %PlanStage::ValidateReferences, "Plan stage");
        if let Err(e) = self.cache.validator().validate(repo) {
            tracing::warn!(repo, issue = %request.issue_url, "Invalid repository or issue URL");
            return Err(e);
        }
        let coords = IssueCoordinates::parse(repo, &request.issue_url).inspect_err(|_| {
            tracing::warn!(repo, issue = %request.issue_url, "Invalid repository or issue URL");
        })?;

        tracing::debug!(repo, stage = %PlanStage::EnsureCached, "Plan stage");
        let entry = self.cache.analyze(repo).await?;

        tracing::debug!(repo, stage = %PlanStage::FetchIssueMetadata, number = coords.number, "Plan stage");
        let body = self
            .issues
            .issue_body(&coords.repo_full_name, coords.number)
            .await
            .map_err(as_issue_lookup)?
            .unwrap_or_else(|| NO_DESCRIPTION.to_string());

        tracing::debug!(repo, stage = %PlanStage::AssemblePrompt, "Plan stage");
        let prompt = assemble_plan_prompt(&request.issue_title, &body, &render_tree(&entry.tree));

        tracing::info!(repo, issue = %request.issue_title, stage = %PlanStage::Generate, "Generating contribution guide");
        let response = self.generate(&prompt).await?;

        tracing::debug!(repo, stage = %PlanStage::ParsePlan, "Plan stage");
        let plan = parse_plan(&response);
        tracing::info!(repo, steps = plan.len(), "Contribution guide generated");
        Ok(ContributionPlan { plan })
    }

    pub async fn summarize_code(&self, code: &str, context: &str) -> OnrampResult<String> {
        self.generate(&assist::summarize_prompt(code, context)).await
    }

    pub async fn explain_code(&self, code: &str, context: &str) -> OnrampResult<CodeReview> {
        let response = self.generate(&assist::explain_prompt(code, context)).await?;
        Ok(CodeReview::from_response(&response))
    }

    pub async fn chat(&self, message: &str) -> OnrampResult<String> {
        self.generate(&assist::chat_prompt(message)).await
    }

    /// Same as [`Self::chat`], yielding text as the backend produces it.
    pub async fn chat_stream(&self, message: &str) -> OnrampResult<TextStream> {
        let bytes = self
            .generator
            .generate_stream(&assist::chat_prompt(message))
            .await
            .map_err(as_upstream)?;
        Ok(decode_ndjson(bytes))
    }

    /// Tear down every working area. Call once at process stop.
    pub fn shutdown(&self) -> TeardownReport {
        tracing::info!(repositories = self.cache.len(), "Shutting down contribution plan service");
        self.cache.teardown_all()
    }

    async fn generate(&self, prompt: &str) -> OnrampResult<String> {
        self.generator.generate(prompt).await.map_err(as_upstream)
    }
}

fn as_upstream(e: OnrampError) -> OnrampError {
    match e {
        OnrampError::UpstreamUnavailable { .. } => e,
        other => OnrampError::upstream(other.to_string()),
    }
}

fn as_issue_lookup(e: OnrampError) -> OnrampError {
    match e {
        OnrampError::IssueLookup { .. } => e,
        other => OnrampError::issue_lookup(other.to_string()),
    }
}
