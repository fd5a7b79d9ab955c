//! MCP Server for the Open-Source On-Ramp
//!
//! Exposes repository analysis, issue discovery, and guided contribution
//! plans as MCP tools over stdio:
//! - `analyze_repo`: shallow-clone a repository once and return its tree
//! - `read_repo_file`: read one file of an analyzed repository
//! - `find_issues`: newest "good first issue" issues for a set of skills
//! - `contribution_guide`: step-by-step plan for one issue
//! - `summarize_code`, `explain_code`, `chat`: code assist
//!
//! # Usage
//!
//! ```bash
//! GITHUB_PAT=... OLLAMA_MODEL=codellama onramp-mcp
//! onramp-mcp --work-root /tmp/onramp --max-depth 3
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router, ServerHandler, ServiceExt,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{stdin, stdout};

use onramp::{ContributionPlanService, ContributionRequest, OnrampConfig, OnrampError};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory that receives working areas (overrides ONRAMP_WORK_ROOT)
    #[arg(long)]
    work_root: Option<PathBuf>,

    /// Maximum depth of repository trees (overrides ONRAMP_MAX_TREE_DEPTH)
    #[arg(long)]
    max_depth: Option<usize>,

    /// Generation backend base URL (overrides OLLAMA_BASE_URL)
    #[arg(long)]
    generation_url: Option<String>,

    /// Generation model name (overrides OLLAMA_MODEL)
    #[arg(long)]
    model: Option<String>,
}

impl Args {
    fn apply(self, config: &mut OnrampConfig) {
        if let Some(dir) = self.work_root {
            config.work_root = Some(dir);
        }
        if let Some(depth) = self.max_depth {
            config.max_tree_depth = depth;
        }
        if let Some(url) = self.generation_url {
            config.generation_url = url;
        }
        if let Some(model) = self.model {
            config.generation_model = model;
        }
    }
}

/// MCP request for analyze_repo tool
#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct AnalyzeRepoRequest {
    #[schemars(description = "Repository URL, e.g. https://github.com/owner/name")]
    repo_url: String,
}

/// MCP request for read_repo_file tool
#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ReadRepoFileRequest {
    #[schemars(description = "Repository URL exactly as passed to analyze_repo")]
    repo_url: String,
    #[schemars(description = "Path relative to the repository root, e.g. src/lib.rs")]
    file_path: String,
}

/// MCP request for find_issues tool
#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct FindIssuesRequest {
    #[schemars(description = "Comma-separated skills, e.g. 'rust,cli'")]
    skills: String,
}

/// MCP request for contribution_guide tool
#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ContributionGuideRequest {
    #[schemars(description = "Repository URL")]
    repo_url: String,
    #[schemars(description = "Issue URL, e.g. https://github.com/owner/name/issues/42")]
    issue_url: String,
    #[schemars(description = "Issue title")]
    issue_title: String,
}

/// MCP request for summarize_code and explain_code tools
#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct CodeRequest {
    #[schemars(description = "Code snippet")]
    code: String,
    #[schemars(description = "Optional: what the code is for or where it comes from")]
    context: Option<String>,
}

/// MCP request for chat tool
#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ChatRequest {
    #[schemars(description = "Question or message for the assistant")]
    message: String,
}

#[derive(Serialize)]
struct ContentResponse {
    content: String,
}

/// The MCP server handler
#[derive(Clone)]
struct OnrampServer {
    service: Arc<ContributionPlanService>,
    tool_router: ToolRouter<Self>,
}

fn to_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| e.to_string())
}

fn to_tool_error(e: OnrampError) -> String {
    e.to_structured_json()
}

#[tool_router]
impl OnrampServer {
    fn new(service: Arc<ContributionPlanService>) -> Self {
        Self {
            service,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        description = "Shallow-clone a GitHub repository (once per URL) and return its name and file tree, directories first, bounded in depth."
    )]
    async fn analyze_repo(
        &self,
        Parameters(req): Parameters<AnalyzeRepoRequest>,
    ) -> Result<String, String> {
        let analysis = self
            .service
            .analyze_repository(&req.repo_url)
            .await
            .map_err(to_tool_error)?;
        to_json(&analysis)
    }

    #[tool(
        description = "Read a file from a repository previously passed to analyze_repo. Paths outside the repository are rejected.",
        annotations(read_only_hint = true)
    )]
    async fn read_repo_file(
        &self,
        Parameters(req): Parameters<ReadRepoFileRequest>,
    ) -> Result<String, String> {
        let content = self
            .service
            .read_file(&req.repo_url, &req.file_path)
            .await
            .map_err(to_tool_error)?;
        to_json(&ContentResponse { content })
    }

    #[tool(
        description = "Find the newest open 'good first issue' issues matching comma-separated skills.",
        annotations(read_only_hint = true)
    )]
    async fn find_issues(
        &self,
        Parameters(req): Parameters<FindIssuesRequest>,
    ) -> Result<String, String> {
        let issues = self
            .service
            .find_issues(&req.skills)
            .await
            .map_err(to_tool_error)?;
        to_json(&issues)
    }

    #[tool(
        description = "Generate a step-by-step contribution plan for one issue, grounded in the repository's file tree. May take minutes on local models."
    )]
    async fn contribution_guide(
        &self,
        Parameters(req): Parameters<ContributionGuideRequest>,
    ) -> Result<String, String> {
        let request = ContributionRequest {
            repo_url: req.repo_url,
            issue_url: req.issue_url,
            issue_title: req.issue_title,
        };
        let plan = self
            .service
            .contribution_plan(&request)
            .await
            .map_err(to_tool_error)?;
        to_json(&plan)
    }

    #[tool(description = "Summarize a code snippet.")]
    async fn summarize_code(
        &self,
        Parameters(req): Parameters<CodeRequest>,
    ) -> Result<String, String> {
        let summary = self
            .service
            .summarize_code(&req.code, req.context.as_deref().unwrap_or_default())
            .await
            .map_err(to_tool_error)?;
        to_json(&serde_json::json!({ "summary": summary }))
    }

    #[tool(
        description = "Explain a code snippet. If it contains bugs, the response includes is_correct=false and a corrected version."
    )]
    async fn explain_code(
        &self,
        Parameters(req): Parameters<CodeRequest>,
    ) -> Result<String, String> {
        let review = self
            .service
            .explain_code(&req.code, req.context.as_deref().unwrap_or_default())
            .await
            .map_err(to_tool_error)?;
        to_json(&review)
    }

    #[tool(description = "Ask the assistant a free-form question.")]
    async fn chat(&self, Parameters(req): Parameters<ChatRequest>) -> Result<String, String> {
        let response = self
            .service
            .chat(&req.message)
            .await
            .map_err(to_tool_error)?;
        to_json(&serde_json::json!({ "response": response }))
    }
}

#[tool_handler]
impl ServerHandler for OnrampServer {
    fn get_info(&self) -> ServerInfo {
        let instructions = "MCP server that helps new contributors get started on open-source issues.\n\
                 - analyze_repo first; read_repo_file and contribution_guide reuse its clone\n\
                 - find_issues: beginner-friendly issues for a set of skills\n\
                 - contribution_guide: ordered plan; unparseable model output becomes a single step\n\
                 Errors are JSON objects with `code`, `message`, and `retryable`.";

        ServerInfo {
            instructions: Some(instructions.to_string()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // stdout carries MCP frames, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("onramp=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = OnrampConfig::from_env();
    args.apply(&mut config);

    let service = Arc::new(
        ContributionPlanService::from_config(config).context("Failed to build service")?,
    );
    tracing::info!("Starting On-Ramp MCP Server");

    let transport = (stdin(), stdout());
    let running = OnrampServer::new(Arc::clone(&service))
        .serve(transport)
        .await?;

    tokio::select! {
        result = running.waiting() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down");
        }
    }

    let report = service.shutdown();
    for failure in &report.failures {
        tracing::warn!(path = %failure.path.display(), error = %failure.message, "Working area left behind");
    }

    Ok(())
}
