//! Open-Source On-Ramp Library
//!
//! This library provides:
//! - Repository ingestion: shallow fetch once per reference, bounded
//!   structural tree, sandboxed file reads
//! - Contribution plans: issue metadata plus tree rendered into a prompt, and
//!   the model's prose parsed back into ordered steps
//! - Code assist: snippet summary, explanation with corrections, free chat
//!
//! # Pipeline
//!
//! ```text
//! validate refs -> ensure cached -> fetch issue -> assemble prompt -> generate -> parse plan
//! ```
//!
//! Parsing never fails; a response without `Step N:` headers becomes a single
//! fallback step.
//!
//! # Usage
//!
//! ```bash
//! # MCP stdio server
//! onramp-mcp
//!
//! # One-shot CLI
//! onramp tree https://github.com/tokio-rs/tokio
//! onramp plan https://github.com/o/r https://github.com/o/r/issues/1 "Fix typo"
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod assist;
pub mod config;
pub mod error;
pub mod issues;
pub mod llm;
pub mod plan;
pub mod repo;
pub mod service;

pub use assist::CodeReview;
pub use config::OnrampConfig;
pub use error::{OnrampError, OnrampResult, StructuredError};
pub use issues::{GitHubClient, IssueCoordinates, IssueSummary, IssueTracker};
pub use llm::{decode_ndjson, ByteStream, Generator, OllamaClient, TextStream};
pub use plan::{parse_plan, ContributionStep, ParsedPlan};
pub use repo::{
    CacheEntry, GitCliSource, ReferenceValidator, RepoAnalysis, RepositoryCache,
    RepositorySource, TeardownReport, TreeBuilder, TreeNode,
};
pub use service::{ContributionPlan, ContributionPlanService, ContributionRequest};
