//! One-shot command line front end for the on-ramp service.
//!
//! Each invocation builds the service, runs one command, prints JSON (or a
//! plain outline with `--text`) to stdout, and tears down its working areas.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::io::Write;
use std::path::PathBuf;

use onramp::{ContributionPlanService, ContributionRequest, OnrampConfig};

#[derive(Parser, Debug)]
#[command(name = "onramp", author, version, about, long_about = None)]
struct Cli {
    /// Directory that receives working areas
    #[arg(long, global = true)]
    work_root: Option<PathBuf>,

    /// Maximum depth of repository trees
    #[arg(long, global = true)]
    max_depth: Option<usize>,

    /// Print a plain-text outline instead of JSON
    #[arg(long, global = true)]
    text: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch a repository and print its file tree
    Tree { repo_url: String },
    /// Fetch a repository and print one of its files
    Cat { repo_url: String, path: String },
    /// Search beginner-friendly issues for comma-separated skills
    Issues { skills: String },
    /// Generate a contribution plan for one issue
    Plan {
        repo_url: String,
        issue_url: String,
        issue_title: String,
    },
    /// Ask the assistant a question
    Chat {
        message: String,
        /// Print the answer as it is generated
        #[arg(long)]
        stream: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "onramp=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = OnrampConfig::from_env();
    if let Some(dir) = cli.work_root {
        config.work_root = Some(dir);
    }
    if let Some(depth) = cli.max_depth {
        config.max_tree_depth = depth;
    }

    let service = ContributionPlanService::from_config(config).context("Failed to build service")?;
    let result = run(&service, cli.command, cli.text).await;

    let report = service.shutdown();
    for failure in &report.failures {
        tracing::warn!(path = %failure.path.display(), error = %failure.message, "Working area left behind");
    }

    result
}

async fn run(service: &ContributionPlanService, command: Command, text: bool) -> Result<()> {
    match command {
        Command::Tree { repo_url } => {
            let analysis = service
                .analyze_repository(&repo_url)
                .await
                .with_context(|| format!("Failed to analyze {repo_url}"))?;
            if text {
                println!("{}", analysis.name);
                print!("{}", onramp::plan::render_tree(&analysis.structure));
            } else {
                println!("{}", serde_json::to_string_pretty(&analysis)?);
            }
        }
        Command::Cat { repo_url, path } => {
            service
                .analyze_repository(&repo_url)
                .await
                .with_context(|| format!("Failed to analyze {repo_url}"))?;
            let content = service
                .read_file(&repo_url, &path)
                .await
                .with_context(|| format!("Failed to read {path}"))?;
            print!("{content}");
        }
        Command::Issues { skills } => {
            let issues = service
                .find_issues(&skills)
                .await
                .context("Issue search failed")?;
            if text {
                for issue in &issues {
                    println!("{} [{}] {}", issue.repo_name, issue.title, issue.url);
                }
            } else {
                println!("{}", serde_json::to_string_pretty(&issues)?);
            }
        }
        Command::Plan {
            repo_url,
            issue_url,
            issue_title,
        } => {
            let request = ContributionRequest {
                repo_url,
                issue_url,
                issue_title,
            };
            let plan = service
                .contribution_plan(&request)
                .await
                .context("Failed to generate contribution plan")?;
            if text {
                for step in &plan.plan {
                    println!("Step {}: {}\n{}\n", step.step, step.title, step.details);
                }
            } else {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            }
        }
        Command::Chat { message, stream } => {
            if stream {
                let mut fragments = service
                    .chat_stream(&message)
                    .await
                    .context("Failed to open generation stream")?;
                let mut stdout = std::io::stdout();
                while let Some(fragment) = fragments.next().await {
                    stdout.write_all(fragment.context("Generation stream failed")?.as_bytes())?;
                    stdout.flush()?;
                }
                writeln!(stdout)?;
            } else {
                let response = service.chat(&message).await.context("Chat failed")?;
                println!("{response}");
            }
        }
    }
    Ok(())
}
