use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod engine;
mod error;
mod git;
mod infrastructure;
mod secrets;
mod tools;
mod ui;
mod workflow;

use cli::{Cli, Commands};
use workflow::DEFAULT_WORKFLOW_FILE;

/// Resolve the workflow path and whether it was explicitly requested
fn workflow_arg(workflow: Option<String>) -> (PathBuf, bool) {
    match workflow {
        Some(path) => (PathBuf::from(path), true),
        None => (PathBuf::from(DEFAULT_WORKFLOW_FILE), false),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging with LOGGING env var support
    // LOGGING=debug,info,warn,error or just LOGGING=debug
    let log_level = std::env::var("LOGGING")
        .or_else(|_| std::env::var("LOG_LEVEL"))
        .unwrap_or_else(|_| {
            if cli.verbose {
                "debug".to_string()
            } else {
                "info".to_string()
            }
        });

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(false) // Disable ANSI escape codes for cleaner output
        .init();

    match cli.command {
        Commands::Run {
            workflow,
            branch,
            job,
            summary_json,
        } => {
            let (path, explicit) = workflow_arg(workflow);
            commands::run::execute(&path, explicit, branch, job, summary_json).await?;
        }
        Commands::Plan { workflow, branch } => {
            let (path, explicit) = workflow_arg(workflow);
            commands::plan::execute(&path, explicit, branch).await?;
        }
        Commands::Validate { workflow } => {
            let (path, explicit) = workflow_arg(workflow);
            commands::validate::execute(&path, explicit).await?;
        }
        Commands::Check { workflow } => {
            let (path, explicit) = workflow_arg(workflow);
            commands::check::execute(&path, explicit).await?;
        }
        Commands::Init { path, force } => {
            commands::init::execute(&PathBuf::from(path), force).await?;
        }
    }

    Ok(())
}
