//! CLI definitions for gantry
//!
//! This module contains all CLI argument parsing structures using clap.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "gantry",
    version,
    about = "Push-triggered CI pipeline runner for test and publish workflows",
    long_about = "Runs test-and-publish pipelines the way the hosted CI does:\npush-trigger filtering by branch, sequential fail-fast steps, and a\npublish job gated on the main branch and a green test job."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Evaluate the trigger for a branch and execute the resulting plan
    Run {
        /// Workflow file (built-in default pipeline when absent)
        #[arg(long, env = "GANTRY_WORKFLOW")]
        workflow: Option<String>,

        /// Branch of the push event (default: current git branch)
        #[arg(long)]
        branch: Option<String>,

        /// Run only this job (and apply its dependencies' gating)
        #[arg(long)]
        job: Option<String>,

        /// Write a machine-readable run summary to this path
        #[arg(long)]
        summary_json: Option<String>,
    },

    /// Show which jobs a push to a branch would execute
    Plan {
        /// Workflow file (built-in default pipeline when absent)
        #[arg(long, env = "GANTRY_WORKFLOW")]
        workflow: Option<String>,

        /// Branch of the push event (default: current git branch)
        #[arg(long)]
        branch: Option<String>,
    },

    /// Validate a workflow file
    Validate {
        /// Workflow file (built-in default pipeline when absent)
        #[arg(long, env = "GANTRY_WORKFLOW")]
        workflow: Option<String>,
    },

    /// Verify required tools and secrets without executing steps
    Check {
        /// Workflow file (built-in default pipeline when absent)
        #[arg(long, env = "GANTRY_WORKFLOW")]
        workflow: Option<String>,
    },

    /// Write the built-in default workflow to a file
    Init {
        /// Destination path
        #[arg(long, default_value = "gantry.yaml")]
        path: String,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
