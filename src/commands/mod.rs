//! Command implementations for the gantry CLI

pub mod check;
pub mod init;
pub mod plan;
pub mod run;
pub mod validate;

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::info;

use crate::workflow::{Workflow, DEFAULT_WORKFLOW_FILE};

/// Load the workflow for a command
///
/// An explicitly-passed path must exist. The default path falls back to
/// the built-in pipeline when the file is absent, so a fresh checkout runs
/// without any setup.
pub fn load_workflow(path: &Path, explicit: bool) -> Result<Workflow> {
    if path.exists() {
        let workflow = Workflow::load(path)?;
        info!("📋 Workflow: {} (from {})", workflow.name, path.display());
        Ok(workflow)
    } else if explicit {
        Err(crate::error::WorkflowError::FileNotFound {
            path: path.display().to_string(),
        }
        .into())
    } else {
        let workflow = Workflow::default_pipeline();
        info!(
            "📋 Workflow: {} (built-in default; no {} found)",
            workflow.name, DEFAULT_WORKFLOW_FILE
        );
        Ok(workflow)
    }
}

/// Resolve the branch for a run: the flag wins, then the git HEAD
pub fn resolve_branch(flag: Option<String>) -> Result<String> {
    match flag {
        Some(branch) => Ok(branch),
        None => Ok(crate::git::current_branch()?),
    }
}

/// Resolve the working directory for steps: the repo root when inside a
/// repository, the current directory otherwise
pub fn resolve_repo_root() -> PathBuf {
    if let Ok(root) = crate::git::get_repo_root() {
        return root;
    }
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}
