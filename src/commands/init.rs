//! Scaffold a workflow file from the built-in default pipeline

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::ui;
use crate::workflow::Workflow;

pub async fn execute(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists. Use --force to overwrite it.",
            path.display()
        );
    }

    let workflow = Workflow::default_pipeline();
    let yaml =
        serde_yaml::to_string(&workflow).context("Failed to serialize the default workflow")?;
    std::fs::write(path, yaml)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!("Jobs: test (install, import check, coverage, upload), publish (main only)");
    ui::print_success(&format!("Wrote {}", path.display()));
    Ok(())
}
