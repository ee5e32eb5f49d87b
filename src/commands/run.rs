//! Execute a workflow for a push event

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::engine::{self, RunOptions};
use crate::ui;
use crate::workflow::PushEvent;

pub async fn execute(
    workflow_path: &Path,
    explicit_workflow: bool,
    branch: Option<String>,
    job: Option<String>,
    summary_json: Option<String>,
) -> Result<()> {
    ui::print_header("Pipeline run");

    let workflow = super::load_workflow(workflow_path, explicit_workflow)?;
    let branch = super::resolve_branch(branch)?;
    let repo_root = super::resolve_repo_root();
    let sha = crate::git::get_short_sha().ok();

    info!("🌿 Branch: {}", branch);
    if let Some(sha) = &sha {
        info!("📦 SHA: {}", sha);
    }
    println!();

    let event = PushEvent::new(branch);
    let plan = engine::plan(&workflow, &event, job.as_deref())?;
    if !plan.triggered {
        ui::print_warning(&format!(
            "Push to {} does not trigger workflow {} (branches: {})",
            event.branch,
            workflow.name,
            workflow.trigger.push.branches.join(", ")
        ));
        return Ok(());
    }

    let opts = RunOptions {
        only_job: job,
        repo_root,
        sha,
    };

    let summary = engine::run(&workflow, &event, &opts).await?;
    summary.print();

    if let Some(path) = summary_json {
        let json =
            serde_json::to_string_pretty(&summary).context("Failed to serialize run summary")?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write run summary to {}", path))?;
        info!("📝 Summary written to {}", path);
    }

    if summary.failed() {
        ui::print_error("Run failed");
        anyhow::bail!("Run failed");
    }

    ui::print_success("Run complete");
    Ok(())
}
