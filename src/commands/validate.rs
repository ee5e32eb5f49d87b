//! Validate a workflow file

use std::path::Path;

use anyhow::Result;
use tracing::info;

use crate::ui;

pub async fn execute(workflow_path: &Path, explicit_workflow: bool) -> Result<()> {
    let workflow = super::load_workflow(workflow_path, explicit_workflow)?;

    let steps: usize = workflow.jobs.iter().map(|job| job.steps.len()).sum();
    info!(
        "Trigger: push to {}",
        workflow.trigger.push.branches.join(", ")
    );
    info!("Jobs: {} ({} steps total)", workflow.jobs.len(), steps);

    ui::print_success(&format!("Workflow {} is valid", workflow.name));
    Ok(())
}
