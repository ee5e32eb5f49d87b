//! Show what a push to a branch would execute, without running anything

use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use tracing::info;

use crate::engine::{self, Decision};
use crate::ui;
use crate::workflow::PushEvent;

pub async fn execute(
    workflow_path: &Path,
    explicit_workflow: bool,
    branch: Option<String>,
) -> Result<()> {
    ui::print_header("Pipeline plan");

    let workflow = super::load_workflow(workflow_path, explicit_workflow)?;
    let branch = super::resolve_branch(branch)?;
    info!("🌿 Branch: {}", branch);
    println!();

    let event = PushEvent::new(branch);
    let plan = engine::plan(&workflow, &event, None)?;

    if !plan.triggered {
        println!(
            "  {} push to {} does not trigger {} (branches: {})",
            "○".bright_black(),
            event.branch,
            workflow.name,
            workflow.trigger.push.branches.join(", ")
        );
        println!();
        return Ok(());
    }

    for planned in &plan.jobs {
        let job = workflow.job(&planned.name).expect("planned job exists");
        match &planned.decision {
            Decision::Execute => {
                println!(
                    "  {} {} ({} steps)",
                    "▶".bright_green(),
                    planned.name,
                    job.steps.len()
                );
                for step in &job.steps {
                    println!("      • {}", step.display_name());
                }
            }
            Decision::SkipBranchGate { required } => {
                println!(
                    "  {} {} skipped (requires branch {})",
                    "⏭".bright_black(),
                    planned.name,
                    required
                );
            }
            Decision::SkipFiltered => {
                println!(
                    "  {} {} skipped (not selected)",
                    "⏭".bright_black(),
                    planned.name
                );
            }
        }
    }
    println!();

    Ok(())
}
