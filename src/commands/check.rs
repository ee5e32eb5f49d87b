//! Preflight: verify tools and secrets before a run
//!
//! Catches a missing uploader binary or an unset token before any step
//! executes, instead of failing twenty minutes into a test job.

use std::path::Path;

use anyhow::Result;

use crate::secrets;
use crate::tools;
use crate::ui;

pub async fn execute(workflow_path: &Path, explicit_workflow: bool) -> Result<()> {
    ui::print_header("Preflight check");

    let workflow = super::load_workflow(workflow_path, explicit_workflow)?;
    let mut problems = 0;

    println!("Tools:");
    for tool in workflow.required_tools() {
        match tools::ensure_available(tool) {
            Ok(path) => println!("  ✅ {} ({})", tool, path),
            Err(e) => {
                println!("  ❌ {}", e);
                problems += 1;
            }
        }
    }
    println!();

    let required = workflow.required_secrets();
    let gaps = secrets::missing(&required);
    println!("Secrets:");
    if required.is_empty() {
        println!("  (none required)");
    }
    for name in &required {
        if gaps.contains(name) {
            println!("  ❌ {} is not set", name);
        } else {
            println!("  ✅ {} is set", name);
        }
    }
    problems += gaps.len();
    println!();

    if problems > 0 {
        anyhow::bail!("{} preflight problem(s) found", problems);
    }

    ui::print_success("Preflight passed");
    Ok(())
}
