//! # Pipeline Execution Engine
//!
//! Planning and execution are split: `plan` is a pure function from a
//! workflow and a push event to the list of jobs that would run, and `run`
//! executes that plan step by step. Gating rules live in the plan/outcome
//! logic so they can be unit-tested without spawning processes:
//!
//! - a workflow runs iff its trigger matches the event branch;
//! - a branch-gated job executes iff the event branch equals its literal;
//! - a job executes iff every job it needs succeeded (an upstream failure
//!   or skip propagates as a skip, not a failure);
//! - within a job, steps run sequentially and the first failure halts the
//!   job (fail-fast; remaining steps never run).

pub mod step;

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{PipelineError, WorkflowError};
use crate::ui;
use crate::workflow::{PushEvent, Workflow};

use step::StepContext;

/// Why a planned job will not execute
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Decision {
    Execute,
    SkipBranchGate { required: String },
    SkipFiltered,
}

/// One job in a resolved plan
#[derive(Debug, Clone, Serialize)]
pub struct PlannedJob {
    pub name: String,
    pub decision: Decision,
}

/// The resolved plan for one push event
#[derive(Debug, Clone, Serialize)]
pub struct RunPlan {
    pub branch: String,
    pub triggered: bool,
    pub jobs: Vec<PlannedJob>,
}

/// Terminal state of a job after a run
#[derive(Debug, Clone, Serialize)]
pub enum JobOutcome {
    Succeeded,
    Failed { step: String, detail: String },
    Skipped { reason: SkipReason },
}

#[derive(Debug, Clone, Serialize)]
pub enum SkipReason {
    BranchGate { required: String },
    UpstreamFailed { name: String },
    UpstreamSkipped { name: String },
    Filtered,
}

impl JobOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, JobOutcome::Succeeded)
    }
}

/// Options controlling a run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Restrict execution to this job and its transitive dependencies
    pub only_job: Option<String>,

    /// Working directory for steps and default build context
    pub repo_root: PathBuf,

    /// Short SHA exposed to steps as GANTRY_SHA
    pub sha: Option<String>,
}

/// Result of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub workflow: String,
    pub branch: String,
    pub sha: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<(String, JobOutcome)>,
}

impl RunSummary {
    /// Whether any executed job failed
    pub fn failed(&self) -> bool {
        self.outcomes
            .iter()
            .any(|(_, outcome)| matches!(outcome, JobOutcome::Failed { .. }))
    }

    pub fn print(&self) {
        println!();
        ui::print_header(&format!("Run summary: {}", self.workflow));
        info!("🆔 Run: {}", self.run_id);
        info!("🌿 Branch: {}", self.branch);
        if let Some(sha) = &self.sha {
            info!("📦 SHA: {}", sha);
        }
        let elapsed = (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default();
        info!("⏱️  Duration: {}", humantime::format_duration(elapsed));
        println!();
        for (name, outcome) in &self.outcomes {
            match outcome {
                JobOutcome::Succeeded => {
                    println!("  {} {}", "✅".bright_green(), name);
                }
                JobOutcome::Failed { step, detail } => {
                    println!(
                        "  {} {} failed at `{}`: {}",
                        "❌".bright_red(),
                        name,
                        step,
                        detail
                    );
                }
                JobOutcome::Skipped { reason } => {
                    let why = match reason {
                        SkipReason::BranchGate { required } => {
                            format!("branch gate (requires {})", required)
                        }
                        SkipReason::UpstreamFailed { name } => {
                            format!("upstream {} failed", name)
                        }
                        SkipReason::UpstreamSkipped { name } => {
                            format!("upstream {} skipped", name)
                        }
                        SkipReason::Filtered => "not selected".to_string(),
                    };
                    println!("  {} {} skipped: {}", "⏭️".bright_black(), name, why);
                }
            }
        }
        println!();
    }
}

/// Resolve the plan for a push event
///
/// Returns an untriggered plan with no jobs when the event branch is not
/// in the trigger filter. `only_job` keeps the named job and its
/// transitive dependencies; everything else is marked filtered.
pub fn plan(
    workflow: &Workflow,
    event: &PushEvent,
    only_job: Option<&str>,
) -> Result<RunPlan, WorkflowError> {
    if !workflow.trigger.matches(event) {
        return Ok(RunPlan {
            branch: event.branch.clone(),
            triggered: false,
            jobs: Vec::new(),
        });
    }

    let order = workflow.execution_order()?;

    let selected: Option<Vec<String>> = match only_job {
        Some(name) => Some(transitive_needs(workflow, name)?),
        None => None,
    };

    let jobs = order
        .into_iter()
        .map(|job| {
            let decision = if let Some(selected) = &selected {
                if !selected.contains(&job.name) {
                    Decision::SkipFiltered
                } else {
                    branch_decision(job.branch.as_deref(), &event.branch)
                }
            } else {
                branch_decision(job.branch.as_deref(), &event.branch)
            };
            PlannedJob {
                name: job.name.clone(),
                decision,
            }
        })
        .collect();

    Ok(RunPlan {
        branch: event.branch.clone(),
        triggered: true,
        jobs,
    })
}

fn branch_decision(gate: Option<&str>, branch: &str) -> Decision {
    match gate {
        Some(required) if required != branch => Decision::SkipBranchGate {
            required: required.to_string(),
        },
        _ => Decision::Execute,
    }
}

/// The named job plus everything it transitively needs
fn transitive_needs(workflow: &Workflow, name: &str) -> Result<Vec<String>, WorkflowError> {
    let job = workflow.job(name).ok_or_else(|| WorkflowError::UnknownJob {
        name: name.to_string(),
    })?;

    let mut selected = vec![job.name.clone()];
    let mut queue: Vec<String> = job.needs.clone();
    while let Some(needed) = queue.pop() {
        if selected.contains(&needed) {
            continue;
        }
        // validated workflows have no dangling needs
        if let Some(job) = workflow.job(&needed) {
            queue.extend(job.needs.iter().cloned());
            selected.push(needed);
        }
    }
    Ok(selected)
}

/// Execute a workflow for a push event
///
/// Jobs run in plan order; each one's outcome is decided from its gate and
/// the recorded outcomes of its dependencies before any of its steps spawn.
pub async fn run(
    workflow: &Workflow,
    event: &PushEvent,
    opts: &RunOptions,
) -> Result<RunSummary, PipelineError> {
    let run_plan = plan(workflow, event, opts.only_job.as_deref())?;
    let started_at = Utc::now();
    let run_id = Uuid::new_v4();

    let mut outcomes: Vec<(String, JobOutcome)> = Vec::new();
    let mut recorded: HashMap<String, JobOutcome> = HashMap::new();

    for planned in &run_plan.jobs {
        let job = workflow
            .job(&planned.name)
            .expect("planned job exists in workflow");

        let outcome = match &planned.decision {
            Decision::SkipBranchGate { required } => {
                ui::print_skipped(&format!(
                    "Skipping job {} (requires branch {}, on {})",
                    job.name, required, event.branch
                ));
                JobOutcome::Skipped {
                    reason: SkipReason::BranchGate {
                        required: required.clone(),
                    },
                }
            }
            Decision::SkipFiltered => JobOutcome::Skipped {
                reason: SkipReason::Filtered,
            },
            Decision::Execute => match gate_on_upstream(job.needs.as_slice(), &recorded) {
                Some(reason) => {
                    let why = match &reason {
                        SkipReason::UpstreamFailed { name } => format!("{} failed", name),
                        SkipReason::UpstreamSkipped { name } => format!("{} was skipped", name),
                        _ => unreachable!("upstream gate yields upstream reasons"),
                    };
                    ui::print_skipped(&format!("Skipping job {} ({})", job.name, why));
                    JobOutcome::Skipped { reason }
                }
                None => execute_job(job, event, opts).await,
            },
        };

        recorded.insert(job.name.clone(), outcome.clone());
        outcomes.push((job.name.clone(), outcome));
    }

    Ok(RunSummary {
        run_id,
        workflow: workflow.name.clone(),
        branch: event.branch.clone(),
        sha: opts.sha.clone(),
        started_at,
        finished_at: Utc::now(),
        outcomes,
    })
}

/// Skip reason when a dependency did not succeed, None when clear to run
fn gate_on_upstream(
    needs: &[String],
    recorded: &HashMap<String, JobOutcome>,
) -> Option<SkipReason> {
    for needed in needs {
        match recorded.get(needed) {
            Some(outcome) if outcome.succeeded() => continue,
            Some(JobOutcome::Failed { .. }) => {
                return Some(SkipReason::UpstreamFailed {
                    name: needed.clone(),
                })
            }
            Some(JobOutcome::Skipped { .. }) | Some(JobOutcome::Succeeded) | None => {
                return Some(SkipReason::UpstreamSkipped {
                    name: needed.clone(),
                })
            }
        }
    }
    None
}

async fn execute_job(
    job: &crate::workflow::Job,
    event: &PushEvent,
    opts: &RunOptions,
) -> JobOutcome {
    println!();
    info!("━━━ Job: {} ({} steps) ━━━", job.name, job.steps.len());
    println!();

    let ctx = StepContext {
        job_env: &job.env,
        repo_root: &opts.repo_root,
        branch: &event.branch,
        sha: opts.sha.as_deref(),
    };

    let total = job.steps.len();
    for (index, step) in job.steps.iter().enumerate() {
        let label = step.display_name();
        info!("▶ [{}/{}] {}", index + 1, total, label);

        if let Err(e) = step::execute(step, &ctx).await {
            warn!("Step `{}` failed: {:#}", label, e);
            let remaining = total - index - 1;
            if remaining > 0 {
                ui::print_skipped(&format!("{} remaining step(s) not run", remaining));
            }
            return JobOutcome::Failed {
                step: label,
                detail: format!("{:#}", e),
            };
        }
    }

    ui::print_success(&format!("Job {} succeeded", job.name));
    JobOutcome::Succeeded
}
