//! Step execution
//!
//! Each step spawns an external tool with the job environment layered on
//! top of the runner's own. Child stdout/stderr stream straight to the
//! terminal; success criteria are entirely the child's exit status.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::StepError;
use crate::infrastructure::{coverage, registry};
use crate::secrets;
use crate::tools;
use crate::workflow::{ImportsStep, RunStep, Step, TestsStep};

/// Check if SAFE mode is enabled (retry on transient errors)
/// Default: true (retries enabled by default)
/// Disable with: SAFE=false or SAFE=0
pub fn is_safe_mode() -> bool {
    std::env::var("SAFE")
        .map(|v| {
            let val = v.to_lowercase();
            val != "false" && val != "0"
        })
        .unwrap_or(true)
}

/// Execution context shared by every step in a job
pub struct StepContext<'a> {
    pub job_env: &'a HashMap<String, String>,
    pub repo_root: &'a Path,
    pub branch: &'a str,
    pub sha: Option<&'a str>,
}

/// Execute one step, failing on the first non-zero child exit
pub async fn execute(step: &Step, ctx: &StepContext<'_>) -> Result<()> {
    match step {
        Step::Run(run) => run_shell(run, ctx).await,
        Step::Imports(imports) => run_import_check(imports, ctx).await,
        Step::Tests(tests) => run_tests(tests, ctx).await,
        Step::UploadCoverage(step) => {
            let spec = &step.upload_coverage;
            let token = secrets::resolve(&spec.token)?;
            let report = ctx.repo_root.join(&spec.report);
            coverage::upload(&report, &token, is_safe_mode()).await?;
            Ok(())
        }
        Step::RegistryLogin(step) => {
            let spec = &step.registry_login;
            let credentials = registry::RegistryCredentials::discover(
                &spec.username,
                &spec.token,
                &spec.registry,
            )?;
            registry::login(&spec.registry, &credentials).await?;
            Ok(())
        }
        Step::BuildImage(step) => {
            let spec = &step.build_image;
            let image = registry::ImageRef::parse(&spec.image)?;
            let context_dir = spec
                .context
                .as_ref()
                .map(|c| ctx.repo_root.join(c))
                .unwrap_or_else(|| ctx.repo_root.to_path_buf());
            registry::build(&image, &context_dir).await?;
            Ok(())
        }
        Step::PushImage(step) => {
            let spec = &step.push_image;
            let image = registry::ImageRef::parse(&spec.image)?;
            registry::push(&image, spec.retries, is_safe_mode()).await?;
            Ok(())
        }
    }
}

async fn run_shell(step: &RunStep, ctx: &StepContext<'_>) -> Result<()> {
    let label = step
        .name
        .clone()
        .unwrap_or_else(|| format!("run: {}", step.run));

    debug!("Running: sh -c {:?}", step.run);

    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(&step.run)
        .current_dir(ctx.repo_root)
        .envs(ctx.job_env)
        .envs(&step.env)
        .env("GANTRY_BRANCH", ctx.branch)
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    if let Some(sha) = ctx.sha {
        cmd.env("GANTRY_SHA", sha);
    }

    wait_with_timeout(cmd, &label, step.timeout.as_deref()).await
}

/// Smoke-test each module in a fresh interpreter
///
/// All modules are checked before reporting so a single run surfaces
/// every broken import.
async fn run_import_check(step: &ImportsStep, ctx: &StepContext<'_>) -> Result<()> {
    let python = tools::resolve(tools::tools::PYTHON);
    let mut failed: Vec<String> = Vec::new();

    for module in &step.imports {
        debug!("Importing {}", module);
        let output = Command::new(&python)
            .args(["-c", &format!("import {}", module)])
            .current_dir(ctx.repo_root)
            .envs(ctx.job_env)
            .output()
            .await
            .with_context(|| format!("Failed to run {} for import check", python))?;

        if output.status.success() {
            info!("   ✅ import {}", module);
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            info!("   ❌ import {}", module);
            debug!("import error: {}", stderr.trim());
            failed.push(module.clone());
        }
    }

    if !failed.is_empty() {
        return Err(StepError::ImportCheckFailed {
            modules: failed.join(", "),
        }
        .into());
    }

    Ok(())
}

/// Run the test suite with coverage measurement producing an XML report
async fn run_tests(step: &TestsStep, ctx: &StepContext<'_>) -> Result<()> {
    let spec = &step.tests;
    let label = step
        .name
        .clone()
        .unwrap_or_else(|| format!("tests with coverage ({})", spec.package));

    let python = tools::resolve(tools::tools::PYTHON);
    let mut cmd = Command::new(&python);
    cmd.args([
        "-m",
        "pytest",
        &format!("--cov={}", spec.package),
        &format!("--cov-report=xml:{}", spec.report),
    ])
    .args(&spec.args)
    .current_dir(ctx.repo_root)
    .envs(ctx.job_env)
    .env("GANTRY_BRANCH", ctx.branch)
    .stdout(Stdio::inherit())
    .stderr(Stdio::inherit());
    if let Some(sha) = ctx.sha {
        cmd.env("GANTRY_SHA", sha);
    }

    wait_with_timeout(cmd, &label, spec.timeout.as_deref()).await?;

    // The upload step depends on the report; catch a silently-missing one here
    coverage::report_exists(&ctx.repo_root.join(&spec.report))?;

    Ok(())
}

async fn wait_with_timeout(mut cmd: Command, label: &str, timeout: Option<&str>) -> Result<()> {
    let limit = match timeout {
        Some(t) => Some(
            humantime::parse_duration(t)
                .with_context(|| format!("Invalid timeout `{}` on step `{}`", t, label))?,
        ),
        None => None,
    };

    let mut child = cmd.spawn().map_err(|e| StepError::SpawnFailed {
        step: label.to_string(),
        message: e.to_string(),
    })?;

    let status = match limit {
        Some(duration) => match tokio::time::timeout(duration, child.wait()).await {
            Ok(status) => status.context("Failed waiting for child process")?,
            Err(_) => {
                child.kill().await.ok();
                return Err(StepError::Timeout {
                    step: label.to_string(),
                    timeout: humantime::format_duration(round_secs(duration)).to_string(),
                }
                .into());
            }
        },
        None => child.wait().await.context("Failed waiting for child process")?,
    };

    if !status.success() {
        return Err(StepError::CommandFailed {
            step: label.to_string(),
            code: status.code(),
        }
        .into());
    }

    Ok(())
}

fn round_secs(duration: Duration) -> Duration {
    Duration::from_secs(duration.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::TestsSpec;

    fn ctx_in<'a>(dir: &'a Path, env: &'a HashMap<String, String>) -> StepContext<'a> {
        StepContext {
            job_env: env,
            repo_root: dir,
            branch: "main",
            sha: None,
        }
    }

    // one test so the parallel runner never races on the SAFE variable
    #[test]
    fn test_safe_mode_toggle() {
        std::env::remove_var("SAFE");
        assert!(is_safe_mode());
        std::env::set_var("SAFE", "false");
        assert!(!is_safe_mode());
        std::env::set_var("SAFE", "0");
        assert!(!is_safe_mode());
        std::env::set_var("SAFE", "true");
        assert!(is_safe_mode());
        std::env::remove_var("SAFE");
    }

    #[tokio::test]
    async fn test_run_step_success() {
        let dir = tempfile::tempdir().unwrap();
        let step = RunStep {
            name: None,
            run: "true".to_string(),
            env: HashMap::new(),
            timeout: None,
        };
        let env = HashMap::new();
        assert!(run_shell(&step, &ctx_in(dir.path(), &env)).await.is_ok());
    }

    #[tokio::test]
    async fn test_run_step_failure_carries_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let step = RunStep {
            name: Some("always fails".to_string()),
            run: "exit 3".to_string(),
            env: HashMap::new(),
            timeout: None,
        };
        let env = HashMap::new();
        let err = run_shell(&step, &ctx_in(dir.path(), &env)).await.unwrap_err();
        let step_err = err.downcast::<StepError>().unwrap();
        assert!(matches!(
            step_err,
            StepError::CommandFailed { code: Some(3), .. }
        ));
    }

    #[tokio::test]
    async fn test_run_step_env_injection() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = HashMap::new();
        env.insert("GANTRY_TEST_VALUE".to_string(), "42".to_string());
        let step = RunStep {
            name: None,
            run: "test \"$GANTRY_TEST_VALUE\" = 42 && test \"$GANTRY_BRANCH\" = main".to_string(),
            env,
            timeout: None,
        };
        let job_env = HashMap::new();
        assert!(run_shell(&step, &ctx_in(dir.path(), &job_env)).await.is_ok());
    }

    #[tokio::test]
    async fn test_run_step_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let step = RunStep {
            name: Some("sleepy".to_string()),
            run: "sleep 5".to_string(),
            env: HashMap::new(),
            timeout: Some("100ms".to_string()),
        };
        let env = HashMap::new();
        let err = run_shell(&step, &ctx_in(dir.path(), &env)).await.unwrap_err();
        let step_err = err.downcast::<StepError>().unwrap();
        assert!(matches!(step_err, StepError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_invalid_timeout_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let step = RunStep {
            name: None,
            run: "true".to_string(),
            env: HashMap::new(),
            timeout: Some("not-a-duration".to_string()),
        };
        let env = HashMap::new();
        assert!(run_shell(&step, &ctx_in(dir.path(), &env)).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_report_fails_tests_step() {
        // a test runner that exits 0 without writing the report is a failure
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("PYTHON_BIN", "true");
        let step = TestsStep {
            name: None,
            tests: TestsSpec {
                package: "morai".to_string(),
                report: "coverage.xml".to_string(),
                args: Vec::new(),
                timeout: None,
            },
        };
        let env = HashMap::new();
        let result = run_tests(&step, &ctx_in(dir.path(), &env)).await;
        std::env::remove_var("PYTHON_BIN");
        assert!(result.is_err());
    }
}
