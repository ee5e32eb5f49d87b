//! Coverage report upload
//!
//! The test step produces an XML coverage report; this module hands it to
//! the coverage service's uploader CLI. The token travels in the child's
//! environment (the uploader reads CODECOV_TOKEN), never in argv.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::CoverageError;
use crate::tools;

use super::{backoff_secs, is_transient_error};

const MAX_UPLOAD_ATTEMPTS: u32 = 5;

/// Verify the XML report exists where the test run was told to write it
pub fn report_exists(path: &Path) -> Result<(), CoverageError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(CoverageError::ReportMissing {
            path: path.display().to_string(),
        })
    }
}

/// Upload a coverage report, retrying transient service failures
///
/// SAFE mode allows up to 5 attempts with exponential backoff capped at
/// 32s; without it a single attempt is made. Permanent errors (bad token,
/// malformed report) fail immediately either way.
pub async fn upload(report: &Path, token: &str, safe_mode: bool) -> Result<(), CoverageError> {
    report_exists(report)?;

    let codecov = tools::resolve(tools::tools::CODECOV);
    let max_attempts = if safe_mode { MAX_UPLOAD_ATTEMPTS } else { 1 };
    let mut attempts = 0;

    info!("📤 Uploading coverage report {}", report.display());

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    spinner.set_message("Uploading coverage...");
    spinner.enable_steady_tick(Duration::from_millis(100));

    loop {
        attempts += 1;
        debug!(
            "Running {} --file {} (attempt {}/{})",
            codecov,
            report.display(),
            attempts,
            max_attempts
        );

        let result = Command::new(&codecov)
            .args(["--file", &report.display().to_string()])
            .env("CODECOV_TOKEN", token)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        let (message, retryable) = match result {
            Ok(output) if output.status.success() => {
                spinner.finish_and_clear();
                info!("✅ Coverage report uploaded");
                return Ok(());
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let stdout = String::from_utf8_lossy(&output.stdout);
                debug!("uploader stderr: {}", stderr.trim());
                let message = if stderr.trim().is_empty() {
                    stdout.trim().to_string()
                } else {
                    stderr.trim().to_string()
                };
                let retryable = is_transient_error(&message);
                (message, retryable)
            }
            Err(e) => (format!("failed to execute {}: {}", codecov, e), false),
        };

        if !retryable || attempts >= max_attempts {
            spinner.finish_and_clear();
            return Err(CoverageError::UploadFailed { attempts, message });
        }

        let wait = backoff_secs(attempts);
        warn!(
            "⚠️  Upload attempt {}/{} failed, retrying in {}s...",
            attempts, max_attempts, wait
        );
        tokio::time::sleep(Duration::from_secs(wait)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_exists() {
        let dir = tempfile::tempdir().unwrap();
        let report = dir.path().join("coverage.xml");
        assert!(report_exists(&report).is_err());

        std::fs::write(&report, "<coverage/>").unwrap();
        assert!(report_exists(&report).is_ok());
    }

    #[test]
    fn test_missing_report_error_names_path() {
        let err = report_exists(Path::new("/nonexistent/coverage.xml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/coverage.xml"));
    }

    #[tokio::test]
    async fn test_upload_without_report_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let report = dir.path().join("coverage.xml");
        let err = upload(&report, "token", true).await.unwrap_err();
        assert!(matches!(err, CoverageError::ReportMissing { .. }));
    }

    #[tokio::test]
    async fn test_upload_permanent_failure_single_attempt() {
        // an uploader that always exits 1 with a non-transient message
        let dir = tempfile::tempdir().unwrap();
        let report = dir.path().join("coverage.xml");
        std::fs::write(&report, "<coverage/>").unwrap();

        std::env::set_var("CODECOV_BIN", "false");
        let err = upload(&report, "token", true).await.unwrap_err();
        std::env::remove_var("CODECOV_BIN");

        match err {
            CoverageError::UploadFailed { attempts, .. } => assert_eq!(attempts, 1),
            other => panic!("unexpected error: {}", other),
        }
    }
}
