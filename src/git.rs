use std::path::PathBuf;
use std::process::Command;

use crate::error::GitError;
use crate::tools::{get_tool_path, tools};

/// Get the root directory of the git repository
///
/// Tries the REPO_ROOT environment variable first, then falls back to
/// calling `git rev-parse --show-toplevel`.
pub fn get_repo_root() -> Result<PathBuf, GitError> {
    if let Ok(repo_root) = std::env::var("REPO_ROOT") {
        return Ok(PathBuf::from(repo_root));
    }

    let stdout = run_git(&["rev-parse", "--show-toplevel"])?;
    Ok(PathBuf::from(stdout))
}

/// Get short git SHA (7 characters)
pub fn get_short_sha() -> Result<String, GitError> {
    run_git(&["rev-parse", "--short=7", "HEAD"])
        .map_err(|e| GitError::ShaFailed(e.to_string()))
}

/// Get the branch name for HEAD
///
/// Used as the push-event branch when --branch is not provided.
/// A detached HEAD resolves to the literal "HEAD", which no trigger
/// filter matches, so the workflow is simply not triggered.
pub fn current_branch() -> Result<String, GitError> {
    run_git(&["rev-parse", "--abbrev-ref", "HEAD"])
        .map_err(|e| GitError::BranchFailed(e.to_string()))
}

fn run_git(args: &[&str]) -> Result<String, GitError> {
    let git = get_tool_path("GIT_BIN", tools::GIT);
    let output = Command::new(&git)
        .args(args)
        .output()
        .map_err(|_| GitError::CommandFailed {
            command: format!("{} {}", git, args.join(" ")),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("not a git repository") {
            return Err(GitError::NotARepository);
        }
        return Err(GitError::CommandFailed {
            command: format!("{} {} ({})", git, args.join(" "), stderr.trim()),
        });
    }

    String::from_utf8(output.stdout)
        .map(|s| s.trim().to_string())
        .map_err(|_| GitError::CommandFailed {
            command: format!("{} {} (output is not valid UTF-8)", git, args.join(" ")),
        })
}
