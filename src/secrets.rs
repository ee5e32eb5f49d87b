//! Secret resolution from process-wide environment storage
//!
//! The pipeline consumes credentials by environment variable name
//! (CODECOV_TOKEN, DOCKER_HUB_USERNAME, DOCKER_HUB_TOKEN in the default
//! workflow). Secrets are resolved at step execution time so that a job
//! that never runs (branch-gated or skipped) never requires its secrets.

use crate::error::SecretError;

/// Resolve a secret from the environment
///
/// Empty values are treated as missing: CI secret stores materialize
/// unset secrets as empty strings.
pub fn resolve(name: &str) -> Result<String, SecretError> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(SecretError::Missing {
            name: name.to_string(),
        }),
    }
}

/// Check a list of secret names, returning the missing ones
///
/// Used by the preflight command to report all gaps at once instead of
/// failing on the first.
pub fn missing(names: &[String]) -> Vec<String> {
    names
        .iter()
        .filter(|name| resolve(name).is_err())
        .cloned()
        .collect()
}
