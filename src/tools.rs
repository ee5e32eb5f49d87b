//! Runtime tool path resolution
//!
//! The pipeline shells out to external tools (python, codecov, docker, git).
//! For each tool we check an environment variable `{TOOL}_BIN` (e.g.
//! `PYTHON_BIN`) and fall back to PATH-based invocation when it is not set.
//! Runner hosts with hermetic toolchains export explicit binary paths; local
//! development relies on PATH.

use anyhow::Result;
use std::env;

/// Tool names the built-in pipeline invokes
pub mod tools {
    pub const PYTHON: &str = "python";
    pub const CODECOV: &str = "codecov";
    pub const DOCKER: &str = "docker";
    pub const GIT: &str = "git";
}

/// Get a tool binary path from environment or fallback to PATH
///
/// # Arguments
///
/// * `env_var` - Environment variable name to check first
/// * `fallback` - Command name to use if env var not set
pub fn get_tool_path(env_var: &str, fallback: &str) -> String {
    env::var(env_var).unwrap_or_else(|_| fallback.to_string())
}

/// Resolve a tool by name using the `{TOOL}_BIN` convention
///
/// `resolve("docker")` checks `DOCKER_BIN`, then falls back to `docker`.
pub fn resolve(tool: &str) -> String {
    let env_var = format!("{}_BIN", tool.to_uppercase().replace('-', "_"));
    get_tool_path(&env_var, tool)
}

/// Verify a tool is locatable, either via its `{TOOL}_BIN` override or PATH
///
/// # Errors
///
/// Returns an error naming the tool and how to point the runner at it.
pub fn ensure_available(tool: &str) -> Result<String> {
    let path = resolve(tool);
    which::which(&path).map_err(|_| {
        anyhow::anyhow!(
            "{} not found (checked {}_BIN env var and PATH). \
             Install it or set {}_BIN to the binary path.",
            tool,
            tool.to_uppercase().replace('-', "_"),
            tool.to_uppercase().replace('-', "_")
        )
    })?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_tool_path_with_env() {
        env::set_var("TEST_RUNNER_TOOL", "/custom/path/to/tool");
        assert_eq!(
            get_tool_path("TEST_RUNNER_TOOL", "default"),
            "/custom/path/to/tool"
        );
        env::remove_var("TEST_RUNNER_TOOL");
    }

    #[test]
    fn test_get_tool_path_fallback() {
        env::remove_var("NONEXISTENT_RUNNER_TOOL");
        assert_eq!(
            get_tool_path("NONEXISTENT_RUNNER_TOOL", "fallback-tool"),
            "fallback-tool"
        );
    }

    #[test]
    fn test_resolve_uppercases_tool_name() {
        env::set_var("PROBETOOL_BIN", "/opt/probetool/bin/probetool");
        assert_eq!(resolve("probetool"), "/opt/probetool/bin/probetool");
        env::remove_var("PROBETOOL_BIN");
    }

    #[test]
    fn test_resolve_fallback_is_tool_name() {
        env::remove_var("SOMETOOL_BIN");
        assert_eq!(resolve("sometool"), "sometool");
    }

    #[test]
    fn test_resolve_dashed_tool_name() {
        env::set_var("MY_TOOL_BIN", "/opt/my-tool");
        assert_eq!(resolve("my-tool"), "/opt/my-tool");
        env::remove_var("MY_TOOL_BIN");
    }
}
