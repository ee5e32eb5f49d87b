//! Container registry operations
//!
//! Handles authenticating to, building for, and publishing to an image
//! registry through the docker CLI. The daemon keeps login state between
//! steps, so a login step earlier in the job covers the push.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::RegistryError;
use crate::secrets;
use crate::tools;

use super::{backoff_secs, is_transient_error};

/// A parsed image reference: `[host/]repository[:tag]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub registry: Option<String>,
    pub repository: String,
    pub tag: String,
}

impl ImageRef {
    /// Parse an image reference, defaulting the tag to `latest`
    ///
    /// The first path segment counts as a registry host when it looks
    /// like one (contains a dot or a port, or is `localhost`), matching
    /// the docker CLI's own heuristic.
    pub fn parse(reference: &str) -> Result<Self, RegistryError> {
        if reference.trim().is_empty() {
            return Err(RegistryError::InvalidReference {
                reference: reference.to_string(),
            });
        }

        let (registry, rest) = match reference.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (Some(first.to_string()), rest.to_string())
            }
            _ => (None, reference.to_string()),
        };

        let (repository, tag) = match rest.rsplit_once(':') {
            // a ':' inside a path segment would be a port, already split off
            Some((repo, tag)) if !tag.contains('/') => (repo.to_string(), tag.to_string()),
            _ => (rest.clone(), "latest".to_string()),
        };

        if repository.is_empty() || tag.is_empty() {
            return Err(RegistryError::InvalidReference {
                reference: reference.to_string(),
            });
        }

        Ok(Self {
            registry,
            repository,
            tag,
        })
    }

    /// Registry host, defaulting to Docker Hub
    pub fn registry_host(&self) -> &str {
        self.registry.as_deref().unwrap_or("docker.io")
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.registry {
            Some(host) => write!(f, "{}/{}:{}", host, self.repository, self.tag),
            None => write!(f, "{}:{}", self.repository, self.tag),
        }
    }
}

/// Registry credentials for authentication
#[derive(Clone)]
pub struct RegistryCredentials {
    pub username: String,
    pub token: String,
}

impl RegistryCredentials {
    /// Discover credentials for a registry host
    ///
    /// Priority:
    /// 1. The configured secret environment variables
    /// 2. An existing `~/.docker/config.json` auth entry for the host
    pub fn discover(
        username_secret: &str,
        token_secret: &str,
        registry: &str,
    ) -> Result<Self, RegistryError> {
        match (
            secrets::resolve(username_secret),
            secrets::resolve(token_secret),
        ) {
            (Ok(username), Ok(token)) => Ok(Self { username, token }),
            _ => {
                debug!(
                    "{}/{} not set, trying docker config for {}",
                    username_secret, token_secret, registry
                );
                Self::try_docker_config(registry).ok_or(RegistryError::CredentialsNotFound)
            }
        }
    }

    /// Read a base64 `user:token` auth entry from the docker config file
    fn try_docker_config(registry: &str) -> Option<Self> {
        let config_path = match std::env::var("DOCKER_CONFIG") {
            Ok(dir) => std::path::PathBuf::from(dir).join("config.json"),
            Err(_) => dirs_home()?.join(".docker").join("config.json"),
        };

        let content = std::fs::read_to_string(config_path).ok()?;
        let config: serde_json::Value = serde_json::from_str(&content).ok()?;
        let auths = config.get("auths")?.as_object()?;

        // Docker Hub logins are stored under the legacy index URL
        let keys = [
            registry.to_string(),
            format!("https://{}", registry),
            "https://index.docker.io/v1/".to_string(),
        ];

        let entry = keys.iter().find_map(|key| auths.get(key))?;
        let auth = entry.get("auth")?.as_str()?;

        use base64::Engine;
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(auth.trim())
            .ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, token) = decoded.split_once(':')?;

        debug!("Found docker config auth entry for {}", registry);
        Some(Self {
            username: username.to_string(),
            token: token.to_string(),
        })
    }
}

fn dirs_home() -> Option<std::path::PathBuf> {
    std::env::var_os("HOME").map(std::path::PathBuf::from)
}

/// Authenticate to the registry
///
/// The token goes over stdin, never argv, so it cannot leak through the
/// process table.
pub async fn login(registry: &str, credentials: &RegistryCredentials) -> Result<(), RegistryError> {
    let docker = tools::resolve(tools::tools::DOCKER);

    info!("🔐 Logging in to {} as {}", registry, credentials.username);

    let mut child = Command::new(&docker)
        .args([
            "login",
            registry,
            "--username",
            &credentials.username,
            "--password-stdin",
        ])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| RegistryError::LoginFailed {
            message: format!("failed to spawn {}: {}", docker, e),
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(credentials.token.as_bytes())
            .await
            .map_err(|e| RegistryError::LoginFailed {
                message: e.to_string(),
            })?;
        drop(stdin);
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| RegistryError::LoginFailed {
            message: e.to_string(),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RegistryError::LoginFailed {
            message: stderr.trim().to_string(),
        });
    }

    info!("✅ Logged in to {}", registry);
    Ok(())
}

/// Build a container image from a context directory
pub async fn build(image: &ImageRef, context: &Path) -> Result<(), RegistryError> {
    let docker = tools::resolve(tools::tools::DOCKER);

    info!("🔨 Building {} from {}", image, context.display());

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    spinner.set_message(format!("Building {}...", image));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = Command::new(&docker)
        .args(["build", "-t", &image.to_string(), "."])
        .current_dir(context)
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await;

    spinner.finish_and_clear();

    match result {
        Ok(status) if status.success() => {
            info!("✅ Built {}", image);
            Ok(())
        }
        Ok(status) => Err(RegistryError::BuildFailed {
            image: image.to_string(),
            message: format!("exit code: {:?}", status.code()),
        }),
        Err(e) => Err(RegistryError::BuildFailed {
            image: image.to_string(),
            message: e.to_string(),
        }),
    }
}

/// Publish an image with bounded retries
///
/// Transient registry failures back off exponentially; permanent errors
/// (auth, denied) fail on the first attempt. Without SAFE mode a single
/// attempt is made.
pub async fn push(image: &ImageRef, retries: u32, safe_mode: bool) -> Result<(), RegistryError> {
    let docker = tools::resolve(tools::tools::DOCKER);
    let max_attempts = if safe_mode { retries.max(1) } else { 1 };
    let mut attempts = 0;

    info!("📤 Pushing {} to {}", image, image.registry_host());

    loop {
        attempts += 1;
        debug!("Pushing {} (attempt {}/{})", image, attempts, max_attempts);

        let result = Command::new(&docker)
            .args(["push", &image.to_string()])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        let (message, retryable) = match result {
            Ok(output) if output.status.success() => {
                info!("✅ Pushed {}", image);
                return Ok(());
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let stdout = String::from_utf8_lossy(&output.stdout);
                debug!("docker push stderr: {}", stderr.trim());
                let message = if stderr.trim().is_empty() {
                    stdout.trim().to_string()
                } else {
                    stderr.trim().to_string()
                };
                let retryable = is_transient_error(&message);
                (message, retryable)
            }
            Err(e) => (format!("failed to execute {}: {}", docker, e), false),
        };

        if !retryable || attempts >= max_attempts {
            return Err(RegistryError::PushFailed { attempts, message });
        }

        let wait = backoff_secs(attempts);
        warn!(
            "⚠️  Push attempt {}/{} failed, retrying in {}s...",
            attempts, max_attempts, wait
        );
        tokio::time::sleep(Duration::from_secs(wait)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_repository() {
        let image = ImageRef::parse("morai/morai").unwrap();
        assert_eq!(image.registry, None);
        assert_eq!(image.repository, "morai/morai");
        assert_eq!(image.tag, "latest");
        assert_eq!(image.to_string(), "morai/morai:latest");
    }

    #[test]
    fn test_parse_with_host_and_tag() {
        let image = ImageRef::parse("docker.io/morai/morai:v1").unwrap();
        assert_eq!(image.registry.as_deref(), Some("docker.io"));
        assert_eq!(image.repository, "morai/morai");
        assert_eq!(image.tag, "v1");
        assert_eq!(image.registry_host(), "docker.io");
    }

    #[test]
    fn test_parse_localhost_with_port() {
        let image = ImageRef::parse("localhost:5000/morai:dev").unwrap();
        assert_eq!(image.registry.as_deref(), Some("localhost:5000"));
        assert_eq!(image.repository, "morai");
        assert_eq!(image.tag, "dev");
    }

    #[test]
    fn test_parse_org_is_not_a_host() {
        // the first segment of `morai/morai` has no dot, so it is an org
        let image = ImageRef::parse("morai/morai:latest").unwrap();
        assert_eq!(image.registry, None);
        assert_eq!(image.registry_host(), "docker.io");
    }

    #[test]
    fn test_parse_empty_rejected() {
        assert!(matches!(
            ImageRef::parse(""),
            Err(RegistryError::InvalidReference { .. })
        ));
        assert!(matches!(
            ImageRef::parse("docker.io/"),
            Err(RegistryError::InvalidReference { .. })
        ));
    }

    #[test]
    fn test_discover_prefers_env_secrets() {
        std::env::set_var("GANTRY_TEST_REG_USER", "morai-bot");
        std::env::set_var("GANTRY_TEST_REG_TOKEN", "tok");
        let creds = RegistryCredentials::discover(
            "GANTRY_TEST_REG_USER",
            "GANTRY_TEST_REG_TOKEN",
            "docker.io",
        )
        .unwrap();
        assert_eq!(creds.username, "morai-bot");
        assert_eq!(creds.token, "tok");
        std::env::remove_var("GANTRY_TEST_REG_USER");
        std::env::remove_var("GANTRY_TEST_REG_TOKEN");
    }

    // one test so the parallel runner never races on DOCKER_CONFIG
    #[test]
    fn test_discover_docker_config_fallback() {
        use base64::Engine;
        std::env::remove_var("GANTRY_TEST_REG_USER2");
        std::env::remove_var("GANTRY_TEST_REG_TOKEN2");

        // an empty config dir yields no credentials at all
        let empty = tempfile::tempdir().unwrap();
        std::env::set_var("DOCKER_CONFIG", empty.path());
        let result = RegistryCredentials::discover(
            "GANTRY_TEST_REG_USER2",
            "GANTRY_TEST_REG_TOKEN2",
            "docker.io",
        );
        assert!(matches!(result, Err(RegistryError::CredentialsNotFound)));

        // a Docker Hub auth entry under the legacy index URL is picked up
        let dir = tempfile::tempdir().unwrap();
        let auth = base64::engine::general_purpose::STANDARD.encode("cfguser:cfgtoken");
        std::fs::write(
            dir.path().join("config.json"),
            format!(
                r#"{{"auths": {{"https://index.docker.io/v1/": {{"auth": "{}"}}}}}}"#,
                auth
            ),
        )
        .unwrap();
        std::env::set_var("DOCKER_CONFIG", dir.path());
        let creds = RegistryCredentials::discover(
            "GANTRY_TEST_REG_USER2",
            "GANTRY_TEST_REG_TOKEN2",
            "docker.io",
        )
        .unwrap();
        std::env::remove_var("DOCKER_CONFIG");

        assert_eq!(creds.username, "cfguser");
        assert_eq!(creds.token, "cfgtoken");
    }

    #[test]
    fn test_push_permanent_failure_single_attempt() {
        // a docker that always exits 1 with no transient marker
        std::env::set_var("DOCKER_BIN", "false");
        let image = ImageRef::parse("morai/morai").unwrap();
        let result = tokio_test::block_on(push(&image, 3, true));
        std::env::remove_var("DOCKER_BIN");

        match result {
            Err(RegistryError::PushFailed { attempts, .. }) => assert_eq!(attempts, 1),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
