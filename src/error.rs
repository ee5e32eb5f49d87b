//! Centralized error types for gantry
//!
//! Uses thiserror for typed errors that can be matched on,
//! while still being compatible with anyhow for propagation.

use thiserror::Error;

/// Top-level error type for pipeline operations
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Secret error: {0}")]
    Secret(#[from] SecretError),

    #[error("Step error: {0}")]
    Step(#[from] StepError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Coverage error: {0}")]
    Coverage(#[from] CoverageError),

    #[error("Git error: {0}")]
    Git(#[from] GitError),
}

/// Workflow definition errors
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Workflow file not found: {path}")]
    FileNotFound { path: String },

    #[error("Failed to parse workflow: {message}")]
    ParseError { message: String },

    #[error("Workflow has no jobs")]
    NoJobs,

    #[error("Duplicate job name: {name}")]
    DuplicateJob { name: String },

    #[error("Job {job} has no steps")]
    EmptyJob { job: String },

    #[error("Job {job} needs unknown job {needs}")]
    UnknownDependency { job: String, needs: String },

    #[error("Dependency cycle involving job {job}")]
    DependencyCycle { job: String },

    #[error("Unknown job: {name}")]
    UnknownJob { name: String },
}

/// Secret resolution errors
#[derive(Error, Debug)]
pub enum SecretError {
    #[error("Secret {name} not found. Export it in the runner environment (e.g. `export {name}=...`)")]
    Missing { name: String },
}

/// Step execution errors
#[derive(Error, Debug)]
pub enum StepError {
    #[error("Step `{step}` failed with exit code {code:?}")]
    CommandFailed { step: String, code: Option<i32> },

    #[error("Step `{step}` could not be spawned: {message}")]
    SpawnFailed { step: String, message: String },

    #[error("Module import check failed for: {modules}")]
    ImportCheckFailed { modules: String },

    #[error("Step `{step}` timed out after {timeout}")]
    Timeout { step: String, timeout: String },
}

/// Container registry errors
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Registry credentials not found. Set DOCKER_HUB_USERNAME and DOCKER_HUB_TOKEN env vars or run `docker login`")]
    CredentialsNotFound,

    #[error("Invalid image reference: {reference}. Expected: [host/]repository[:tag]")]
    InvalidReference { reference: String },

    #[error("Registry login failed: {message}")]
    LoginFailed { message: String },

    #[error("Image build failed for {image}: {message}")]
    BuildFailed { image: String, message: String },

    #[error("Push failed after {attempts} attempts: {message}")]
    PushFailed { attempts: u32, message: String },
}

/// Coverage collection and upload errors
#[derive(Error, Debug)]
pub enum CoverageError {
    #[error("Coverage report not found at {path}. Did the test run produce an XML report?")]
    ReportMissing { path: String },

    #[error("Upload failed after {attempts} attempts: {message}")]
    UploadFailed { attempts: u32, message: String },
}

/// Git operation errors
#[derive(Error, Debug)]
pub enum GitError {
    #[error("Not a git repository")]
    NotARepository,

    #[error("Failed to get git SHA: {0}")]
    ShaFailed(String),

    #[error("Failed to resolve current branch: {0}")]
    BranchFailed(String),

    #[error("Git command failed: {command}")]
    CommandFailed { command: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_error_names_variable() {
        let err = SecretError::Missing {
            name: "CODECOV_TOKEN".to_string(),
        };
        assert!(err.to_string().contains("CODECOV_TOKEN"));
    }

    #[test]
    fn test_registry_error_display() {
        let err = RegistryError::CredentialsNotFound;
        assert!(err.to_string().contains("DOCKER_HUB_USERNAME"));
    }

    #[test]
    fn test_error_conversion() {
        let secret_err = SecretError::Missing {
            name: "DOCKER_HUB_TOKEN".to_string(),
        };
        let pipeline_err: PipelineError = secret_err.into();
        assert!(matches!(pipeline_err, PipelineError::Secret(_)));
    }

    #[test]
    fn test_unknown_dependency_display() {
        let err = WorkflowError::UnknownDependency {
            job: "publish".to_string(),
            needs: "tests".to_string(),
        };
        assert!(err.to_string().contains("publish"));
        assert!(err.to_string().contains("tests"));
    }
}
