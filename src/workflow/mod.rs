//! # Workflow Definition Model
//!
//! A workflow is a push trigger plus an ordered list of jobs, each a
//! sequence of steps, loaded from `gantry.yaml`. When no workflow file
//! exists the runner falls back to the built-in default pipeline: install
//! the package under test, smoke-test its imports, run the test suite with
//! coverage, upload the report, and (on `main` only, after the test job
//! succeeds) build and publish the container image.
//!
//! ## Example
//!
//! ```yaml
//! name: ci
//! on:
//!   push:
//!     branches: [main, dev]
//! jobs:
//!   - name: test
//!     steps:
//!       - name: Install
//!         run: python -m pip install -e .[dev]
//!       - imports: [morai.utils.helpers]
//!       - tests:
//!           package: morai
//!   - name: publish
//!     needs: [test]
//!     branch: main
//!     steps:
//!       - registry_login: {}
//!       - build_image:
//!           image: docker.io/morai/morai
//!       - push_image:
//!           image: docker.io/morai/morai
//! ```

pub mod trigger;

pub use trigger::{PushEvent, PushTrigger, Trigger};

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::WorkflowError;

/// Default workflow file name, resolved relative to the repository root
pub const DEFAULT_WORKFLOW_FILE: &str = "gantry.yaml";

/// A complete workflow definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(default = "default_workflow_name")]
    pub name: String,

    /// Push trigger filter
    #[serde(rename = "on")]
    pub trigger: Trigger,

    /// Jobs in file order; execution order additionally respects `needs`
    pub jobs: Vec<Job>,
}

fn default_workflow_name() -> String {
    "ci".to_string()
}

/// A named sequence of steps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub name: String,

    /// Jobs that must succeed before this one runs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub needs: Vec<String>,

    /// Branch gate: when set, the job runs only when the event branch
    /// equals this literal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    /// Environment applied to every step in the job
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,

    pub steps: Vec<Step>,
}

/// A single pipeline step
///
/// Untagged: each variant is recognized by its distinguishing key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Step {
    Imports(ImportsStep),
    Tests(TestsStep),
    UploadCoverage(UploadCoverageStep),
    RegistryLogin(RegistryLoginStep),
    BuildImage(BuildImageStep),
    PushImage(PushImageStep),
    Run(RunStep),
}

/// Arbitrary command executed through the shell
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub run: String,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,

    /// Optional duration like "10m" or "90s" (humantime syntax)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

/// Import smoke-test: each module is imported in a fresh interpreter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportsStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub imports: Vec<String>,
}

/// Test-suite run with coverage measurement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestsStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub tests: TestsSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestsSpec {
    /// Package measured for coverage (`--cov=<package>`)
    pub package: String,

    /// XML report path produced by the run
    #[serde(default = "default_report")]
    pub report: String,

    /// Extra arguments appended to the test invocation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

/// Upload the coverage XML report to the reporting service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadCoverageStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub upload_coverage: UploadCoverageSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadCoverageSpec {
    #[serde(default = "default_report")]
    pub report: String,

    /// Secret (environment variable) holding the upload token
    #[serde(default = "default_codecov_token")]
    pub token: String,
}

/// Authenticate to the image registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryLoginStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub registry_login: RegistryLoginSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryLoginSpec {
    #[serde(default = "default_registry_host")]
    pub registry: String,

    /// Secret (environment variable) holding the registry username
    #[serde(default = "default_registry_username")]
    pub username: String,

    /// Secret (environment variable) holding the registry token
    #[serde(default = "default_registry_token")]
    pub token: String,
}

impl Default for RegistryLoginSpec {
    fn default() -> Self {
        Self {
            registry: default_registry_host(),
            username: default_registry_username(),
            token: default_registry_token(),
        }
    }
}

/// Build a container image from a context directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildImageStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub build_image: BuildImageSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildImageSpec {
    /// Image reference, `[host/]repository[:tag]`
    pub image: String,

    /// Build context; defaults to the repository root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Publish an image reference to the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushImageStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub push_image: PushImageSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushImageSpec {
    pub image: String,

    #[serde(default = "default_push_retries")]
    pub retries: u32,
}

fn default_report() -> String {
    "coverage.xml".to_string()
}

fn default_codecov_token() -> String {
    "CODECOV_TOKEN".to_string()
}

fn default_registry_host() -> String {
    "docker.io".to_string()
}

fn default_registry_username() -> String {
    "DOCKER_HUB_USERNAME".to_string()
}

fn default_registry_token() -> String {
    "DOCKER_HUB_TOKEN".to_string()
}

fn default_push_retries() -> u32 {
    3
}

impl Step {
    /// Human-readable step label for logs and summaries
    pub fn display_name(&self) -> String {
        match self {
            Step::Run(s) => s
                .name
                .clone()
                .unwrap_or_else(|| format!("run: {}", s.run)),
            Step::Imports(s) => s
                .name
                .clone()
                .unwrap_or_else(|| format!("import check ({} modules)", s.imports.len())),
            Step::Tests(s) => s
                .name
                .clone()
                .unwrap_or_else(|| format!("tests with coverage ({})", s.tests.package)),
            Step::UploadCoverage(s) => s
                .name
                .clone()
                .unwrap_or_else(|| format!("upload coverage ({})", s.upload_coverage.report)),
            Step::RegistryLogin(s) => s
                .name
                .clone()
                .unwrap_or_else(|| format!("registry login ({})", s.registry_login.registry)),
            Step::BuildImage(s) => s
                .name
                .clone()
                .unwrap_or_else(|| format!("build image {}", s.build_image.image)),
            Step::PushImage(s) => s
                .name
                .clone()
                .unwrap_or_else(|| format!("push image {}", s.push_image.image)),
        }
    }

    /// Secrets (environment variable names) this step resolves when executed
    pub fn required_secrets(&self) -> Vec<String> {
        match self {
            Step::UploadCoverage(s) => vec![s.upload_coverage.token.clone()],
            Step::RegistryLogin(s) => vec![
                s.registry_login.username.clone(),
                s.registry_login.token.clone(),
            ],
            _ => Vec::new(),
        }
    }

    /// External tools this step invokes
    pub fn required_tools(&self) -> Vec<&'static str> {
        use crate::tools::tools;
        match self {
            Step::Run(_) => Vec::new(),
            Step::Imports(_) | Step::Tests(_) => vec![tools::PYTHON],
            Step::UploadCoverage(_) => vec![tools::CODECOV],
            Step::RegistryLogin(_) | Step::BuildImage(_) | Step::PushImage(_) => {
                vec![tools::DOCKER]
            }
        }
    }
}

impl Workflow {
    /// Load and validate a workflow from a YAML file
    pub fn load(path: &Path) -> Result<Self, WorkflowError> {
        let content = std::fs::read_to_string(path).map_err(|_| WorkflowError::FileNotFound {
            path: path.display().to_string(),
        })?;
        Self::from_yaml(&content)
    }

    /// Parse and validate a workflow from YAML text
    pub fn from_yaml(content: &str) -> Result<Self, WorkflowError> {
        let workflow: Workflow =
            serde_yaml::from_str(content).map_err(|e| WorkflowError::ParseError {
                message: e.to_string(),
            })?;
        workflow.validate()?;
        Ok(workflow)
    }

    /// Look up a job by name
    pub fn job(&self, name: &str) -> Option<&Job> {
        self.jobs.iter().find(|job| job.name == name)
    }

    /// Structural validation
    ///
    /// Checks job uniqueness, non-empty step lists, dependency references
    /// and acyclicity. An empty trigger branch list is legal but almost
    /// certainly a mistake, so it logs a warning.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.jobs.is_empty() {
            return Err(WorkflowError::NoJobs);
        }

        if self.trigger.push.branches.is_empty() {
            warn!("workflow `{}` has an empty branch list and will never trigger", self.name);
        }

        let mut seen = HashSet::new();
        for job in &self.jobs {
            if !seen.insert(job.name.as_str()) {
                return Err(WorkflowError::DuplicateJob {
                    name: job.name.clone(),
                });
            }
            if job.steps.is_empty() {
                return Err(WorkflowError::EmptyJob {
                    job: job.name.clone(),
                });
            }
            for needed in &job.needs {
                if !self.jobs.iter().any(|j| &j.name == needed) {
                    return Err(WorkflowError::UnknownDependency {
                        job: job.name.clone(),
                        needs: needed.clone(),
                    });
                }
            }
        }

        // Cycle detection falls out of ordering
        self.execution_order()?;

        Ok(())
    }

    /// Resolve the job execution order
    ///
    /// Topological over `needs`, with file order breaking ties: among the
    /// jobs whose dependencies are already placed, the one appearing first
    /// in the file goes next.
    pub fn execution_order(&self) -> Result<Vec<&Job>, WorkflowError> {
        let mut placed: HashSet<&str> = HashSet::new();
        let mut order: Vec<&Job> = Vec::with_capacity(self.jobs.len());

        while order.len() < self.jobs.len() {
            let next = self.jobs.iter().find(|job| {
                !placed.contains(job.name.as_str())
                    && job.needs.iter().all(|n| placed.contains(n.as_str()))
            });

            match next {
                Some(job) => {
                    placed.insert(job.name.as_str());
                    order.push(job);
                }
                None => {
                    // Every unplaced job is waiting on another unplaced job
                    let stuck = self
                        .jobs
                        .iter()
                        .find(|j| !placed.contains(j.name.as_str()))
                        .expect("unplaced job must exist");
                    return Err(WorkflowError::DependencyCycle {
                        job: stuck.name.clone(),
                    });
                }
            }
        }

        Ok(order)
    }

    /// All secrets the workflow can resolve at execution time
    pub fn required_secrets(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for job in &self.jobs {
            for step in &job.steps {
                for name in step.required_secrets() {
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
            }
        }
        names
    }

    /// All external tools the workflow invokes
    pub fn required_tools(&self) -> Vec<&'static str> {
        let mut tools: Vec<&'static str> = Vec::new();
        for job in &self.jobs {
            for step in &job.steps {
                for tool in step.required_tools() {
                    if !tools.contains(&tool) {
                        tools.push(tool);
                    }
                }
            }
        }
        tools
    }

    /// The built-in test-and-publish pipeline for the morai package
    ///
    /// Triggered by pushes to `main` or `dev`. The test job installs the
    /// package with its dev extras, smoke-tests the documented imports,
    /// runs pytest with coverage and uploads the XML report. The publish
    /// job runs only on `main` after the test job succeeds: registry
    /// login, image build from the repository root, push of the fixed tag.
    pub fn default_pipeline() -> Self {
        let image = "docker.io/morai/morai".to_string();

        Workflow {
            name: "ci".to_string(),
            trigger: Trigger {
                push: PushTrigger {
                    branches: vec!["main".to_string(), "dev".to_string()],
                },
            },
            jobs: vec![
                Job {
                    name: "test".to_string(),
                    needs: Vec::new(),
                    branch: None,
                    env: HashMap::new(),
                    steps: vec![
                        Step::Run(RunStep {
                            name: Some("Upgrade pip".to_string()),
                            run: "python -m pip install --upgrade pip".to_string(),
                            env: HashMap::new(),
                            timeout: None,
                        }),
                        Step::Run(RunStep {
                            name: Some("Install package with dev extras".to_string()),
                            run: "python -m pip install -e .[dev]".to_string(),
                            env: HashMap::new(),
                            timeout: None,
                        }),
                        Step::Imports(ImportsStep {
                            name: Some("Import smoke test".to_string()),
                            imports: vec![
                                "morai.experience.experience".to_string(),
                                "morai.experience.tables".to_string(),
                                "morai.utils.helpers".to_string(),
                            ],
                        }),
                        Step::Tests(TestsStep {
                            name: Some("Run test suite with coverage".to_string()),
                            tests: TestsSpec {
                                package: "morai".to_string(),
                                report: default_report(),
                                args: Vec::new(),
                                timeout: None,
                            },
                        }),
                        Step::UploadCoverage(UploadCoverageStep {
                            name: Some("Upload coverage report".to_string()),
                            upload_coverage: UploadCoverageSpec {
                                report: default_report(),
                                token: default_codecov_token(),
                            },
                        }),
                    ],
                },
                Job {
                    name: "publish".to_string(),
                    needs: vec!["test".to_string()],
                    branch: Some("main".to_string()),
                    env: HashMap::new(),
                    steps: vec![
                        Step::RegistryLogin(RegistryLoginStep {
                            name: Some("Log in to Docker Hub".to_string()),
                            registry_login: RegistryLoginSpec::default(),
                        }),
                        Step::BuildImage(BuildImageStep {
                            name: Some("Build container image".to_string()),
                            build_image: BuildImageSpec {
                                image: image.clone(),
                                context: None,
                            },
                        }),
                        Step::PushImage(PushImageStep {
                            name: Some("Push container image".to_string()),
                            push_image: PushImageSpec {
                                image,
                                retries: default_push_retries(),
                            },
                        }),
                    ],
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
name: ci
on:
  push:
    branches: [main, dev]
jobs:
  - name: test
    steps:
      - name: Upgrade pip
        run: python -m pip install --upgrade pip
      - imports: [morai.utils.helpers]
      - tests:
          package: morai
      - upload_coverage:
          report: coverage.xml
  - name: publish
    needs: [test]
    branch: main
    steps:
      - registry_login: {}
      - build_image:
          image: docker.io/morai/morai
      - push_image:
          image: docker.io/morai/morai
"#;

    #[test]
    fn test_parse_sample() {
        let wf = Workflow::from_yaml(SAMPLE).unwrap();
        assert_eq!(wf.name, "ci");
        assert_eq!(wf.trigger.push.branches, vec!["main", "dev"]);
        assert_eq!(wf.jobs.len(), 2);
        assert_eq!(wf.jobs[0].steps.len(), 4);
        assert_eq!(wf.jobs[1].needs, vec!["test"]);
        assert_eq!(wf.jobs[1].branch.as_deref(), Some("main"));
    }

    #[test]
    fn test_step_kinds_resolved() {
        let wf = Workflow::from_yaml(SAMPLE).unwrap();
        let test_job = wf.job("test").unwrap();
        assert!(matches!(test_job.steps[0], Step::Run(_)));
        assert!(matches!(test_job.steps[1], Step::Imports(_)));
        assert!(matches!(test_job.steps[2], Step::Tests(_)));
        assert!(matches!(test_job.steps[3], Step::UploadCoverage(_)));

        let publish = wf.job("publish").unwrap();
        assert!(matches!(publish.steps[0], Step::RegistryLogin(_)));
        assert!(matches!(publish.steps[1], Step::BuildImage(_)));
        assert!(matches!(publish.steps[2], Step::PushImage(_)));
    }

    #[test]
    fn test_spec_defaults_applied() {
        let wf = Workflow::from_yaml(SAMPLE).unwrap();
        let publish = wf.job("publish").unwrap();
        if let Step::RegistryLogin(step) = &publish.steps[0] {
            assert_eq!(step.registry_login.registry, "docker.io");
            assert_eq!(step.registry_login.username, "DOCKER_HUB_USERNAME");
            assert_eq!(step.registry_login.token, "DOCKER_HUB_TOKEN");
        } else {
            panic!("expected registry_login step");
        }
        if let Step::Tests(step) = &wf.job("test").unwrap().steps[2] {
            assert_eq!(step.tests.report, "coverage.xml");
        } else {
            panic!("expected tests step");
        }
    }

    #[test]
    fn test_duplicate_job_rejected() {
        let yaml = r#"
on:
  push:
    branches: [main]
jobs:
  - name: test
    steps:
      - run: "true"
  - name: test
    steps:
      - run: "true"
"#;
        let err = Workflow::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, WorkflowError::DuplicateJob { .. }));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let yaml = r#"
on:
  push:
    branches: [main]
jobs:
  - name: publish
    needs: [test]
    steps:
      - run: "true"
"#;
        let err = Workflow::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownDependency { .. }));
    }

    #[test]
    fn test_cycle_rejected() {
        let yaml = r#"
on:
  push:
    branches: [main]
jobs:
  - name: a
    needs: [b]
    steps:
      - run: "true"
  - name: b
    needs: [a]
    steps:
      - run: "true"
"#;
        let err = Workflow::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, WorkflowError::DependencyCycle { .. }));
    }

    #[test]
    fn test_empty_job_rejected() {
        let yaml = r#"
on:
  push:
    branches: [main]
jobs:
  - name: test
    steps: []
"#;
        let err = Workflow::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, WorkflowError::EmptyJob { .. }));
    }

    #[test]
    fn test_execution_order_respects_needs() {
        let yaml = r#"
on:
  push:
    branches: [main]
jobs:
  - name: publish
    needs: [test]
    steps:
      - run: "true"
  - name: test
    steps:
      - run: "true"
"#;
        let wf = Workflow::from_yaml(yaml).unwrap();
        let order: Vec<&str> = wf
            .execution_order()
            .unwrap()
            .iter()
            .map(|j| j.name.as_str())
            .collect();
        assert_eq!(order, vec!["test", "publish"]);
    }

    #[test]
    fn test_default_pipeline_matches_contract() {
        let wf = Workflow::default_pipeline();
        wf.validate().unwrap();

        assert_eq!(wf.trigger.push.branches, vec!["main", "dev"]);

        let test_job = wf.job("test").unwrap();
        assert_eq!(test_job.steps.len(), 5);
        if let Step::Imports(step) = &test_job.steps[2] {
            assert_eq!(
                step.imports,
                vec![
                    "morai.experience.experience",
                    "morai.experience.tables",
                    "morai.utils.helpers"
                ]
            );
        } else {
            panic!("expected import smoke test");
        }

        let publish = wf.job("publish").unwrap();
        assert_eq!(publish.needs, vec!["test"]);
        assert_eq!(publish.branch.as_deref(), Some("main"));
    }

    #[test]
    fn test_default_pipeline_required_secrets() {
        let wf = Workflow::default_pipeline();
        assert_eq!(
            wf.required_secrets(),
            vec!["CODECOV_TOKEN", "DOCKER_HUB_USERNAME", "DOCKER_HUB_TOKEN"]
        );
    }

    #[test]
    fn test_default_pipeline_roundtrips_through_yaml() {
        // `gantry init` writes the default pipeline; it must reload cleanly
        let yaml = serde_yaml::to_string(&Workflow::default_pipeline()).unwrap();
        let reloaded = Workflow::from_yaml(&yaml).unwrap();
        assert_eq!(reloaded.jobs.len(), 2);
        assert_eq!(reloaded.job("publish").unwrap().branch.as_deref(), Some("main"));
    }

    #[test]
    fn test_required_tools() {
        let wf = Workflow::default_pipeline();
        let tools = wf.required_tools();
        assert!(tools.contains(&"python"));
        assert!(tools.contains(&"codecov"));
        assert!(tools.contains(&"docker"));
    }
}
