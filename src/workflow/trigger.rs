//! Push trigger evaluation
//!
//! A workflow declares the branches whose pushes it responds to. Trigger
//! matching is an exact string comparison against the event branch; a push
//! to any other branch leaves the workflow untriggered, which is normal
//! operation rather than an error.

use serde::{Deserialize, Serialize};

/// The event a run is evaluated against
#[derive(Debug, Clone)]
pub struct PushEvent {
    pub branch: String,
}

impl PushEvent {
    pub fn new(branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
        }
    }
}

/// Workflow trigger section (`on:`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub push: PushTrigger,
}

/// Push trigger filter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushTrigger {
    pub branches: Vec<String>,
}

impl Trigger {
    /// Whether the workflow responds to this event
    pub fn matches(&self, event: &PushEvent) -> bool {
        self.push
            .branches
            .iter()
            .any(|branch| branch == &event.branch)
    }
}
