//! Cloud stack deployment.
//!
//! [`StackDeployer::deploy`] is safe to run repeatedly: an absent stack is
//! created, a stable one is updated (or left alone when nothing changed), and
//! one that is mid-operation is refused.

pub mod client;
pub mod deploy;
pub mod status;

use std::time::Duration;

use thiserror::Error;

pub use client::{
    ParameterValue, StackClient, StackClientError, StackDescription, StackEvent, StackSpec,
    UpdateResult,
};
pub use deploy::{
    DEFAULT_POLL_INTERVAL, DeployReport, MAX_FAILURE_CAUSES, StackAction, StackDeployer,
    summarize_failures,
};
pub use status::{StatusClass, classify};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackStatus {
    Absent,
    InProgress,
    Success,
    Failure,
}

impl StackStatus {
    pub fn from_class(class: StatusClass) -> Self {
        match class {
            StatusClass::Success => StackStatus::Success,
            StatusClass::Failure => StackStatus::Failure,
            StatusClass::InProgress => StackStatus::InProgress,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackState {
    pub name: String,
    pub status: StackStatus,
    pub last_action: Option<StackAction>,
}

#[derive(Debug, Error)]
pub enum StackDeployError {
    #[error("stack {name} is busy ({status}); retry once it settles")]
    InProgress { name: String, status: String },

    #[error("stack {name} ended in {status}{}", format_causes(.causes))]
    Failed {
        name: String,
        status: String,
        causes: Vec<String>,
    },

    #[error("stack {name} did not settle within {}s", .waited.as_secs())]
    Timeout { name: String, waited: Duration },

    #[error(transparent)]
    Client(#[from] StackClientError),
}

fn format_causes(causes: &[String]) -> String {
    if causes.is_empty() {
        String::new()
    } else {
        format!(":\n  - {}", causes.join("\n  - "))
    }
}
