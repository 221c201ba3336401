//! Task launch port.

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::environment::TaskEnvironment;

/// Where and how tasks run. Resolved once from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchProfile {
    pub cluster: String,
    pub task_definition: String,
    pub container_name: String,
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,
    pub assign_public_ip: bool,
}

/// A failure the launch API reported for one would-be task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchFailure {
    pub arn: Option<String>,
    pub reason: String,
}

/// What the launch API said it did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchOutcome {
    pub task_arns: Vec<String>,
    pub failures: Vec<LaunchFailure>,
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("launch request failed: {0}")]
    Backend(String),

    #[error("launch started no tasks")]
    NoTasksStarted,

    #[error("launch reported failures: {}", .reasons.join("; "))]
    Reported { reasons: Vec<String> },
}

/// Starts one task with a container environment.
pub trait TaskLauncher {
    fn run_task(
        &self,
        profile: &LaunchProfile,
        environment: &TaskEnvironment,
    ) -> impl Future<Output = Result<LaunchOutcome, LaunchError>> + Send;
}

/// Launches one task and insists that exactly that happened.
///
/// Any reported failure, or a response with no task, is an error even if the
/// call itself succeeded.
pub async fn dispatch_task<L: TaskLauncher + Sync>(
    launcher: &L,
    profile: &LaunchProfile,
    environment: &TaskEnvironment,
) -> Result<String, LaunchError> {
    let outcome = launcher.run_task(profile, environment).await?;

    if !outcome.failures.is_empty() {
        return Err(LaunchError::Reported {
            reasons: outcome
                .failures
                .into_iter()
                .map(|f| match f.arn {
                    Some(arn) => format!("{}: {}", arn, f.reason),
                    None => f.reason,
                })
                .collect(),
        });
    }

    let task_arn = outcome
        .task_arns
        .into_iter()
        .next()
        .ok_or(LaunchError::NoTasksStarted)?;
    info!(cluster = %profile.cluster, task_arn = %task_arn, "Launched task");
    Ok(task_arn)
}
