//! Task environment assembly.

use std::collections::BTreeMap;
use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::types::DeliveryId;
use crate::webhooks::WebhookPayload;
use crate::workers::WorkerDefinition;

pub const GITHUB_EVENT: &str = "GITHUB_EVENT";
pub const GITHUB_DELIVERY_ID: &str = "GITHUB_DELIVERY_ID";
pub const GITHUB_REPO: &str = "GITHUB_REPO";
pub const GITHUB_ACTION: &str = "GITHUB_ACTION";
pub const GITHUB_CLONE_URL: &str = "GITHUB_CLONE_URL";
pub const GITHUB_ISSUE_NUMBER: &str = "GITHUB_ISSUE_NUMBER";
pub const GITHUB_PR_NUMBER: &str = "GITHUB_PR_NUMBER";
pub const GITHUB_COMMENT_ID: &str = "GITHUB_COMMENT_ID";
pub const GITHUB_BASE_BRANCH: &str = "GITHUB_BASE_BRANCH";
pub const GITHUB_HEAD_BRANCH: &str = "GITHUB_HEAD_BRANCH";
pub const WORKER_ID: &str = "WORKER_ID";
pub const WORKER_TYPE: &str = "WORKER_TYPE";
pub const WORKER_PROMPT: &str = "WORKER_PROMPT";
pub const WORKER_MODE: &str = "WORKER_MODE";
pub const WORKER_ALLOW_PUSH: &str = "WORKER_ALLOW_PUSH";
pub const WORKER_AGENT: &str = "WORKER_AGENT";
pub const WORKER_MAX_DURATION_MINUTES: &str = "WORKER_MAX_DURATION_MINUTES";
pub const GITHUB_TOKEN: &str = "GITHUB_TOKEN";

/// Names a worker's own `env` may not set, whether or not this delivery
/// fills them.
pub const RESERVED: &[&str] = &[
    GITHUB_EVENT,
    GITHUB_DELIVERY_ID,
    GITHUB_REPO,
    GITHUB_ACTION,
    GITHUB_CLONE_URL,
    GITHUB_ISSUE_NUMBER,
    GITHUB_PR_NUMBER,
    GITHUB_COMMENT_ID,
    GITHUB_BASE_BRANCH,
    GITHUB_HEAD_BRANCH,
    WORKER_ID,
    WORKER_TYPE,
    WORKER_PROMPT,
    WORKER_MODE,
    WORKER_ALLOW_PUSH,
    WORKER_AGENT,
    WORKER_MAX_DURATION_MINUTES,
    GITHUB_TOKEN,
];

/// Environment for one launched task.
///
/// The installation token is kept apart from the plain variables so it can
/// never end up in a log line; `Debug` prints it redacted.
#[derive(Clone)]
pub struct TaskEnvironment {
    vars: BTreeMap<String, String>,
    token: SecretString,
}

impl TaskEnvironment {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    pub fn token(&self) -> &SecretString {
        &self.token
    }

    /// Every variable including `GITHUB_TOKEN`, for handing to a launcher.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        self.vars
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .chain(std::iter::once((
                GITHUB_TOKEN.to_string(),
                self.token.expose_secret().to_string(),
            )))
            .collect()
    }
}

impl fmt::Debug for TaskEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskEnvironment")
            .field("vars", &self.vars)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Builds the environment a worker's task starts with.
///
/// The worker's own `env` goes in first; delivery and worker fields are laid
/// over it, so a worker can add variables but never spoof one the system sets.
pub fn build_task_environment(
    event: &str,
    delivery_id: &DeliveryId,
    payload: &WebhookPayload,
    worker: &WorkerDefinition,
    token: SecretString,
) -> TaskEnvironment {
    let mut vars: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in &worker.runtime.env {
        if RESERVED.contains(&name.as_str()) {
            debug!(worker_id = %worker.id(), name = %name, "Ignoring reserved env override");
            continue;
        }
        vars.insert(name.clone(), value.clone());
    }

    let mut set = |name: &str, value: Option<String>| {
        if let Some(value) = value {
            vars.insert(name.to_string(), value);
        }
    };

    set(GITHUB_EVENT, Some(event.to_string()));
    set(GITHUB_DELIVERY_ID, Some(delivery_id.to_string()));
    set(GITHUB_REPO, payload.repository.as_ref().map(|r| r.full_name()));
    set(GITHUB_ACTION, payload.action.clone());
    set(GITHUB_CLONE_URL, payload.clone_url());
    set(GITHUB_ISSUE_NUMBER, payload.issue_number.map(|n| n.to_string()));
    set(GITHUB_PR_NUMBER, payload.pull_request_number.map(|n| n.to_string()));
    set(GITHUB_COMMENT_ID, payload.comment_id.map(|n| n.to_string()));
    set(GITHUB_BASE_BRANCH, payload.base_branch.clone());
    set(GITHUB_HEAD_BRANCH, payload.head_branch.clone());

    let runtime = &worker.runtime;
    set(WORKER_ID, Some(worker.id().to_string()));
    set(WORKER_TYPE, Some(worker.metadata.worker_type.clone()));
    set(WORKER_PROMPT, Some(runtime.prompt.clone()));
    set(WORKER_MODE, runtime.mode.map(|m| m.as_str().to_string()));
    set(WORKER_ALLOW_PUSH, Some(runtime.effective_allow_push().to_string()));
    set(WORKER_AGENT, runtime.agent.map(|a| a.as_str().to_string()));
    set(
        WORKER_MAX_DURATION_MINUTES,
        runtime.max_duration_minutes.map(format_minutes),
    );

    TaskEnvironment { vars, token }
}

/// `30.0` renders as `30`, `1.5` as `1.5`.
fn format_minutes(minutes: f64) -> String {
    if minutes.fract() == 0.0 && minutes.abs() < 1e15 {
        format!("{}", minutes as i64)
    } else {
        minutes.to_string()
    }
}
