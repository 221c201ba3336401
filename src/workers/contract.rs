//! Typed worker records.
//!
//! Values of these types only come out of [`super::parse`], so every instance
//! already satisfies the contract's invariants. They serialize back to the same
//! camelCase shape they were authored in; that serialization is the canonical
//! form the manifest codec checksums.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use super::validate::ValidationError;

/// Event source a trigger listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Provider {
    #[serde(rename = "github")]
    GitHub,
}

impl Provider {
    pub const ALL: &'static [Provider] = &[Provider::GitHub];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::GitHub => "github",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Provider::ALL.iter().copied().find(|p| p.as_str() == s)
    }
}

/// Coding agent a task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Agent {
    Claude,
    Opencode,
}

impl Agent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Agent::Claude => "claude",
            Agent::Opencode => "opencode",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "claude" => Some(Agent::Claude),
            "opencode" => Some(Agent::Opencode),
            _ => None,
        }
    }
}

/// What a task is allowed to do with the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RuntimeMode {
    /// The task may only comment; pushes are disabled unless explicitly allowed.
    #[serde(rename = "comment-only")]
    CommentOnly,
    #[serde(rename = "apply")]
    Apply,
}

impl RuntimeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeMode::CommentOnly => "comment-only",
            RuntimeMode::Apply => "apply",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "comment-only" => Some(RuntimeMode::CommentOnly),
            "apply" => Some(RuntimeMode::Apply),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerMetadata {
    pub id: String,
    #[serde(rename = "type")]
    pub worker_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Optional narrowing of a trigger.
///
/// A `None` field matches any value. A `Some` list requires the event's value
/// to be an exact member.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_branches: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head_branches: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerTrigger {
    pub provider: Provider,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<String>>,
    #[serde(rename = "if", skip_serializing_if = "Option::is_none")]
    pub filter: Option<TriggerFilter>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRuntime {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<Agent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<RuntimeMode>,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_push: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_duration_minutes: Option<f64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl WorkerRuntime {
    /// Whether the task may push, applying the mode-derived default when the
    /// worker does not say.
    pub fn effective_allow_push(&self) -> bool {
        self.allow_push
            .unwrap_or(self.mode != Some(RuntimeMode::CommentOnly))
    }
}

/// A validated worker definition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerDefinition {
    pub metadata: WorkerMetadata,
    pub triggers: Vec<WorkerTrigger>,
    pub runtime: WorkerRuntime,
}

impl WorkerDefinition {
    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    pub fn is_enabled(&self) -> bool {
        self.metadata.enabled
    }
}

/// The complete set of worker definitions for one deployment.
///
/// Order is preserved for serialization but carries no routing meaning.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct WorkerManifest {
    workers: Vec<WorkerDefinition>,
}

impl WorkerManifest {
    /// Builds a manifest, rejecting duplicate worker ids.
    pub fn new(workers: Vec<WorkerDefinition>) -> Result<Self, ValidationError> {
        let mut seen = HashSet::new();
        for (index, worker) in workers.iter().enumerate() {
            if !seen.insert(worker.id()) {
                return Err(ValidationError::new(
                    "manifest",
                    format!("[{}].metadata.id", index),
                    format!("duplicate worker id '{}'", worker.id()),
                ));
            }
        }
        Ok(WorkerManifest { workers })
    }

    pub fn empty() -> Self {
        WorkerManifest::default()
    }

    pub fn workers(&self) -> &[WorkerDefinition] {
        &self.workers
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn get(&self, id: &str) -> Option<&WorkerDefinition> {
        self.workers.iter().find(|w| w.id() == id)
    }
}
