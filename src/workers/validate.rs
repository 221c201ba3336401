//! Worker definition parsing and validation.
//!
//! [`parse`] is the only way to obtain a [`WorkerDefinition`]. It walks the raw
//! JSON value by hand, checking each field's shape, and stops at the first
//! problem. The error names the definition's label and the dotted path of the
//! offending field so authors can find it without reading the source.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

use super::contract::{
    Agent, Provider, RuntimeMode, TriggerFilter, WorkerDefinition, WorkerMetadata, WorkerRuntime,
    WorkerTrigger,
};

static WORKER_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"(?i)^[a-z0-9][a-z0-9-]*$").expect("valid regex")
});

/// A worker definition failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid worker definition {label}: {path}: {message}")]
pub struct ValidationError {
    /// Where the definition came from (file name, manifest index).
    pub label: String,
    /// Dotted path of the first invalid field.
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(
        label: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        ValidationError {
            label: label.into(),
            path: path.into(),
            message: message.into(),
        }
    }
}

type Result<T> = std::result::Result<T, ValidationError>;

/// Parses and validates one raw worker definition.
pub fn parse(raw: &Value, label: &str) -> Result<WorkerDefinition> {
    let cx = Cx { label };
    let root = cx.object(raw, "")?;

    let metadata = cx.metadata(cx.required(root, "", "metadata")?)?;
    let triggers = cx.triggers(cx.required(root, "", "triggers")?)?;
    let runtime = cx.runtime(cx.required(root, "", "runtime")?)?;

    Ok(WorkerDefinition {
        metadata,
        triggers,
        runtime,
    })
}

/// Field-checking helpers that carry the definition label into errors.
struct Cx<'a> {
    label: &'a str,
}

impl Cx<'_> {
    fn err(&self, path: &str, message: impl Into<String>) -> ValidationError {
        let path = if path.is_empty() { "<root>" } else { path };
        ValidationError::new(self.label, path, message)
    }

    fn object<'v>(&self, value: &'v Value, path: &str) -> Result<&'v Map<String, Value>> {
        value
            .as_object()
            .ok_or_else(|| self.err(path, "must be an object"))
    }

    fn required<'v>(
        &self,
        obj: &'v Map<String, Value>,
        parent: &str,
        key: &str,
    ) -> Result<&'v Value> {
        match obj.get(key) {
            Some(Value::Null) | None => Err(self.err(&join(parent, key), "is required")),
            Some(v) => Ok(v),
        }
    }

    fn non_empty_string(&self, value: &Value, path: &str) -> Result<String> {
        match value.as_str() {
            Some(s) if !s.trim().is_empty() => Ok(s.to_string()),
            Some(_) => Err(self.err(path, "must be a non-empty string")),
            None => Err(self.err(path, "must be a string")),
        }
    }

    fn required_string(&self, obj: &Map<String, Value>, parent: &str, key: &str) -> Result<String> {
        let value = self.required(obj, parent, key)?;
        self.non_empty_string(value, &join(parent, key))
    }

    fn optional_string(
        &self,
        obj: &Map<String, Value>,
        parent: &str,
        key: &str,
    ) -> Result<Option<String>> {
        match obj.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(self.err(&join(parent, key), "must be a string")),
        }
    }

    fn optional_bool(
        &self,
        obj: &Map<String, Value>,
        parent: &str,
        key: &str,
    ) -> Result<Option<bool>> {
        match obj.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(_) => Err(self.err(&join(parent, key), "must be a boolean")),
        }
    }

    fn optional_string_list(
        &self,
        obj: &Map<String, Value>,
        parent: &str,
        key: &str,
    ) -> Result<Option<Vec<String>>> {
        let path = join(parent, key);
        let items = match obj.get(key) {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Array(items)) => items,
            Some(_) => return Err(self.err(&path, "must be an array of strings")),
        };
        items
            .iter()
            .enumerate()
            .map(|(i, item)| self.non_empty_string(item, &format!("{}[{}]", path, i)))
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }

    fn metadata(&self, value: &Value) -> Result<WorkerMetadata> {
        let path = "metadata";
        let obj = self.object(value, path)?;

        let id = self.required_string(obj, path, "id")?;
        if !WORKER_ID_RE.is_match(&id) {
            return Err(self.err(
                "metadata.id",
                format!(
                    "'{}' must start with a letter or digit and contain only letters, digits and '-'",
                    id
                ),
            ));
        }

        Ok(WorkerMetadata {
            id,
            worker_type: self.required_string(obj, path, "type")?,
            description: self.optional_string(obj, path, "description")?,
            enabled: self.optional_bool(obj, path, "enabled")?.unwrap_or(true),
            version: self.optional_string(obj, path, "version")?,
        })
    }

    fn triggers(&self, value: &Value) -> Result<Vec<WorkerTrigger>> {
        let items = value
            .as_array()
            .ok_or_else(|| self.err("triggers", "must be an array"))?;
        if items.is_empty() {
            return Err(self.err("triggers", "must contain at least one trigger"));
        }
        items
            .iter()
            .enumerate()
            .map(|(i, item)| self.trigger(item, &format!("triggers[{}]", i)))
            .collect()
    }

    fn trigger(&self, value: &Value, path: &str) -> Result<WorkerTrigger> {
        let obj = self.object(value, path)?;

        let provider_name = self.required_string(obj, path, "provider")?;
        let provider = Provider::parse(&provider_name).ok_or_else(|| {
            let known: Vec<_> = Provider::ALL.iter().map(Provider::as_str).collect();
            self.err(
                &join(path, "provider"),
                format!(
                    "unknown provider '{}' (expected one of: {})",
                    provider_name,
                    known.join(", ")
                ),
            )
        })?;

        let event = self.required_string(obj, path, "event")?;
        let actions = self.optional_string_list(obj, path, "actions")?;
        let filter = match obj.get("if") {
            None | Some(Value::Null) => None,
            Some(raw) => Some(self.filter(raw, &join(path, "if"))?),
        };

        Ok(WorkerTrigger {
            provider,
            event,
            actions,
            filter,
        })
    }

    fn filter(&self, value: &Value, path: &str) -> Result<TriggerFilter> {
        let obj = self.object(value, path)?;
        Ok(TriggerFilter {
            repository: self.optional_string_list(obj, path, "repository")?,
            base_branches: self.optional_string_list(obj, path, "baseBranches")?,
            head_branches: self.optional_string_list(obj, path, "headBranches")?,
            draft: self.optional_bool(obj, path, "draft")?,
        })
    }

    fn runtime(&self, value: &Value) -> Result<WorkerRuntime> {
        let path = "runtime";
        let obj = self.object(value, path)?;

        let agent = match self.optional_string(obj, path, "agent")? {
            None => None,
            Some(name) => Some(Agent::parse(&name).ok_or_else(|| {
                self.err(
                    "runtime.agent",
                    format!("unknown agent '{}' (expected claude or opencode)", name),
                )
            })?),
        };

        let mode = match self.optional_string(obj, path, "mode")? {
            None => None,
            Some(name) => Some(RuntimeMode::parse(&name).ok_or_else(|| {
                self.err(
                    "runtime.mode",
                    format!("unknown mode '{}' (expected comment-only or apply)", name),
                )
            })?),
        };

        let prompt = self.required_string(obj, path, "prompt")?;
        let allow_push = self.optional_bool(obj, path, "allowPush")?;

        let max_duration_minutes = match obj.get("maxDurationMinutes") {
            None | Some(Value::Null) => None,
            Some(v) => match v.as_f64() {
                Some(n) if n.is_finite() && n > 0.0 => Some(n),
                _ => {
                    return Err(self.err(
                        "runtime.maxDurationMinutes",
                        "must be a positive finite number",
                    ));
                }
            },
        };

        let env = match obj.get("env") {
            None | Some(Value::Null) => BTreeMap::new(),
            Some(raw) => {
                let entries = self.object(raw, "runtime.env")?;
                let mut env = BTreeMap::new();
                for (key, value) in entries {
                    let value = value.as_str().ok_or_else(|| {
                        self.err(&format!("runtime.env.{}", key), "must be a string")
                    })?;
                    env.insert(key.clone(), value.to_string());
                }
                env
            }
        };

        Ok(WorkerRuntime {
            agent,
            mode,
            prompt,
            allow_push,
            max_duration_minutes,
            env,
        })
    }
}

fn join(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}
