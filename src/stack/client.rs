//! Stack client port and the request it deploys.

use std::collections::BTreeMap;
use std::future::Future;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// A stack parameter: a new value, or keep whatever the stack has.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterValue {
    Value(String),
    UsePrevious,
}

/// Everything needed to create or update one stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackSpec {
    pub name: String,
    pub template_body: String,
    pub parameters: BTreeMap<String, ParameterValue>,
    pub tags: BTreeMap<String, String>,
    pub capabilities: Vec<String>,
}

impl StackSpec {
    pub fn new(name: impl Into<String>, template_body: impl Into<String>) -> Self {
        StackSpec {
            name: name.into(),
            template_body: template_body.into(),
            parameters: BTreeMap::new(),
            tags: BTreeMap::new(),
            capabilities: Vec::new(),
        }
    }

    pub fn parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters
            .insert(key.into(), ParameterValue::Value(value.into()));
        self
    }

    /// Sets every entry of `values`, such as an encoded manifest.
    pub fn parameters<I, K, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in values {
            self = self.parameter(key, value);
        }
        self
    }

    pub fn use_previous(mut self, key: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), ParameterValue::UsePrevious);
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackDescription {
    pub name: String,
    pub status: String,
    pub status_reason: Option<String>,
}

/// One resource event from a stack's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackEvent {
    pub timestamp: DateTime<Utc>,
    pub logical_id: String,
    pub resource_type: String,
    pub status: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateResult {
    Started,
    /// The provider found nothing to change.
    NoChanges,
}

#[derive(Debug, Error)]
#[error("stack API call {operation} failed: {message}")]
pub struct StackClientError {
    pub operation: &'static str,
    pub message: String,
}

impl StackClientError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        StackClientError {
            operation,
            message: message.into(),
        }
    }
}

/// Create, update and inspect named stacks.
pub trait StackClient {
    /// `None` if the stack does not exist.
    fn describe_stack(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<StackDescription>, StackClientError>> + Send;

    fn create_stack(
        &self,
        spec: &StackSpec,
    ) -> impl Future<Output = Result<(), StackClientError>> + Send;

    fn update_stack(
        &self,
        spec: &StackSpec,
    ) -> impl Future<Output = Result<UpdateResult, StackClientError>> + Send;

    /// Resource events, in any order.
    fn stack_events(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Vec<StackEvent>, StackClientError>> + Send;
}
