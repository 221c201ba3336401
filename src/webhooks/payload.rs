//! Shape-checked view of a verified GitHub webhook body.
//!
//! Only the fields dispatch and routing need are extracted. Anything with the
//! wrong JSON type is treated as absent rather than failing the delivery, so a
//! new GitHub field shape never blocks unrelated workers.

use serde_json::Value;
use thiserror::Error;

use crate::routing::EventContext;
use crate::types::RepoId;
use crate::workers::Provider;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("webhook body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("webhook body must be a JSON object")]
    NotObject,
}

/// The subset of a GitHub payload the dispatcher trusts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookPayload {
    pub action: Option<String>,
    pub repository: Option<RepoId>,
    pub clone_url: Option<String>,
    pub installation_id: Option<u64>,
    pub issue_number: Option<u64>,
    pub pull_request_number: Option<u64>,
    pub comment_id: Option<u64>,
    pub base_branch: Option<String>,
    pub head_branch: Option<String>,
    pub draft: Option<bool>,
}

impl WebhookPayload {
    pub fn parse(body: &[u8]) -> Result<Self, PayloadError> {
        let value: Value = serde_json::from_slice(body)?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, PayloadError> {
        if !value.is_object() {
            return Err(PayloadError::NotObject);
        }

        let issue_number = positive_id(value.pointer("/issue/number"));
        // Comments on pull requests arrive as issue_comment with a
        // `pull_request` link on the issue.
        let issue_is_pull_request = value
            .pointer("/issue/pull_request")
            .is_some_and(|v| !v.is_null());
        let pull_request_number = positive_id(value.pointer("/pull_request/number"))
            .or(if issue_is_pull_request { issue_number } else { None });

        Ok(WebhookPayload {
            action: string_at(value, "/action"),
            repository: repository(value),
            clone_url: string_at(value, "/repository/clone_url"),
            installation_id: positive_id(value.pointer("/installation/id")),
            issue_number,
            pull_request_number,
            comment_id: positive_id(value.pointer("/comment/id")),
            base_branch: string_at(value, "/pull_request/base/ref"),
            head_branch: string_at(value, "/pull_request/head/ref"),
            draft: value.pointer("/pull_request/draft").and_then(Value::as_bool),
        })
    }

    /// The explicit clone URL, or one synthesized from the full name.
    pub fn clone_url(&self) -> Option<String> {
        self.clone_url.clone().or_else(|| {
            self.repository
                .as_ref()
                .map(|repo| format!("https://github.com/{}.git", repo.full_name()))
        })
    }
}

impl EventContext {
    /// Derives the routable context of a GitHub delivery.
    pub fn from_payload(event: &str, payload: &WebhookPayload) -> Self {
        EventContext {
            provider: Provider::GitHub,
            event: event.to_string(),
            action: payload.action.clone(),
            repository: payload.repository.as_ref().map(RepoId::full_name),
            base_branch: payload.base_branch.clone(),
            head_branch: payload.head_branch.clone(),
            draft: payload.draft,
        }
    }
}

fn string_at(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Positive integers only; floats, strings and zero are rejected.
fn positive_id(value: Option<&Value>) -> Option<u64> {
    value.and_then(Value::as_u64).filter(|n| *n > 0)
}

fn repository(value: &Value) -> Option<RepoId> {
    if let Some(full_name) = value.pointer("/repository/full_name").and_then(Value::as_str) {
        return RepoId::parse_full_name(full_name);
    }
    let owner = value.pointer("/repository/owner/login").and_then(Value::as_str)?;
    let name = value.pointer("/repository/name").and_then(Value::as_str)?;
    RepoId::parse_full_name(&format!("{}/{}", owner, name))
}
