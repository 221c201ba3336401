//! Event routing: which workers does an inbound event wake up?
//!
//! Routing is a pure function of the manifest and an [`EventContext`]. The
//! result is sorted by worker id so it does not depend on the order workers
//! were authored in, and disabled workers never appear.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::workers::{Provider, TriggerFilter, WorkerDefinition, WorkerManifest, WorkerTrigger};

/// The routable facts about one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventContext {
    pub provider: Provider,
    pub event: String,
    pub action: Option<String>,
    /// Repository full name (`owner/repo`).
    pub repository: Option<String>,
    pub base_branch: Option<String>,
    pub head_branch: Option<String>,
    pub draft: Option<bool>,
}

impl EventContext {
    /// A GitHub context with only the event name set.
    pub fn github(event: impl Into<String>) -> Self {
        EventContext {
            provider: Provider::GitHub,
            event: event.into(),
            action: None,
            repository: None,
            base_branch: None,
            head_branch: None,
            draft: None,
        }
    }
}

/// The events one worker subscribes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub worker_id: String,
    pub events: Vec<String>,
}

/// Returns the enabled workers with at least one matching trigger, sorted by id.
pub fn route<'m>(manifest: &'m WorkerManifest, context: &EventContext) -> Vec<&'m WorkerDefinition> {
    let mut matched: Vec<_> = manifest
        .workers()
        .iter()
        .filter(|w| w.is_enabled())
        .filter(|w| w.triggers.iter().any(|t| trigger_matches(t, context)))
        .collect();
    matched.sort_by(|a, b| a.id().cmp(b.id()));
    matched
}

/// Lists, for each enabled worker, the sorted unique GitHub events it listens to.
///
/// This drives event-source subscription and is independent of filters and
/// actions.
pub fn collect_subscriptions(manifest: &WorkerManifest) -> Vec<Subscription> {
    let mut subscriptions: Vec<_> = manifest
        .workers()
        .iter()
        .filter(|w| w.is_enabled())
        .map(|w| {
            let events: BTreeSet<&str> = w
                .triggers
                .iter()
                .filter(|t| t.provider == Provider::GitHub)
                .map(|t| t.event.as_str())
                .collect();
            Subscription {
                worker_id: w.id().to_string(),
                events: events.into_iter().map(String::from).collect(),
            }
        })
        .collect();
    subscriptions.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
    subscriptions
}

/// Whether one trigger accepts the event.
pub fn trigger_matches(trigger: &WorkerTrigger, context: &EventContext) -> bool {
    if trigger.provider != context.provider || trigger.event != context.event {
        return false;
    }

    if let Some(actions) = &trigger.actions {
        match &context.action {
            Some(action) if actions.contains(action) => {}
            _ => return false,
        }
    }

    trigger
        .filter
        .as_ref()
        .is_none_or(|filter| filter_matches(filter, context))
}

fn filter_matches(filter: &TriggerFilter, context: &EventContext) -> bool {
    member_of(&filter.repository, &context.repository)
        && member_of(&filter.base_branches, &context.base_branch)
        && member_of(&filter.head_branches, &context.head_branch)
        && match (filter.draft, context.draft) {
            (Some(want), Some(got)) => want == got,
            _ => true,
        }
}

/// An absent list matches anything; a present list requires a present, listed value.
fn member_of(allowed: &Option<Vec<String>>, value: &Option<String>) -> bool {
    match allowed {
        None => true,
        Some(allowed) => value.as_ref().is_some_and(|v| allowed.contains(v)),
    }
}
