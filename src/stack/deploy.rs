//! Idempotent create-or-update with polling.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::client::{StackClient, StackEvent, StackSpec, UpdateResult};
use super::status::{StatusClass, classify, is_failure_event};
use super::{StackDeployError, StackState, StackStatus};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// How many failing events a failure summary carries.
pub const MAX_FAILURE_CAUSES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackAction {
    Create,
    Update,
    Noop,
}

impl StackAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            StackAction::Create => "create",
            StackAction::Update => "update",
            StackAction::Noop => "noop",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployReport {
    pub state: StackState,
    /// The provider's final status string.
    pub provider_status: String,
}

#[derive(Debug)]
pub struct StackDeployer<C> {
    client: C,
    poll_interval: Duration,
}

impl<C: StackClient + Sync> StackDeployer<C> {
    pub fn new(client: C) -> Self {
        StackDeployer {
            client,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Creates the stack if absent, otherwise updates it, then waits up to
    /// `timeout` for a terminal status.
    ///
    /// A stack that is already mid-operation is rejected without touching it.
    pub async fn deploy(
        &self,
        spec: &StackSpec,
        timeout: Duration,
    ) -> Result<DeployReport, StackDeployError> {
        let deadline = Instant::now() + timeout;
        let name = spec.name.as_str();

        let action = match self.client.describe_stack(name).await? {
            None => {
                debug!(stack = %name, "Stack absent, creating");
                self.client.create_stack(spec).await?;
                StackAction::Create
            }
            Some(existing) => {
                if classify(&existing.status) == StatusClass::InProgress {
                    warn!(stack = %name, status = %existing.status, "Stack busy");
                    return Err(StackDeployError::InProgress {
                        name: name.to_string(),
                        status: existing.status,
                    });
                }
                debug!(stack = %name, status = %existing.status, "Stack present, updating");
                match self.client.update_stack(spec).await? {
                    UpdateResult::Started => StackAction::Update,
                    UpdateResult::NoChanges => {
                        info!(stack = %name, "No stack changes");
                        return Ok(DeployReport {
                            state: StackState {
                                name: name.to_string(),
                                status: StackStatus::from_class(classify(&existing.status)),
                                last_action: Some(StackAction::Noop),
                            },
                            provider_status: existing.status,
                        });
                    }
                }
            }
        };

        self.wait(name, action, deadline, timeout).await
    }

    async fn wait(
        &self,
        name: &str,
        action: StackAction,
        deadline: Instant,
        timeout: Duration,
    ) -> Result<DeployReport, StackDeployError> {
        loop {
            let Some(current) = self.client.describe_stack(name).await? else {
                return Err(StackDeployError::Failed {
                    name: name.to_string(),
                    status: "DELETED".to_string(),
                    causes: vec!["stack no longer exists".to_string()],
                });
            };

            match classify(&current.status) {
                StatusClass::Success => {
                    info!(stack = %name, action = action.as_str(), status = %current.status, "Stack deployed");
                    return Ok(DeployReport {
                        state: StackState {
                            name: name.to_string(),
                            status: StackStatus::Success,
                            last_action: Some(action),
                        },
                        provider_status: current.status,
                    });
                }
                StatusClass::Failure => {
                    let mut causes = summarize_failures(self.client.stack_events(name).await?);
                    if causes.is_empty() {
                        causes.extend(current.status_reason);
                    }
                    warn!(stack = %name, status = %current.status, causes = causes.len(), "Stack deploy failed");
                    return Err(StackDeployError::Failed {
                        name: name.to_string(),
                        status: current.status,
                        causes,
                    });
                }
                StatusClass::InProgress => {
                    debug!(stack = %name, status = %current.status, "Stack still in progress");
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(StackDeployError::Timeout {
                    name: name.to_string(),
                    waited: timeout,
                });
            }
            // The last sleep is shortened so the final poll lands on the deadline.
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}

/// The most recent failing or rollback events that carry a reason, newest
/// first.
pub fn summarize_failures(mut events: Vec<StackEvent>) -> Vec<String> {
    events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    events
        .into_iter()
        .filter(|e| is_failure_event(&e.status))
        .filter_map(|e| {
            let reason = e.reason.filter(|r| !r.trim().is_empty())?;
            Some(format!(
                "{} ({}) {}: {}",
                e.logical_id, e.resource_type, e.status, reason
            ))
        })
        .take(MAX_FAILURE_CAUSES)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeStackClient;
    use chrono::{TimeZone, Utc};

    fn spec() -> StackSpec {
        StackSpec::new("workers", "{}").parameter("A", "1")
    }

    fn event(second: u32, status: &str, reason: Option<&str>) -> StackEvent {
        StackEvent {
            timestamp: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, second).unwrap(),
            logical_id: format!("Res{}", second),
            resource_type: "AWS::ECS::Service".to_string(),
            status: status.to_string(),
            reason: reason.map(String::from),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn creates_absent_stack() {
        let client = FakeStackClient::absent();
        client.script(["CREATE_IN_PROGRESS", "CREATE_IN_PROGRESS", "CREATE_COMPLETE"]);
        let deployer = StackDeployer::new(client.clone());

        let report = deployer.deploy(&spec(), Duration::from_secs(600)).await.unwrap();

        assert_eq!(report.state.status, StackStatus::Success);
        assert_eq!(report.state.last_action, Some(StackAction::Create));
        assert_eq!(report.provider_status, "CREATE_COMPLETE");
        assert_eq!(client.creates(), 1);
        assert_eq!(client.updates(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn updates_existing_stack() {
        let client = FakeStackClient::existing("CREATE_COMPLETE");
        client.script(["UPDATE_IN_PROGRESS", "UPDATE_COMPLETE"]);
        let deployer = StackDeployer::new(client.clone());

        let report = deployer.deploy(&spec(), Duration::from_secs(600)).await.unwrap();

        assert_eq!(report.state.last_action, Some(StackAction::Update));
        assert_eq!(client.updates(), 1);
        assert_eq!(client.creates(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_stack_is_noop() {
        let client = FakeStackClient::existing("UPDATE_COMPLETE");
        client.no_changes();
        let deployer = StackDeployer::new(client.clone());

        let report = deployer.deploy(&spec(), Duration::from_secs(600)).await.unwrap();

        assert_eq!(report.state.last_action, Some(StackAction::Noop));
        assert_eq!(report.state.status, StackStatus::Success);
        assert_eq!(client.updates(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn busy_stack_is_rejected_untouched() {
        let client = FakeStackClient::existing("UPDATE_IN_PROGRESS");
        let deployer = StackDeployer::new(client.clone());

        let err = deployer
            .deploy(&spec(), Duration::from_secs(600))
            .await
            .unwrap_err();

        assert!(matches!(err, StackDeployError::InProgress { ref status, .. } if status == "UPDATE_IN_PROGRESS"));
        assert_eq!(client.updates(), 0);
        assert_eq!(client.creates(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_collects_causes() {
        let client = FakeStackClient::absent();
        client.script(["CREATE_IN_PROGRESS", "ROLLBACK_COMPLETE"]);
        client.set_events(vec![
            event(1, "CREATE_IN_PROGRESS", None),
            event(2, "CREATE_FAILED", Some("Resource limit exceeded")),
            event(3, "ROLLBACK_IN_PROGRESS", Some("The following resource(s) failed to create: [Res2]")),
            event(4, "DELETE_COMPLETE", None),
        ]);
        let deployer = StackDeployer::new(client);

        let err = deployer
            .deploy(&spec(), Duration::from_secs(600))
            .await
            .unwrap_err();

        let StackDeployError::Failed { status, causes, .. } = err else {
            panic!("expected failure, got {:?}", err);
        };
        assert_eq!(status, "ROLLBACK_COMPLETE");
        assert_eq!(
            causes,
            [
                "Res3 (AWS::ECS::Service) ROLLBACK_IN_PROGRESS: The following resource(s) failed to create: [Res2]",
                "Res2 (AWS::ECS::Service) CREATE_FAILED: Resource limit exceeded",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_at_deadline() {
        let client = FakeStackClient::absent();
        client.script(["CREATE_IN_PROGRESS"]);
        let deployer = StackDeployer::new(client.clone()).with_poll_interval(Duration::from_secs(10));

        let start = Instant::now();
        let err = deployer
            .deploy(&spec(), Duration::from_secs(60))
            .await
            .unwrap_err();

        assert!(matches!(err, StackDeployError::Timeout { .. }));
        assert_eq!(start.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn polls_once_more_at_deadline() {
        let client = FakeStackClient::absent();
        // Polls at t=0, 10, 20 see in-progress; the shortened poll at t=25 sees completion.
        client.script([
            "CREATE_IN_PROGRESS",
            "CREATE_IN_PROGRESS",
            "CREATE_IN_PROGRESS",
            "CREATE_COMPLETE",
        ]);
        let deployer = StackDeployer::new(client.clone()).with_poll_interval(Duration::from_secs(10));

        let start = Instant::now();
        let report = deployer
            .deploy(&spec(), Duration::from_secs(25))
            .await
            .unwrap();

        assert_eq!(report.state.status, StackStatus::Success);
        assert_eq!(start.elapsed(), Duration::from_secs(25));
    }

    #[tokio::test(start_paused = true)]
    async fn vanished_stack_fails() {
        let client = FakeStackClient::absent();
        let deployer = StackDeployer::new(client);

        let err = deployer
            .deploy(&spec(), Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, StackDeployError::Failed { ref causes, .. } if causes == &["stack no longer exists"]));
    }

    #[test]
    fn summary_is_bounded_and_newest_first() {
        let events: Vec<_> = (0..20)
            .map(|s| event(s, "UPDATE_FAILED", Some("boom")))
            .collect();
        let causes = summarize_failures(events);

        assert_eq!(causes.len(), MAX_FAILURE_CAUSES);
        assert!(causes[0].starts_with("Res19 "));
    }

    #[test]
    fn events_without_reason_are_skipped() {
        let causes = summarize_failures(vec![
            event(1, "CREATE_FAILED", Some("  ")),
            event(2, "CREATE_FAILED", None),
        ]);
        assert!(causes.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn status_reason_used_when_no_events_explain() {
        let client = FakeStackClient::existing("CREATE_COMPLETE");
        client.script(["UPDATE_ROLLBACK_COMPLETE"]);
        client.set_status_reason("Parameter validation failed");
        let deployer = StackDeployer::new(client);

        let err = deployer
            .deploy(&spec(), Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, StackDeployError::Failed { ref causes, .. } if causes == &["Parameter validation failed"]));
    }
}
