//! AWS adapters that drive the `aws` CLI.
//!
//! Request bodies go to the CLI on stdin via `--cli-input-json`, so secrets
//! such as installation tokens never appear in a process argument list.
//! Responses are read from stdout as JSON.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

use super::runner::{CommandError, CommandRunner};
use crate::credentials::{SecretStore, SecretStoreError};
use crate::dispatch::{
    LaunchError, LaunchFailure, LaunchOutcome, LaunchProfile, TaskEnvironment, TaskLauncher,
};
use crate::stack::{
    ParameterValue, StackClient, StackClientError, StackDescription, StackEvent, StackSpec,
    UpdateResult,
};

const STDIN_INPUT: &str = "file:///dev/stdin";

#[derive(Debug, Error)]
pub enum AwsCliError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("aws {operation} exited with {status:?}: {stderr}")]
    Failed {
        operation: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("aws {operation} returned unexpected output: {source}")]
    Output {
        operation: String,
        #[source]
        source: serde_json::Error,
    },
}

impl AwsCliError {
    fn stderr_contains(&self, needle: &str) -> bool {
        matches!(self, AwsCliError::Failed { stderr, .. } if stderr.contains(needle))
    }
}

/// Implements the cloud ports on top of an `aws` executable.
#[derive(Debug, Clone)]
pub struct AwsCli<R> {
    program: String,
    runner: R,
}

impl<R: CommandRunner + Sync> AwsCli<R> {
    pub fn new(program: impl Into<String>, runner: R) -> Self {
        AwsCli {
            program: program.into(),
            runner,
        }
    }

    /// Runs `aws <service> <command> [args] --output json`, with `input` on
    /// stdin when given.
    async fn call<T: DeserializeOwned>(
        &self,
        service: &str,
        command: &str,
        args: &[&str],
        input: Option<&Value>,
    ) -> Result<T, AwsCliError> {
        let operation = format!("{} {}", service, command);
        let mut argv: Vec<String> = [service, command]
            .iter()
            .chain(args)
            .map(|s| s.to_string())
            .collect();
        let stdin = match input {
            Some(value) => {
                argv.push("--cli-input-json".to_string());
                argv.push(STDIN_INPUT.to_string());
                Some(value.to_string().into_bytes())
            }
            None => None,
        };
        argv.push("--output".to_string());
        argv.push("json".to_string());

        debug!(operation = %operation, "Calling aws");
        let output = self
            .runner
            .run(&self.program, &argv, stdin.as_deref())
            .await?;
        if !output.success() {
            return Err(AwsCliError::Failed {
                operation,
                status: output.status,
                stderr: output.stderr_lossy(),
            });
        }

        // Some commands print nothing on success.
        let stdout = if output.stdout.iter().all(u8::is_ascii_whitespace) {
            b"null".as_slice()
        } else {
            output.stdout.as_slice()
        };
        serde_json::from_slice(stdout).map_err(|source| AwsCliError::Output { operation, source })
    }
}

// ─── SSM ───

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetParameterResponse {
    parameter: SsmParameter,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SsmParameter {
    value: String,
}

impl<R: CommandRunner + Sync> SecretStore for AwsCli<R> {
    async fn get_secret(&self, name: &str) -> Result<SecretString, SecretStoreError> {
        let response: GetParameterResponse = self
            .call("ssm", "get-parameter", &["--name", name, "--with-decryption"], None)
            .await
            .map_err(|e| SecretStoreError::new(name, e.to_string()))?;
        Ok(SecretString::from(response.parameter.value))
    }
}

// ─── ECS ───

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunTaskResponse {
    #[serde(default)]
    tasks: Vec<RunTaskTask>,
    #[serde(default)]
    failures: Vec<RunTaskFailure>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunTaskTask {
    task_arn: String,
}

#[derive(Deserialize)]
struct RunTaskFailure {
    arn: Option<String>,
    reason: Option<String>,
}

fn run_task_input(profile: &LaunchProfile, environment: &TaskEnvironment) -> Value {
    let environment: Vec<Value> = environment
        .to_pairs()
        .into_iter()
        .map(|(name, value)| json!({ "name": name, "value": value }))
        .collect();
    json!({
        "cluster": profile.cluster,
        "taskDefinition": profile.task_definition,
        "launchType": "FARGATE",
        "count": 1,
        "networkConfiguration": {
            "awsvpcConfiguration": {
                "subnets": profile.subnets,
                "securityGroups": profile.security_groups,
                "assignPublicIp": if profile.assign_public_ip { "ENABLED" } else { "DISABLED" },
            }
        },
        "overrides": {
            "containerOverrides": [{
                "name": profile.container_name,
                "environment": environment,
            }]
        }
    })
}

impl<R: CommandRunner + Sync> TaskLauncher for AwsCli<R> {
    async fn run_task(
        &self,
        profile: &LaunchProfile,
        environment: &TaskEnvironment,
    ) -> Result<LaunchOutcome, LaunchError> {
        let input = run_task_input(profile, environment);
        let response: RunTaskResponse = self
            .call("ecs", "run-task", &[], Some(&input))
            .await
            .map_err(|e| LaunchError::Backend(e.to_string()))?;

        Ok(LaunchOutcome {
            task_arns: response.tasks.into_iter().map(|t| t.task_arn).collect(),
            failures: response
                .failures
                .into_iter()
                .map(|f| LaunchFailure {
                    arn: f.arn,
                    reason: f.reason.unwrap_or_else(|| "unknown".to_string()),
                })
                .collect(),
        })
    }
}

// ─── CloudFormation ───

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeStacksResponse {
    #[serde(default)]
    stacks: Vec<CfnStack>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CfnStack {
    stack_name: String,
    stack_status: String,
    stack_status_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeEventsResponse {
    #[serde(default)]
    stack_events: Vec<CfnEvent>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CfnEvent {
    timestamp: DateTime<Utc>,
    #[serde(default)]
    logical_resource_id: String,
    #[serde(default)]
    resource_type: String,
    #[serde(default)]
    resource_status: String,
    resource_status_reason: Option<String>,
}

fn stack_input(spec: &StackSpec) -> Value {
    let parameters: Vec<Value> = spec
        .parameters
        .iter()
        .map(|(key, value)| match value {
            ParameterValue::Value(v) => json!({ "ParameterKey": key, "ParameterValue": v }),
            ParameterValue::UsePrevious => {
                json!({ "ParameterKey": key, "UsePreviousValue": true })
            }
        })
        .collect();
    let tags: Vec<Value> = spec
        .tags
        .iter()
        .map(|(k, v)| json!({ "Key": k, "Value": v }))
        .collect();
    json!({
        "StackName": spec.name,
        "TemplateBody": spec.template_body,
        "Parameters": parameters,
        "Tags": tags,
        "Capabilities": spec.capabilities,
    })
}

impl<R: CommandRunner + Sync> StackClient for AwsCli<R> {
    async fn describe_stack(&self, name: &str) -> Result<Option<StackDescription>, StackClientError> {
        let result: Result<DescribeStacksResponse, _> = self
            .call("cloudformation", "describe-stacks", &["--stack-name", name], None)
            .await;
        let response = match result {
            Ok(response) => response,
            Err(e) if e.stderr_contains("does not exist") => return Ok(None),
            Err(e) => return Err(StackClientError::new("describe-stacks", e.to_string())),
        };
        Ok(response.stacks.into_iter().next().map(|s| StackDescription {
            name: s.stack_name,
            status: s.stack_status,
            status_reason: s.stack_status_reason,
        }))
    }

    async fn create_stack(&self, spec: &StackSpec) -> Result<(), StackClientError> {
        let _: Value = self
            .call("cloudformation", "create-stack", &[], Some(&stack_input(spec)))
            .await
            .map_err(|e| StackClientError::new("create-stack", e.to_string()))?;
        Ok(())
    }

    async fn update_stack(&self, spec: &StackSpec) -> Result<UpdateResult, StackClientError> {
        let result: Result<Value, _> = self
            .call("cloudformation", "update-stack", &[], Some(&stack_input(spec)))
            .await;
        match result {
            Ok(_) => Ok(UpdateResult::Started),
            Err(e) if e.stderr_contains("No updates are to be performed") => {
                Ok(UpdateResult::NoChanges)
            }
            Err(e) => Err(StackClientError::new("update-stack", e.to_string())),
        }
    }

    async fn stack_events(&self, name: &str) -> Result<Vec<StackEvent>, StackClientError> {
        let response: DescribeEventsResponse = self
            .call(
                "cloudformation",
                "describe-stack-events",
                &["--stack-name", name],
                None,
            )
            .await
            .map_err(|e| StackClientError::new("describe-stack-events", e.to_string()))?;
        Ok(response
            .stack_events
            .into_iter()
            .map(|e| StackEvent {
                timestamp: e.timestamp,
                logical_id: e.logical_resource_id,
                resource_type: e.resource_type,
                status: e.resource_status,
                reason: e.resource_status_reason,
            })
            .collect())
    }
}
