//! Service configuration from the environment.

use std::net::SocketAddr;

use chrono::Duration;
use thiserror::Error;

use crate::credentials::{DEFAULT_KEY_TTL, DEFAULT_REFRESH_BUFFER, MinterSettings};
use crate::dispatch::{DispatcherSettings, LaunchProfile};
use crate::github::DEFAULT_API_URL;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_AWS_CLI: &str = "aws";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub github_app_id: String,
    pub private_key_parameter: String,
    pub webhook_secret_parameter: String,
    pub github_api_url: String,
    pub launch_profile: LaunchProfile,
    pub key_ttl: Duration,
    pub token_refresh_buffer: Duration,
    pub aws_cli: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from any variable source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &'static str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let listen_addr = get("WORKERS_LISTEN_ADDR")
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                name: "WORKERS_LISTEN_ADDR",
                reason: e.to_string(),
            })?;

        let assign_public_ip = match get("WORKERS_ASSIGN_PUBLIC_IP") {
            None => false,
            Some(v) => parse_bool(&v).ok_or_else(|| ConfigError::Invalid {
                name: "WORKERS_ASSIGN_PUBLIC_IP",
                reason: format!("expected true or false, got '{}'", v),
            })?,
        };

        Ok(Config {
            listen_addr,
            github_app_id: required("WORKERS_GITHUB_APP_ID")?,
            private_key_parameter: required("WORKERS_PRIVATE_KEY_PARAMETER")?,
            webhook_secret_parameter: required("WORKERS_WEBHOOK_SECRET_PARAMETER")?,
            github_api_url: get("WORKERS_GITHUB_API_URL")
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            launch_profile: LaunchProfile {
                cluster: required("WORKERS_CLUSTER")?,
                task_definition: required("WORKERS_TASK_DEFINITION")?,
                container_name: required("WORKERS_CONTAINER_NAME")?,
                subnets: split_list(&required("WORKERS_SUBNETS")?),
                security_groups: split_list(&get("WORKERS_SECURITY_GROUPS").unwrap_or_default()),
                assign_public_ip,
            },
            key_ttl: seconds(get("WORKERS_KEY_TTL_SECS"), "WORKERS_KEY_TTL_SECS", DEFAULT_KEY_TTL)?,
            token_refresh_buffer: seconds(
                get("WORKERS_TOKEN_REFRESH_BUFFER_SECS"),
                "WORKERS_TOKEN_REFRESH_BUFFER_SECS",
                DEFAULT_REFRESH_BUFFER,
            )?,
            aws_cli: get("WORKERS_AWS_CLI").unwrap_or_else(|| DEFAULT_AWS_CLI.to_string()),
        })
    }

    pub fn minter_settings(&self) -> MinterSettings {
        MinterSettings {
            key_ttl: self.key_ttl,
            refresh_buffer: self.token_refresh_buffer,
            ..MinterSettings::new(&self.github_app_id, &self.private_key_parameter)
        }
    }

    pub fn dispatcher_settings(&self) -> DispatcherSettings {
        DispatcherSettings {
            secret_ttl: self.key_ttl,
            ..DispatcherSettings::new(&self.webhook_secret_parameter, self.launch_profile.clone())
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn seconds(
    value: Option<String>,
    name: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let Some(value) = value else {
        return Ok(default);
    };
    value
        .trim()
        .parse::<u32>()
        .map(|secs| Duration::seconds(i64::from(secs)))
        .map_err(|e| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        })
}
