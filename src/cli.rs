//! Operator subcommands that run outside the server.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use crate::manifest::{self, ManifestError};
use crate::routing::{Subscription, collect_subscriptions};
use crate::stack::{DeployReport, StackClient, StackDeployError, StackDeployer, StackSpec};
use crate::workers::{LoadError, load_dir};

/// Capabilities the worker stack template needs.
pub const DEFAULT_CAPABILITIES: &[&str] = &["CAPABILITY_IAM", "CAPABILITY_NAMED_IAM"];

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("failed to read template {path}: {source}")]
    Template {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid parameter '{0}', expected KEY=VALUE")]
    InvalidParameter(String),

    #[error("parameter {0} is reserved for the worker manifest")]
    ReservedParameter(String),

    #[error(transparent)]
    Deploy(#[from] StackDeployError),
}

/// Parses a `KEY=VALUE` flag. The value may itself contain `=`.
pub fn parse_parameter(raw: &str) -> Result<(String, String), CliError> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(CliError::InvalidParameter(raw.to_string())),
    }
}

/// Loads and encodes a workers directory into transport values.
pub fn manifest_values(dir: &Path) -> Result<BTreeMap<String, String>, CliError> {
    let manifest = load_dir(dir)?;
    let encoded = manifest::encode(&manifest)?;
    info!(
        workers = manifest.len(),
        chunks = encoded.chunk_count(),
        checksum = %encoded.checksum(),
        "Encoded worker manifest"
    );
    Ok(encoded.into_values())
}

pub fn subscriptions(dir: &Path) -> Result<Vec<Subscription>, CliError> {
    Ok(collect_subscriptions(&load_dir(dir)?))
}

/// Builds the stack request: manifest values plus operator parameters.
///
/// Operator parameters may not shadow a manifest key.
pub fn deploy_spec(
    stack_name: &str,
    template_body: String,
    manifest_values: BTreeMap<String, String>,
    parameters: Vec<(String, String)>,
) -> Result<StackSpec, CliError> {
    if let Some((key, _)) = parameters
        .iter()
        .find(|(key, _)| key.starts_with(manifest::KEY_PREFIX))
    {
        return Err(CliError::ReservedParameter(key.clone()));
    }

    let spec = DEFAULT_CAPABILITIES.iter().fold(
        StackSpec::new(stack_name, template_body)
            .parameters(manifest_values)
            .parameters(parameters)
            .tag("managed-by", "webhook-workers"),
        |spec, capability| spec.capability(*capability),
    );
    Ok(spec)
}

/// Runs the `deploy` subcommand against any stack client.
pub async fn deploy<C: StackClient + Sync>(
    client: C,
    stack_name: &str,
    template: &Path,
    workers_dir: &Path,
    parameters: Vec<(String, String)>,
    timeout: Duration,
) -> Result<DeployReport, CliError> {
    let template_body =
        std::fs::read_to_string(template).map_err(|source| CliError::Template {
            path: template.to_path_buf(),
            source,
        })?;
    let values = manifest_values(workers_dir)?;
    let spec = deploy_spec(stack_name, template_body, values, parameters)?;

    let report = StackDeployer::new(client).deploy(&spec, timeout).await?;
    info!(
        stack = %stack_name,
        action = report.state.last_action.map_or("none", |a| a.as_str()),
        status = %report.provider_status,
        "Deploy finished"
    );
    Ok(report)
}
