//! The per-delivery state machine.
//!
//! ```text
//! envelope ─▶ headers ─(missing)─▶ Skipped
//!               │
//!           signature ─▶ payload ─▶ manifest ─(none)─▶ NoManifest
//!                                      │
//!                                    route ─▶ token ─▶ per worker: env ─▶ launch
//! ```
//!
//! Everything up to the token is invocation-level: a failure returns an
//! [`InvocationError`] so the transport can redeliver. Launch failures are
//! recorded per worker and never stop the remaining workers.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Duration;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use super::InvocationError;
use super::environment::build_task_environment;
use super::launcher::{LaunchError, LaunchProfile, TaskLauncher, dispatch_task};
use crate::credentials::{
    Clock, CredentialError, CredentialMinter, DEFAULT_KEY_TTL, SecretCache, SecretStore,
};
use crate::github::GitHubAppApi;
use crate::manifest::ManifestCache;
use crate::routing::{EventContext, route};
use crate::types::{DeliveryId, InstallationId};
use crate::webhooks::{WebhookPayload, parse_envelope, require_headers, verify_signature};
use crate::workers::WorkerManifest;

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// Secret store name of the shared webhook secret.
    pub webhook_secret_parameter: String,
    pub launch_profile: LaunchProfile,
    pub secret_ttl: Duration,
}

impl DispatcherSettings {
    pub fn new(webhook_secret_parameter: impl Into<String>, launch_profile: LaunchProfile) -> Self {
        DispatcherSettings {
            webhook_secret_parameter: webhook_secret_parameter.into(),
            launch_profile,
            secret_ttl: DEFAULT_KEY_TTL,
        }
    }
}

/// How one worker's launch went.
#[derive(Debug)]
pub struct WorkerResult {
    pub worker_id: String,
    pub result: Result<String, LaunchError>,
}

impl WorkerResult {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Pings and other deliveries without the signature, event or delivery
    /// header.
    MissingHeaders,
}

/// The terminal state of one delivery that did not fail outright.
#[derive(Debug)]
pub enum MessageOutcome {
    Skipped(SkipReason),

    /// No manifest is deployed, so nothing can match.
    NoManifest { delivery_id: DeliveryId },

    /// Routing ran; `results` is empty when no worker matched.
    Dispatched {
        delivery_id: DeliveryId,
        event: String,
        results: Vec<WorkerResult>,
    },
}

impl MessageOutcome {
    pub fn results(&self) -> &[WorkerResult] {
        match self {
            MessageOutcome::Dispatched { results, .. } => results,
            _ => &[],
        }
    }

    pub fn failed_workers(&self) -> usize {
        self.results().iter().filter(|r| !r.is_success()).count()
    }
}

/// One execution context: caches, ports and the deployed manifest.
///
/// Methods take `&mut self`; hosts that share a dispatcher wrap it in a lock.
pub struct Dispatcher<S, G, C, L> {
    settings: DispatcherSettings,
    secrets: S,
    clock: C,
    minter: CredentialMinter<S, G, C>,
    launcher: L,
    webhook_secret: SecretCache,
    manifests: ManifestCache,
    manifest_values: BTreeMap<String, String>,
}

impl<S, G, C, L> Dispatcher<S, G, C, L>
where
    S: SecretStore + Send + Sync,
    G: GitHubAppApi + Send + Sync,
    C: Clock,
    L: TaskLauncher + Send + Sync,
{
    /// `secrets` and `clock` should be the same ones the minter was built on.
    pub fn new(
        settings: DispatcherSettings,
        secrets: S,
        clock: C,
        minter: CredentialMinter<S, G, C>,
        launcher: L,
        manifest_values: BTreeMap<String, String>,
    ) -> Self {
        Dispatcher {
            webhook_secret: SecretCache::new(settings.secret_ttl),
            settings,
            secrets,
            clock,
            minter,
            launcher,
            manifests: ManifestCache::new(),
            manifest_values,
        }
    }

    /// Swaps in newly deployed manifest values. The cache notices a changed
    /// checksum on the next delivery.
    pub fn set_manifest_values(&mut self, values: BTreeMap<String, String>) {
        self.manifest_values = values;
    }

    /// The currently deployed manifest, if any.
    pub fn manifest(&mut self) -> Result<Option<Arc<WorkerManifest>>, InvocationError> {
        Ok(self.manifests.resolve(&self.manifest_values)?)
    }

    /// Handles one relayed envelope.
    pub async fn handle_envelope(&mut self, raw: &str) -> Result<MessageOutcome, InvocationError> {
        let envelope = parse_envelope(raw).inspect_err(|e| warn!(error = %e, "Rejected envelope"))?;
        let body = envelope.raw_body()?;
        self.handle_delivery(&body, &envelope.headers).await
    }

    /// Handles one delivery given its raw body and headers.
    pub async fn handle_delivery(
        &mut self,
        body: &[u8],
        headers: &BTreeMap<String, String>,
    ) -> Result<MessageOutcome, InvocationError> {
        let Some(required) = require_headers(headers) else {
            info!("Skipping delivery without GitHub headers");
            return Ok(MessageOutcome::Skipped(SkipReason::MissingHeaders));
        };
        let delivery_id = required.delivery_id;
        let event = required.event;
        debug!(delivery_id = %delivery_id, event = %event, "Received delivery");

        let secret = self.webhook_secret().await?;
        verify_signature(body, &required.signature, secret.expose_secret().as_bytes())
            .inspect_err(|e| warn!(delivery_id = %delivery_id, error = %e, "Rejected signature"))?;

        let payload = WebhookPayload::parse(body)
            .inspect_err(|e| warn!(delivery_id = %delivery_id, error = %e, "Rejected payload"))?;

        let Some(manifest) = self.manifest()? else {
            info!(delivery_id = %delivery_id, "No worker manifest deployed");
            return Ok(MessageOutcome::NoManifest { delivery_id });
        };

        let context = EventContext::from_payload(&event, &payload);
        let matched = route(&manifest, &context);
        if matched.is_empty() {
            info!(
                delivery_id = %delivery_id,
                event = %event,
                action = context.action.as_deref().unwrap_or(""),
                "No workers matched"
            );
            return Ok(MessageOutcome::Dispatched {
                delivery_id,
                event,
                results: Vec::new(),
            });
        }
        debug!(delivery_id = %delivery_id, matched = matched.len(), "Routed delivery");

        let installation = self.installation(&payload).await?;
        let token = self
            .minter
            .mint_installation_token(installation.0)
            .await?;

        let mut results = Vec::with_capacity(matched.len());
        for worker in matched {
            let environment =
                build_task_environment(&event, &delivery_id, &payload, worker, token.clone());
            let result = dispatch_task(
                &self.launcher,
                &self.settings.launch_profile,
                &environment,
            )
            .await;

            match &result {
                Ok(task_arn) => info!(
                    delivery_id = %delivery_id,
                    worker_id = %worker.id(),
                    task_arn = %task_arn,
                    "Dispatched worker"
                ),
                Err(e) => warn!(
                    delivery_id = %delivery_id,
                    worker_id = %worker.id(),
                    error = %e,
                    "Worker dispatch failed"
                ),
            }
            results.push(WorkerResult {
                worker_id: worker.id().to_string(),
                result,
            });
        }

        Ok(MessageOutcome::Dispatched {
            delivery_id,
            event,
            results,
        })
    }

    async fn installation(
        &mut self,
        payload: &WebhookPayload,
    ) -> Result<InstallationId, InvocationError> {
        if let Some(id) = payload.installation_id.and_then(InstallationId::new) {
            return Ok(id);
        }
        match &payload.repository {
            Some(repo) => Ok(self.minter.installation_for_repository(repo).await?),
            None => Err(InvocationError::MissingInstallation),
        }
    }

    async fn webhook_secret(&mut self) -> Result<SecretString, CredentialError> {
        let now = self.clock.now();
        if let Some(secret) = self.webhook_secret.get(now) {
            return Ok(secret.clone());
        }

        let parameter = &self.settings.webhook_secret_parameter;
        let secret = self.secrets.get_secret(parameter).await?;
        if secret.expose_secret().trim().is_empty() {
            return Err(CredentialError::SecretUnavailable {
                parameter: parameter.clone(),
            });
        }
        self.webhook_secret.store(secret.clone(), now);
        Ok(secret)
    }
}
