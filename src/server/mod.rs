//! HTTP host for the dispatcher.
//!
//! # Endpoints
//!
//! - `POST /webhook` - A direct GitHub delivery (raw body plus headers)
//! - `POST /events` - A relayed envelope (`{rawBodyB64, headers}`)
//! - `GET /api/v1/subscriptions` - Events each enabled worker listens to
//! - `GET /health` - Returns 200 if the server is running
//!
//! One dispatcher serves every request. It sits behind a mutex, so deliveries
//! are handled one at a time and share its caches.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;

pub mod health;
pub mod subscriptions;
pub mod webhook;

pub use health::health_handler;
pub use subscriptions::subscriptions_handler;
pub use webhook::{events_handler, webhook_handler};

use crate::credentials::{Clock, SecretStore};
use crate::dispatch::{Dispatcher, InvocationError, MessageOutcome, TaskLauncher};
use crate::github::GitHubAppApi;
use crate::workers::WorkerManifest;

/// What the HTTP layer needs from a dispatcher.
pub trait DeliveryHandler: Send + 'static {
    fn handle_delivery(
        &mut self,
        body: &[u8],
        headers: &BTreeMap<String, String>,
    ) -> impl Future<Output = Result<MessageOutcome, InvocationError>> + Send;

    fn handle_envelope(
        &mut self,
        raw: &str,
    ) -> impl Future<Output = Result<MessageOutcome, InvocationError>> + Send;

    fn manifest(&mut self) -> Result<Option<Arc<WorkerManifest>>, InvocationError>;
}

impl<S, G, C, L> DeliveryHandler for Dispatcher<S, G, C, L>
where
    S: SecretStore + Send + Sync + 'static,
    G: GitHubAppApi + Send + Sync + 'static,
    C: Clock + 'static,
    L: TaskLauncher + Send + Sync + 'static,
{
    async fn handle_delivery(
        &mut self,
        body: &[u8],
        headers: &BTreeMap<String, String>,
    ) -> Result<MessageOutcome, InvocationError> {
        Dispatcher::handle_delivery(self, body, headers).await
    }

    async fn handle_envelope(&mut self, raw: &str) -> Result<MessageOutcome, InvocationError> {
        Dispatcher::handle_envelope(self, raw).await
    }

    fn manifest(&mut self) -> Result<Option<Arc<WorkerManifest>>, InvocationError> {
        Dispatcher::manifest(self)
    }
}

/// Shared application state.
pub struct AppState<D> {
    dispatcher: Arc<Mutex<D>>,
}

impl<D> Clone for AppState<D> {
    fn clone(&self) -> Self {
        AppState {
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }
}

impl<D: DeliveryHandler> AppState<D> {
    pub fn new(dispatcher: D) -> Self {
        AppState {
            dispatcher: Arc::new(Mutex::new(dispatcher)),
        }
    }

    pub fn dispatcher(&self) -> &Mutex<D> {
        &self.dispatcher
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router<D: DeliveryHandler>(app_state: AppState<D>) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/webhook", post(webhook_handler::<D>))
        .route("/events", post(events_handler::<D>))
        .route("/api/v1/subscriptions", get(subscriptions_handler::<D>))
        .route("/health", get(health_handler))
        .with_state(app_state)
}
