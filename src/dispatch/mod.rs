//! Webhook delivery to launched worker tasks.

pub mod dispatcher;
pub mod environment;
pub mod launcher;

use thiserror::Error;

use crate::credentials::CredentialError;
use crate::manifest::ManifestError;
use crate::webhooks::{EnvelopeError, PayloadError, SignatureError};

pub use dispatcher::{
    Dispatcher, DispatcherSettings, MessageOutcome, SkipReason, WorkerResult,
};
pub use environment::{TaskEnvironment, build_task_environment};
pub use launcher::{
    LaunchError, LaunchFailure, LaunchOutcome, LaunchProfile, TaskLauncher, dispatch_task,
};

/// A delivery that failed as a whole. Hosts surface these so the transport
/// redelivers.
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("invalid envelope: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("invalid signature: {0}")]
    Signature(#[from] SignatureError),

    #[error("invalid payload: {0}")]
    Payload(#[from] PayloadError),

    #[error("worker manifest unusable: {0}")]
    Manifest(#[from] ManifestError),

    #[error("credentials unavailable: {0}")]
    Credentials(#[from] CredentialError),

    #[error("payload names neither an installation nor a repository")]
    MissingInstallation,
}

impl InvocationError {
    /// Whether the request itself was bad, as opposed to this side failing.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            InvocationError::Envelope(_)
                | InvocationError::Signature(_)
                | InvocationError::Payload(_)
        )
    }
}
