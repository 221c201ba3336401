//! GitHub App credential minting.
//!
//! A [`CredentialMinter`] turns an installation id into a short-lived
//! installation access token:
//!
//! ```text
//! installation id ─▶ token cache ─(miss)─▶ signing key cache ─(miss)─▶ SecretStore
//!                                                 │
//!                                           RS256 app JWT
//!                                                 │
//!                                 POST /app/installations/{id}/access_tokens
//! ```
//!
//! Both caches belong to one minter and are never shared, so they need no
//! locking.

pub mod cache;
pub mod clock;
pub mod jwt;
pub mod minter;
pub mod store;

use thiserror::Error;

use crate::github::GitHubApiError;

pub use cache::{DEFAULT_KEY_TTL, DEFAULT_REFRESH_BUFFER, InstallationToken, SecretCache};
pub use clock::{Clock, SystemClock};
pub use minter::{CredentialMinter, MinterSettings};
pub use store::{SecretStore, SecretStoreError};

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    #[error("secret '{parameter}' is empty")]
    SecretUnavailable { parameter: String },

    #[error(transparent)]
    SecretStore(#[from] SecretStoreError),

    #[error("app signing key unusable: {0}")]
    Key(String),

    #[error("GitHub rejected app authentication: {0}")]
    UpstreamAuth(#[source] GitHubApiError),
}

pub type Result<T> = std::result::Result<T, CredentialError>;
