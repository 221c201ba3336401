//! GitHub App API access.
//!
//! The credential minter talks to GitHub through the [`GitHubAppApi`] port.
//! [`AppClient`] implements it with octocrab:
//! - Transient failures (5xx, rate limits, network) retry with a short exponential backoff
//! - Everything else surfaces immediately as a permanent [`GitHubApiError`]

mod client;
mod error;
mod retry;

pub use client::{AppClient, DEFAULT_API_URL, GitHubAppApi, IssuedToken};
pub use error::{GitHubApiError, GitHubErrorKind};
pub use retry::{Backoff, with_backoff};
