//! Backoff for the app-authentication calls.
//!
//! These calls run inside a delivery, and the transport redelivers a failed
//! delivery anyway, so the default budget is small: two retries, 250ms then
//! 500ms. Permanent errors are returned on the first attempt.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use super::error::GitHubApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Attempts after the first one.
    pub retries: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Backoff {
    pub const DELIVERY: Self = Self {
        retries: 2,
        base: Duration::from_millis(250),
        cap: Duration::from_secs(1),
    };

    /// Delay before retry number `retry` (0-based): `base * 2^retry`, capped.
    pub fn delay(&self, retry: u32) -> Duration {
        self.base
            .checked_mul(1u32.checked_shl(retry).unwrap_or(u32::MAX))
            .map_or(self.cap, |d| d.min(self.cap))
    }

    /// Worst-case time spent sleeping.
    pub fn budget(&self) -> Duration {
        (0..self.retries).map(|r| self.delay(r)).sum()
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::DELIVERY
    }
}

/// Runs `call` until it succeeds, fails permanently, or the retries run out.
pub async fn with_backoff<T, F, Fut>(
    backoff: Backoff,
    operation: &str,
    mut call: F,
) -> Result<T, GitHubApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GitHubApiError>>,
{
    let mut retry = 0;
    loop {
        let err = match call().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !err.kind.is_retriable() {
            return Err(err);
        }
        if retry >= backoff.retries {
            warn!(operation, attempts = retry + 1, error = %err, "GitHub call kept failing");
            return Err(err);
        }
        let delay = backoff.delay(retry);
        debug!(operation, retry, delay_ms = delay.as_millis() as u64, error = %err, "Retrying GitHub call");
        tokio::time::sleep(delay).await;
        retry += 1;
    }
}
