//! The two credential caches.
//!
//! Both are plain owned state: the minter holds them, nothing else touches
//! them, and losing them only costs a reload.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use secrecy::SecretString;

use crate::types::InstallationId;

pub const DEFAULT_KEY_TTL: Duration = Duration::hours(24);
pub const DEFAULT_REFRESH_BUFFER: Duration = Duration::seconds(60);

/// One secret value and when it was loaded.
///
/// Holds the app's PEM signing key for the minter, and the webhook secret for
/// the dispatcher.
#[derive(Debug)]
pub struct SecretCache {
    ttl: Duration,
    entry: Option<(SecretString, DateTime<Utc>)>,
}

impl SecretCache {
    pub fn new(ttl: Duration) -> Self {
        SecretCache { ttl, entry: None }
    }

    /// The cached key, if it was loaded less than `ttl` ago.
    pub fn get(&self, now: DateTime<Utc>) -> Option<&SecretString> {
        self.entry
            .as_ref()
            .filter(|(_, loaded_at)| now - *loaded_at < self.ttl)
            .map(|(key, _)| key)
    }

    pub fn store(&mut self, key: SecretString, now: DateTime<Utc>) {
        self.entry = Some((key, now));
    }
}

/// A minted installation token.
#[derive(Debug, Clone)]
pub struct InstallationToken {
    pub token: SecretString,
    pub expires_at: DateTime<Utc>,
}

impl InstallationToken {
    pub fn is_fresh(&self, now: DateTime<Utc>, refresh_buffer: Duration) -> bool {
        now < self.expires_at - refresh_buffer
    }
}

/// Installation tokens by installation id.
#[derive(Debug)]
pub struct TokenCache {
    refresh_buffer: Duration,
    tokens: HashMap<InstallationId, InstallationToken>,
}

impl TokenCache {
    pub fn new(refresh_buffer: Duration) -> Self {
        TokenCache {
            refresh_buffer,
            tokens: HashMap::new(),
        }
    }

    /// The cached token, unless it is within `refresh_buffer` of expiry.
    pub fn get(&self, installation: InstallationId, now: DateTime<Utc>) -> Option<&InstallationToken> {
        self.tokens
            .get(&installation)
            .filter(|t| t.is_fresh(now, self.refresh_buffer))
    }

    pub fn insert(&mut self, installation: InstallationId, token: InstallationToken) {
        self.tokens.insert(installation, token);
    }
}
