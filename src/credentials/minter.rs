//! Installation token minting with two-tier caching.

use chrono::Duration;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use super::cache::{
    DEFAULT_KEY_TTL, DEFAULT_REFRESH_BUFFER, InstallationToken, SecretCache, TokenCache,
};
use super::clock::Clock;
use super::jwt::sign_app_jwt;
use super::store::SecretStore;
use super::{CredentialError, Result};
use crate::github::GitHubAppApi;
use crate::types::{InstallationId, RepoId};

#[derive(Debug, Clone)]
pub struct MinterSettings {
    pub app_id: String,
    /// Secret store name of the app's PEM private key.
    pub private_key_parameter: String,
    pub key_ttl: Duration,
    pub refresh_buffer: Duration,
}

impl MinterSettings {
    pub fn new(app_id: impl Into<String>, private_key_parameter: impl Into<String>) -> Self {
        MinterSettings {
            app_id: app_id.into(),
            private_key_parameter: private_key_parameter.into(),
            key_ttl: DEFAULT_KEY_TTL,
            refresh_buffer: DEFAULT_REFRESH_BUFFER,
        }
    }
}

/// Mints installation tokens for one execution context.
pub struct CredentialMinter<S, G, C> {
    settings: MinterSettings,
    store: S,
    github: G,
    clock: C,
    keys: SecretCache,
    tokens: TokenCache,
}

impl<S, G, C> CredentialMinter<S, G, C>
where
    S: SecretStore + Send + Sync,
    G: GitHubAppApi + Send + Sync,
    C: Clock,
{
    pub fn new(settings: MinterSettings, store: S, github: G, clock: C) -> Result<Self> {
        if settings.app_id.trim().is_empty() {
            return Err(CredentialError::InvalidInput {
                field: "app_id",
                reason: "must not be empty".to_string(),
            });
        }
        if settings.private_key_parameter.trim().is_empty() {
            return Err(CredentialError::InvalidInput {
                field: "private_key_parameter",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(CredentialMinter {
            keys: SecretCache::new(settings.key_ttl),
            tokens: TokenCache::new(settings.refresh_buffer),
            settings,
            store,
            github,
            clock,
        })
    }

    /// Returns a token for the installation, exchanging a fresh app JWT only
    /// when the cached one is missing or about to expire.
    pub async fn mint_installation_token(&mut self, installation_id: u64) -> Result<SecretString> {
        let installation =
            InstallationId::new(installation_id).ok_or(CredentialError::InvalidInput {
                field: "installation_id",
                reason: "must be a positive integer".to_string(),
            })?;

        if let Some(cached) = self.tokens.get(installation, self.clock.now()) {
            debug!(installation_id = %installation, "Installation token cache hit");
            return Ok(cached.token.clone());
        }

        let jwt = self.app_jwt().await?;
        let issued = self
            .github
            .create_installation_token(&jwt, installation)
            .await
            .map_err(CredentialError::UpstreamAuth)?;

        info!(
            installation_id = %installation,
            expires_at = %issued.expires_at,
            "Minted installation token"
        );
        self.tokens.insert(
            installation,
            InstallationToken {
                token: issued.token.clone(),
                expires_at: issued.expires_at,
            },
        );
        Ok(issued.token)
    }

    /// Looks up the app's installation on a repository.
    pub async fn installation_for_repository(&mut self, repo: &RepoId) -> Result<InstallationId> {
        let jwt = self.app_jwt().await?;
        let installation = self
            .github
            .repository_installation(&jwt, repo)
            .await
            .map_err(CredentialError::UpstreamAuth)?;
        debug!(repo = %repo, installation_id = %installation, "Resolved repository installation");
        Ok(installation)
    }

    async fn app_jwt(&mut self) -> Result<SecretString> {
        let key = self.signing_key().await?;
        sign_app_jwt(&self.settings.app_id, &key, self.clock.now())
    }

    async fn signing_key(&mut self) -> Result<SecretString> {
        let now = self.clock.now();
        if let Some(key) = self.keys.get(now) {
            return Ok(key.clone());
        }

        let parameter = &self.settings.private_key_parameter;
        let key = self.store.get_secret(parameter).await?;
        if key.expose_secret().trim().is_empty() {
            return Err(CredentialError::SecretUnavailable {
                parameter: parameter.clone(),
            });
        }
        debug!(parameter = %parameter, "Loaded app signing key");
        self.keys.store(key.clone(), now);
        Ok(key)
    }
}

impl<S, G, C> std::fmt::Debug for CredentialMinter<S, G, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialMinter")
            .field("app_id", &self.settings.app_id)
            .finish_non_exhaustive()
    }
}
