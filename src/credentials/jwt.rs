//! GitHub App JWTs.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::CredentialError;

/// Backdating covers clock drift between us and GitHub.
pub const ISSUED_AT_SKEW: Duration = Duration::seconds(60);
/// GitHub rejects app JWTs that live longer than ten minutes.
pub const LIFETIME: Duration = Duration::minutes(9);

#[derive(Debug, Serialize, Deserialize)]
pub struct AppClaims {
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

impl AppClaims {
    pub fn new(app_id: &str, now: DateTime<Utc>) -> Self {
        AppClaims {
            iat: (now - ISSUED_AT_SKEW).timestamp(),
            exp: (now + LIFETIME).timestamp(),
            iss: app_id.to_string(),
        }
    }
}

/// Signs an RS256 app JWT with the PEM private key.
pub fn sign_app_jwt(
    app_id: &str,
    private_key_pem: &SecretString,
    now: DateTime<Utc>,
) -> Result<SecretString, CredentialError> {
    let key = EncodingKey::from_rsa_pem(private_key_pem.expose_secret().as_bytes())
        .map_err(|e| CredentialError::Key(e.to_string()))?;
    let claims = AppClaims::new(app_id, now);
    let jwt = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
        .map_err(|e| CredentialError::Key(e.to_string()))?;
    Ok(SecretString::from(jwt))
}
