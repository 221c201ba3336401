//! Secret store port.

use std::future::Future;

use secrecy::SecretString;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("secret store read of '{name}' failed: {message}")]
pub struct SecretStoreError {
    pub name: String,
    pub message: String,
}

impl SecretStoreError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        SecretStoreError {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Reads decrypted secrets by name.
///
/// An empty value is returned as-is; callers decide whether that is an error.
pub trait SecretStore {
    fn get_secret(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<SecretString, SecretStoreError>> + Send;
}
