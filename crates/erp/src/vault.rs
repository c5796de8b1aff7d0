use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;

use hrbridge_core::VaultCredentials;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum VaultError {
    #[error("refresh token is not recognized or has been revoked")]
    NotFound,
    #[error("credential vault unavailable: {0}")]
    Unavailable(String),
}

/// Bridge to the external credential vault. The vault owns token storage,
/// hashing, and revocation; this core only asks it to turn an opaque
/// refresh token back into a login pair when a session must be rebuilt.
#[async_trait]
pub trait CredentialVault: Send + Sync {
    async fn decrypt(&self, refresh_token: &str) -> Result<VaultCredentials, VaultError>;
}

/// Map-backed vault for tests and single-tenant deployments.
#[derive(Default)]
pub struct InMemoryVault {
    entries: Mutex<HashMap<String, (i64, String, String)>>,
}

impl InMemoryVault {
    pub fn insert(
        &self,
        refresh_token: impl Into<String>,
        user_id: i64,
        username: impl Into<String>,
        password: impl Into<String>,
    ) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(refresh_token.into(), (user_id, username.into(), password.into()));
        }
    }

    pub fn revoke(&self, refresh_token: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(refresh_token);
        }
    }
}

#[async_trait]
impl CredentialVault for InMemoryVault {
    async fn decrypt(&self, refresh_token: &str) -> Result<VaultCredentials, VaultError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| VaultError::Unavailable("vault state is poisoned".to_owned()))?;
        let (user_id, username, password) =
            entries.get(refresh_token).cloned().ok_or(VaultError::NotFound)?;
        Ok(VaultCredentials {
            user_id,
            username,
            password: SecretString::from(password),
        })
    }
}
