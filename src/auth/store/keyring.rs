//! Keyring-based token storage.

#[cfg(feature = "system-keyring")]
use async_trait::async_trait;
#[cfg(feature = "system-keyring")]
use tracing::instrument;

#[cfg(feature = "system-keyring")]
use super::TokenStorage;
#[cfg(feature = "system-keyring")]
use crate::error::{AuthError, Result};

/// Keyring-based token storage.
///
/// Uses the system's native credential store (Keychain, Secret Service,
/// Windows Credential Manager). One entry per key under a shared service
/// name.
///
/// Feature-gated behind `system-keyring`.
#[cfg(feature = "system-keyring")]
#[derive(Debug, Clone)]
pub struct KeyringTokenStorage {
    service: String,
}

#[cfg(feature = "system-keyring")]
impl Default for KeyringTokenStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "system-keyring")]
impl KeyringTokenStorage {
    /// Default service name for keyring entries.
    const SERVICE_NAME: &'static str = "dealboard";

    pub fn new() -> Self {
        Self::with_service(Self::SERVICE_NAME)
    }

    /// Create a KeyringTokenStorage with a custom service name.
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, key)
            .map_err(|e| AuthError::storage(format!("Failed to create keyring entry: {}", e)))
    }
}

#[cfg(feature = "system-keyring")]
#[async_trait]
impl TokenStorage for KeyringTokenStorage {
    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(AuthError::storage(format!("Keyring error: {}", e))),
        }
    }

    #[instrument(skip(self, secret))]
    async fn save(&self, key: &str, secret: &str) -> Result<()> {
        self.entry(key)?
            .set_password(secret)
            .map_err(|e| AuthError::storage(format!("Keyring error: {}", e)))
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(AuthError::storage(format!("Keyring error: {}", e))),
        }
    }

    fn name(&self) -> &str {
        "keyring"
    }
}

#[cfg(all(test, feature = "system-keyring"))]
mod tests {
    use super::*;

    #[test]
    fn test_service_name() {
        assert_eq!(KeyringTokenStorage::new().service(), "dealboard");
        assert_eq!(
            KeyringTokenStorage::with_service("dealboard-staging").service(),
            "dealboard-staging"
        );
    }

    #[test]
    fn test_backend_name() {
        assert_eq!(KeyringTokenStorage::new().name(), "keyring");
    }
}
