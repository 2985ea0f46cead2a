//! Secure persistence for the access/refresh token pair.
//!
//! [`TokenStorage`] is the backend contract (memory, file, system keyring).
//! [`TokenStore`] wraps a backend and is what the rest of the crate uses:
//! its reads never fail, and it owns the "delete both tokens together"
//! discipline.

pub mod file;
pub mod keyring;
pub mod memory;

pub use file::FileTokenStorage;
pub use memory::MemoryTokenStorage;

#[cfg(feature = "system-keyring")]
pub use keyring::KeyringTokenStorage;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::{StorageBackend, StorageConfig};
use crate::error::Result;

/// Storage key for the access token.
pub const TOKEN_KEY: &str = "dealboard_access_token";

/// Storage key for the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "dealboard_refresh_token";

/// Trait for token storage backends.
///
/// Backends report failures; the [`TokenStore`] facade decides what a
/// failure means for callers.
#[async_trait]
pub trait TokenStorage: Send + Sync {
    /// Read the secret stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `secret` under `key`, replacing any previous value.
    async fn save(&self, key: &str, secret: &str) -> Result<()>;

    /// Remove the secret stored under `key`. Removing a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Name of this storage backend.
    fn name(&self) -> &str {
        "unknown"
    }
}

/// Blanket impl for `Arc<T>`.
#[async_trait]
impl<T: TokenStorage + ?Sized> TokenStorage for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key).await
    }
    async fn save(&self, key: &str, secret: &str) -> Result<()> {
        (**self).save(key, secret).await
    }
    async fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key).await
    }
    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Blanket impl for `Box<T>`.
#[async_trait]
impl<T: TokenStorage + ?Sized> TokenStorage for Box<T> {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key).await
    }
    async fn save(&self, key: &str, secret: &str) -> Result<()> {
        (**self).save(key, secret).await
    }
    async fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key).await
    }
    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Owner of the persisted credentials.
///
/// Cheap to clone; clones share the backend.
#[derive(Clone)]
pub struct TokenStore {
    backend: Arc<dyn TokenStorage>,
}

impl TokenStore {
    /// Wrap a storage backend.
    pub fn new(backend: impl TokenStorage + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// A store backed by process memory.
    pub fn in_memory() -> Self {
        Self::new(MemoryTokenStorage::new())
    }

    /// Build the backend selected by the `[storage]` section.
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        match config.backend {
            StorageBackend::Memory => Ok(Self::in_memory()),
            StorageBackend::File => Ok(Self::new(FileTokenStorage::new(&config.dir))),
            #[cfg(feature = "system-keyring")]
            StorageBackend::Keyring => Ok(Self::new(KeyringTokenStorage::with_service(
                config.service.clone(),
            ))),
            #[cfg(not(feature = "system-keyring"))]
            StorageBackend::Keyring => Err(crate::error::AuthError::Config(
                "keyring storage requires the `system-keyring` feature".to_string(),
            )),
        }
    }

    /// Name of the underlying backend.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Read a secret. Never fails.
    ///
    /// An unreadable entry is reported as absent and deleted on a best-effort
    /// basis so the next read starts clean. Empty values count as absent.
    pub async fn get(&self, key: &str) -> Option<String> {
        match self.backend.get(key).await {
            Ok(Some(secret)) if !secret.trim().is_empty() => Some(secret),
            Ok(_) => None,
            Err(e) => {
                warn!(key, backend = self.backend.name(), error = %e, "Discarding unreadable token entry");
                if let Err(e) = self.backend.delete(key).await {
                    debug!(key, error = %e, "Failed to delete unreadable token entry");
                }
                None
            }
        }
    }

    pub async fn save(&self, key: &str, secret: &str) -> Result<()> {
        self.backend.save(key, secret).await
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.backend.delete(key).await
    }

    pub async fn access_token(&self) -> Option<String> {
        self.get(TOKEN_KEY).await
    }

    pub async fn refresh_token(&self) -> Option<String> {
        self.get(REFRESH_TOKEN_KEY).await
    }

    /// Persist a freshly issued pair. The access token is written first.
    pub async fn save_pair(&self, access_token: &str, refresh_token: &str) -> Result<()> {
        self.save(TOKEN_KEY, access_token).await?;
        self.save(REFRESH_TOKEN_KEY, refresh_token).await
    }

    /// Delete both tokens. Failures are logged; every key is attempted.
    pub async fn clear(&self) {
        for key in [TOKEN_KEY, REFRESH_TOKEN_KEY] {
            if let Err(e) = self.backend.delete(key).await {
                warn!(key, backend = self.backend.name(), error = %e, "Failed to delete token");
            }
        }
    }
}

impl fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenStore")
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl From<Arc<dyn TokenStorage>> for TokenStore {
    fn from(backend: Arc<dyn TokenStorage>) -> Self {
        Self { backend }
    }
}
