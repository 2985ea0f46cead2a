//! In-memory token storage.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::TokenStorage;
use crate::error::Result;

/// In-memory token storage.
///
/// Used by tests and by builds that must not persist credentials between
/// runs (the web build keeps its session in a server cookie).
#[derive(Debug, Default)]
pub struct MemoryTokenStorage {
    secrets: RwLock<HashMap<String, String>>,
}

impl MemoryTokenStorage {
    /// Create a new empty in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.secrets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.secrets.read().await.is_empty()
    }
}

#[async_trait]
impl TokenStorage for MemoryTokenStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.secrets.read().await.get(key).cloned())
    }

    async fn save(&self, key: &str, secret: &str) -> Result<()> {
        self.secrets
            .write()
            .await
            .insert(key.to_string(), secret.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.secrets.write().await.remove(key);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
