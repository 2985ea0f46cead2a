//! Access-token refresh.
//!
//! Refreshes are coalesced: callers queue on one async mutex and re-check the
//! stored token after acquiring it, so a burst of requests made with an
//! expired token produces a single `POST /api/auth/refresh`.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::jwt;
use super::store::{REFRESH_TOKEN_KEY, TOKEN_KEY, TokenStore};
use crate::error::RefreshError;
use crate::net::ApiClient;

/// Refresh endpoint path.
pub const REFRESH_PATH: &str = "/api/auth/refresh";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    #[serde(default)]
    access_token: Option<String>,
    /// Present only if the backend rotates refresh tokens.
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Exchanges the stored refresh token for a new access token.
pub struct Refresher {
    api: ApiClient,
    store: TokenStore,
    lock: Mutex<()>,
    completed: AtomicU64,
}

impl Refresher {
    pub fn new(api: ApiClient, store: TokenStore) -> Self {
        Self {
            api,
            store,
            lock: Mutex::new(()),
            completed: AtomicU64::new(0),
        }
    }

    /// Number of successful refreshes performed by this instance.
    pub fn refresh_count(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Return the stored access token if it decodes and has not expired,
    /// refreshing it otherwise.
    pub async fn valid_access_token(&self) -> Result<String, RefreshError> {
        if let Some(token) = self.usable_stored_token().await {
            return Ok(token);
        }

        let _guard = self.lock.lock().await;

        // Double-check: another task may have refreshed while we waited for the lock
        if let Some(token) = self.usable_stored_token().await {
            debug!("Access token refreshed by a concurrent caller");
            return Ok(token);
        }

        self.refresh_locked().await
    }

    /// Unconditionally refresh and persist the access token.
    pub async fn refresh(&self) -> Result<String, RefreshError> {
        let _guard = self.lock.lock().await;
        self.refresh_locked().await
    }

    async fn usable_stored_token(&self) -> Option<String> {
        let token = self.store.access_token().await?;
        jwt::decode_unexpired(&token).map(|_| token)
    }

    async fn refresh_locked(&self) -> Result<String, RefreshError> {
        let refresh_token = self
            .store
            .refresh_token()
            .await
            .ok_or(RefreshError::MissingRefreshToken)?;

        info!("Refreshing access token...");

        let response = self
            .api
            .post(REFRESH_PATH)
            .map_err(|e| RefreshError::Transport(e.to_string()))?
            .json(&serde_json::json!({ "refreshToken": refresh_token }))
            .send()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            warn!(status, "Refresh token rejected");
            return Err(RefreshError::Rejected { status });
        }

        let data: RefreshResponse = response
            .json()
            .await
            .map_err(|e| RefreshError::InvalidResponse(e.to_string()))?;

        let access_token = data
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                RefreshError::InvalidResponse("Response does not contain accessToken".into())
            })?;
        jwt::decode(&access_token).map_err(|e| RefreshError::InvalidResponse(e.to_string()))?;

        if let Err(e) = self.store.save(TOKEN_KEY, &access_token).await {
            warn!("Failed to persist token: {}", e);
        }
        if let Some(rotated) = data.refresh_token.filter(|t| !t.is_empty()) {
            if let Err(e) = self.store.save(REFRESH_TOKEN_KEY, &rotated).await {
                warn!("Failed to persist rotated refresh token: {}", e);
            }
        }

        self.completed.fetch_add(1, Ordering::Relaxed);
        debug!("Access token refreshed");
        Ok(access_token)
    }
}

impl std::fmt::Debug for Refresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Refresher")
            .field("base_url", &self.api.base_url().as_str())
            .field("store", &self.store)
            .field("refresh_count", &self.refresh_count())
            .finish()
    }
}
