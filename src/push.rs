//! Best-effort push-token registration.
//!
//! The registrar listens for [`SessionEvent::SignedIn`] and posts the
//! device's push token to the backend. Failures never touch the session:
//! they are retried with exponential backoff, then counted and logged.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::auth::fetch::FetchOptions;
use crate::auth::transport::SessionTransport;
use crate::config::PushConfig;
use crate::error::{AuthError, Result};
use crate::net::api_error;
use crate::session::SessionEvent;

/// Push token registration endpoint.
pub const PUSH_TOKEN_PATH: &str = "/api/users/register-push-token";

// MARK: - Constants

const DEFAULT_MAX_RETRIES: u32 = 3;

const DEFAULT_INITIAL_BACKOFF_MS: u64 = 500;

const DEFAULT_MAX_BACKOFF_MS: u64 = 10_000;

const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

// MARK: - Retry Policy

/// Exponential backoff for registration attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_backoff(mut self, duration: Duration) -> Self {
        self.initial_backoff_ms = duration.as_millis() as u64;
        self
    }

    pub fn with_max_backoff(mut self, duration: Duration) -> Self {
        self.max_backoff_ms = duration.as_millis() as u64;
        self
    }

    /// Backoff before retry number `attempt` (0-based).
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let backoff_ms = (self.initial_backoff_ms as f64
            * self.backoff_multiplier.powi(attempt as i32))
        .min(self.max_backoff_ms as f64) as u64;

        Duration::from_millis(backoff_ms)
    }

    /// Whether a failure after `attempt` retries is worth another try.
    ///
    /// Missing credentials are final; network errors and 5xx/408/429 are not.
    pub fn should_retry(&self, error: &AuthError, attempt: u32) -> bool {
        attempt < self.max_retries && error.is_transient()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&PushConfig> for RetryPolicy {
    fn from(config: &PushConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff_ms: config.initial_backoff_ms,
            max_backoff_ms: config.max_backoff_ms,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

// MARK: - Token Source

/// Where the device push token comes from (the platform's notification
/// service).
#[async_trait]
pub trait PushTokenSource: Send + Sync {
    /// The device token, or `None` when notifications are unavailable.
    async fn device_token(&self) -> Option<String>;
}

/// A fixed token.
#[derive(Debug, Clone)]
pub struct StaticPushToken(pub String);

#[async_trait]
impl PushTokenSource for StaticPushToken {
    async fn device_token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

// MARK: - Metrics

/// Registration counters.
#[derive(Debug, Default)]
pub struct PushMetrics {
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
}

/// Point-in-time copy of [`PushMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushMetricsSnapshot {
    /// Requests sent, retries included.
    pub attempts: u64,
    pub successes: u64,
    /// Registrations abandoned after the last retry.
    pub failures: u64,
}

impl PushMetrics {
    pub fn snapshot(&self) -> PushMetricsSnapshot {
        PushMetricsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

// MARK: - Registrar

/// Registers the device push token after every sign-in.
pub struct PushRegistrar {
    transport: Arc<dyn SessionTransport>,
    source: Arc<dyn PushTokenSource>,
    policy: RetryPolicy,
    metrics: Arc<PushMetrics>,
}

impl PushRegistrar {
    pub fn new(
        transport: Arc<dyn SessionTransport>,
        source: Arc<dyn PushTokenSource>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            source,
            policy,
            metrics: Arc::new(PushMetrics::default()),
        }
    }

    pub fn metrics(&self) -> &Arc<PushMetrics> {
        &self.metrics
    }

    /// Register the current device token, retrying transient failures.
    ///
    /// Returns `Ok` without a request when the source has no token.
    pub async fn register(&self) -> Result<()> {
        let Some(token) = self.source.device_token().await else {
            debug!("No push token available; skipping registration");
            return Ok(());
        };

        let mut attempt = 0;
        loop {
            self.metrics.attempts.fetch_add(1, Ordering::Relaxed);
            match self.send(&token).await {
                Ok(()) => {
                    self.metrics.successes.fetch_add(1, Ordering::Relaxed);
                    if attempt > 0 {
                        debug!(attempt, "Push token registered after retry");
                    } else {
                        info!("Push token registered");
                    }
                    return Ok(());
                }
                Err(e) if self.policy.should_retry(&e, attempt) => {
                    let backoff = self.policy.calculate_backoff(attempt);
                    warn!(
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Push token registration failed, retrying after backoff"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    self.metrics.failures.fetch_add(1, Ordering::Relaxed);
                    warn!(attempt, error = %e, "Giving up on push token registration");
                    return Err(e);
                }
            }
        }
    }

    async fn send(&self, token: &str) -> Result<()> {
        let options = FetchOptions::post().json(json!({ "token": token }));
        let response = self.transport.send(PUSH_TOKEN_PATH, options).await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        Ok(())
    }

    /// Register on every sign-in announced on `events` until the channel
    /// closes.
    pub fn spawn(self: Arc<Self>, mut events: broadcast::Receiver<SessionEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(SessionEvent::SignedIn { origin, .. }) => {
                        debug!(?origin, "Registering push token after sign-in");
                        // Failures are already counted and logged.
                        let _ = self.register().await;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Push registrar lagged behind session events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Push registrar stopped");
        })
    }
}

impl std::fmt::Debug for PushRegistrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushRegistrar")
            .field("policy", &self.policy)
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}
