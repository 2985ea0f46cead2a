//! OAuth authorization-code flow with PKCE.
//!
//! The backend proxies the identity provider: the client opens
//! `/api/auth/authorize`, receives a redirect carrying a code, and posts the
//! code plus PKCE verifier to `/api/auth/token`. Redirects can be delivered
//! more than once for one logical event, so every response carries a
//! synthetic identity and each identity is processed at most once.

use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, error, info, warn};
use url::Url;

use super::pkce::{PKCE_METHOD, Pkce};
use super::transport::SessionTransport;
use super::user::AuthenticatedUser;
use crate::config::{OAuthConfig, Platform};
use crate::error::{AuthError, Result, SessionError};
use crate::session::{SessionStore, SignInOrigin};

/// Tie-breaker for responses created within the same millisecond.
static RESPONSE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

// MARK: - Responses

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseKind {
    Success,
    Error,
    Cancelled,
}

impl fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseKind::Success => write!(f, "success"),
            ResponseKind::Error => write!(f, "error"),
            ResponseKind::Cancelled => write!(f, "cancel"),
        }
    }
}

/// Identity of one delivered authorization response: kind plus the time it
/// was received. Copies of a response share it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResponseId {
    pub kind: ResponseKind,
    pub received_at_ms: i64,
    sequence: u64,
}

impl fmt::Display for ResponseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.received_at_ms, self.sequence)
    }
}

/// What the identity provider sent back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationOutcome {
    Success {
        code: String,
        state: Option<String>,
    },
    Error {
        error: String,
        description: Option<String>,
    },
    /// The user dismissed the flow, or the redirect carried nothing usable.
    Cancelled,
}

impl AuthorizationOutcome {
    fn kind(&self) -> ResponseKind {
        match self {
            AuthorizationOutcome::Success { .. } => ResponseKind::Success,
            AuthorizationOutcome::Error { .. } => ResponseKind::Error,
            AuthorizationOutcome::Cancelled => ResponseKind::Cancelled,
        }
    }
}

/// An authorization response tagged with its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationResponse {
    id: ResponseId,
    outcome: AuthorizationOutcome,
}

impl AuthorizationResponse {
    /// Tag `outcome` with a fresh identity.
    pub fn new(outcome: AuthorizationOutcome) -> Self {
        let id = ResponseId {
            kind: outcome.kind(),
            received_at_ms: chrono::Utc::now().timestamp_millis(),
            sequence: RESPONSE_SEQUENCE.fetch_add(1, Ordering::Relaxed),
        };
        Self { id, outcome }
    }

    pub fn success(code: impl Into<String>, state: Option<String>) -> Self {
        Self::new(AuthorizationOutcome::Success {
            code: code.into(),
            state,
        })
    }

    pub fn error(error: impl Into<String>, description: Option<String>) -> Self {
        Self::new(AuthorizationOutcome::Error {
            error: error.into(),
            description,
        })
    }

    pub fn cancelled() -> Self {
        Self::new(AuthorizationOutcome::Cancelled)
    }

    /// Interpret the redirect the provider sent the user back to.
    ///
    /// `error` wins over `code`. A `state` that does not match
    /// `expected_state` turns a success into an `invalid_state` error.
    pub fn from_redirect_url(redirect: &str, expected_state: Option<&str>) -> Self {
        let url = match Url::parse(redirect) {
            Ok(url) => url,
            Err(e) => {
                return Self::error("invalid_request", Some(format!("unparseable redirect: {e}")));
            }
        };

        let mut code = None;
        let mut state = None;
        let mut error = None;
        let mut description = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                "error_description" => description = Some(value.into_owned()),
                _ => {}
            }
        }

        if let Some(error) = error {
            warn!(error = %error, description = ?description, "OAuth error from provider");
            return Self::error(error, description);
        }

        let Some(code) = code.filter(|c| !c.is_empty()) else {
            return Self::cancelled();
        };

        if let Some(expected) = expected_state {
            if state.as_deref() != Some(expected) {
                warn!("OAuth redirect state mismatch");
                return Self::error(
                    "invalid_state",
                    Some("state does not match the pending request".to_string()),
                );
            }
        }

        Self::success(code, state)
    }

    pub fn id(&self) -> &ResponseId {
        &self.id
    }

    pub fn outcome(&self) -> &AuthorizationOutcome {
        &self.outcome
    }
}

// MARK: - Requests

/// Client registration used to build authorization requests.
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    pub client_id: String,
    pub scopes: Vec<String>,
    pub redirect_uri: String,
    pub authorize_path: String,
}

impl From<&OAuthConfig> for OAuthSettings {
    fn from(config: &OAuthConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            scopes: config.scopes.clone(),
            redirect_uri: config.redirect_uri.clone(),
            authorize_path: config.authorize_path.clone(),
        }
    }
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self::from(&OAuthConfig::default())
    }
}

/// A started authorization: open `url` in a browser.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: Url,
    pub state: String,
}

struct PendingAuthorization {
    state: String,
    verifier: String,
}

// MARK: - Flow

/// What handling one authorization response did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    SignedIn(AuthenticatedUser),
    /// The provider reported an error; recorded in `last_error`.
    ProviderError,
    /// The code exchange failed; recorded in `last_error`.
    Failed(String),
    Cancelled,
    /// This response was already processed.
    Duplicate,
}

/// Drives authorization requests and folds responses into the session.
pub struct OAuthFlow {
    settings: OAuthSettings,
    transport: Arc<dyn SessionTransport>,
    session: SessionStore,
    pending: Mutex<Option<PendingAuthorization>>,
    last_processed: Mutex<Option<ResponseId>>,
    exchanges: AtomicU64,
}

impl OAuthFlow {
    pub fn new(
        settings: OAuthSettings,
        transport: Arc<dyn SessionTransport>,
        session: SessionStore,
    ) -> Self {
        Self {
            settings,
            transport,
            session,
            pending: Mutex::new(None),
            last_processed: Mutex::new(None),
            exchanges: AtomicU64::new(0),
        }
    }

    /// Number of code exchanges attempted.
    pub fn exchange_count(&self) -> u64 {
        self.exchanges.load(Ordering::Relaxed)
    }

    /// Start an authorization: build the URL and remember the PKCE verifier.
    ///
    /// Starting again replaces the pending request.
    pub fn begin(&self) -> Result<AuthorizationRequest> {
        let pkce = Pkce::generate();
        let state = uuid::Uuid::new_v4().simple().to_string();

        let mut url = self.transport.api().url(&self.settings.authorize_path)?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.settings.client_id)
            .append_pair("redirect_uri", &self.settings.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.settings.scopes.join(" "))
            .append_pair("state", &state)
            .append_pair("code_challenge", &pkce.challenge)
            .append_pair("code_challenge_method", PKCE_METHOD);

        *self.pending.lock().unwrap_or_else(|e| e.into_inner()) = Some(PendingAuthorization {
            state: state.clone(),
            verifier: pkce.verifier,
        });

        debug!(client_id = %self.settings.client_id, "Authorization request started");
        Ok(AuthorizationRequest { url, state })
    }

    /// State of the pending authorization request, if any.
    pub fn pending_state(&self) -> Option<String> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|p| p.state.clone())
    }

    /// Process an authorization response at most once.
    pub async fn handle_response(&self, response: &AuthorizationResponse) -> ExchangeOutcome {
        if let AuthorizationOutcome::Cancelled = response.outcome() {
            debug!(id = %response.id(), "Authorization cancelled");
            return ExchangeOutcome::Cancelled;
        }

        if !self.mark_processed(response.id()) {
            debug!(id = %response.id(), "Authorization response already processed");
            return ExchangeOutcome::Duplicate;
        }

        match response.outcome() {
            AuthorizationOutcome::Error { error, description } => {
                warn!(error = %error, "Authorization failed at the provider");
                self.session.set_error(SessionError::OAuth {
                    error: error.clone(),
                    description: description.clone(),
                });
                ExchangeOutcome::ProviderError
            }
            AuthorizationOutcome::Success { code, state } => {
                self.exchange(code, state.as_deref()).await
            }
            AuthorizationOutcome::Cancelled => ExchangeOutcome::Cancelled,
        }
    }

    async fn exchange(&self, code: &str, state: Option<&str>) -> ExchangeOutcome {
        // The pending verifier is only consumed by a response that matches it.
        let verifier = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            let mismatched = match (pending.as_ref(), state) {
                (Some(expected), Some(state)) => expected.state != state,
                _ => false,
            };
            if mismatched {
                None
            } else {
                Some(pending.take().map(|p| p.verifier))
            }
        };
        let Some(verifier) = verifier else {
            warn!("Authorization response does not match the pending request");
            self.session.set_error(SessionError::OAuth {
                error: "invalid_state".to_string(),
                description: None,
            });
            return ExchangeOutcome::ProviderError;
        };

        if verifier.is_none() && self.transport.platform() == Platform::Native {
            warn!("Exchanging authorization code without a PKCE verifier");
        }

        let _loading = self.session.begin_loading();
        self.exchanges.fetch_add(1, Ordering::Relaxed);

        match self.transport.exchange_code(code, verifier.as_deref()).await {
            Ok(user) => {
                info!(email = %user.email, "Signed in with OAuth");
                self.session.sign_in(user.clone(), SignInOrigin::OAuth);
                ExchangeOutcome::SignedIn(user)
            }
            Err(e) => {
                error!(error = %e, "Token exchange failed");
                // An incomplete token response leaves the session as it was.
                if !matches!(e, AuthError::MissingField(_)) {
                    self.session.set_error(SessionError::from(&e));
                }
                ExchangeOutcome::Failed(e.to_string())
            }
        }
    }

    /// Record `id` as processed; `false` if it already was.
    fn mark_processed(&self, id: &ResponseId) -> bool {
        let mut last = self.last_processed.lock().unwrap_or_else(|e| e.into_inner());
        if last.as_ref() == Some(id) {
            return false;
        }
        *last = Some(id.clone());
        true
    }
}

impl fmt::Debug for OAuthFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthFlow")
            .field("settings", &self.settings)
            .field("platform", &self.transport.platform())
            .field("exchanges", &self.exchange_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_distinct() {
        let a = AuthorizationResponse::success("code", None);
        let b = AuthorizationResponse::success("code", None);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id(), a.clone().id());
        assert_eq!(a.id().kind, ResponseKind::Success);
        assert!(a.id().to_string().starts_with("success:"));
    }

    #[test]
    fn test_redirect_success() {
        let resp = AuthorizationResponse::from_redirect_url(
            "dealboard://redirect?code=abc&state=s1",
            Some("s1"),
        );
        assert_eq!(
            resp.outcome(),
            &AuthorizationOutcome::Success {
                code: "abc".into(),
                state: Some("s1".into())
            }
        );
    }

    #[test]
    fn test_redirect_error_wins() {
        let resp = AuthorizationResponse::from_redirect_url(
            "https://app.example/cb?error=access_denied&error_description=User%20said%20no&code=x",
            None,
        );
        assert_eq!(
            resp.outcome(),
            &AuthorizationOutcome::Error {
                error: "access_denied".into(),
                description: Some("User said no".into())
            }
        );
        assert_eq!(resp.id().kind, ResponseKind::Error);
    }

    #[test]
    fn test_redirect_state_mismatch() {
        let resp = AuthorizationResponse::from_redirect_url(
            "dealboard://redirect?code=abc&state=forged",
            Some("s1"),
        );
        assert!(matches!(
            resp.outcome(),
            AuthorizationOutcome::Error { error, .. } if error == "invalid_state"
        ));
    }

    #[test]
    fn test_redirect_without_code_is_cancelled() {
        let resp = AuthorizationResponse::from_redirect_url("dealboard://redirect", None);
        assert_eq!(resp.outcome(), &AuthorizationOutcome::Cancelled);

        let resp = AuthorizationResponse::from_redirect_url("::not a url::", None);
        assert_eq!(resp.id().kind, ResponseKind::Error);
    }

    #[test]
    fn test_settings_from_config() {
        let settings = OAuthSettings::default();
        assert_eq!(settings.client_id, "google");
        assert_eq!(settings.scopes.join(" "), "openid profile email");
        assert_eq!(settings.authorize_path, "/api/auth/authorize");
    }
}
