//! Error types for the session core.

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors raised inside the session core.
///
/// Session-affecting failures are resolved (tokens cleared, state reset)
/// before one of these reaches a caller. Form-facing actions never return
/// this type; they return [`crate::auth::forms::FieldErrors`] or
/// [`crate::auth::forms::ActionError`] instead.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    // ── Tokens ──────────────────────────────────────────────────────
    /// The bearer token could not be decoded.
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// The refresh sub-flow failed.
    #[error("Token refresh failed: {0}")]
    Refresh(#[from] RefreshError),

    /// authFetch could not produce a usable access token, even after refresh.
    #[error("No valid access token available")]
    NoValidToken,

    // ── Storage ─────────────────────────────────────────────────────
    /// Token storage backend failure.
    #[error("Token storage error: {0}")]
    Storage(String),

    // ── HTTP ────────────────────────────────────────────────────────
    /// Non-success response from the backend.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Transport-level failure.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A response body did not deserialize.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A required field was absent from a backend response.
    #[error("Response is missing `{0}`")]
    MissingField(&'static str),

    // ── OAuth ───────────────────────────────────────────────────────
    /// Authorization flow failure (bad state, provider error, bad URL).
    #[error("OAuth error: {0}")]
    OAuth(String),

    // ── Configuration ───────────────────────────────────────────────
    /// Invalid configuration or URL.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// Whether this error means the user has to sign in again.
    pub fn requires_reauth(&self) -> bool {
        matches!(
            self,
            AuthError::MalformedToken(_) | AuthError::NoValidToken
        ) || matches!(self, AuthError::Refresh(e) if e.is_terminal())
            || matches!(self, AuthError::Api { status, .. } if *status == 401)
    }

    /// Whether the failure is worth retrying later (network or 5xx).
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Network(_) => true,
            AuthError::Refresh(e) => !e.is_terminal(),
            AuthError::Api { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            _ => false,
        }
    }

    /// Create a storage error with the backend's message.
    pub fn storage(message: impl Into<String>) -> Self {
        AuthError::Storage(message.into())
    }
}

/// Why a refresh attempt did not yield a new access token.
///
/// Terminal failures (see [`RefreshError::is_terminal`]) end the session.
/// The others leave the stored credentials in place for a later attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    #[error("no refresh token stored")]
    MissingRefreshToken,

    #[error("refresh rejected with status {status}")]
    Rejected { status: u16 },

    #[error("refresh request failed: {0}")]
    Transport(String),

    #[error("invalid refresh response: {0}")]
    InvalidResponse(String),
}

impl RefreshError {
    /// The refresh token is absent, expired or revoked.
    ///
    /// Network failures and 5xx answers say nothing about the token itself.
    pub fn is_terminal(&self) -> bool {
        match self {
            RefreshError::MissingRefreshToken | RefreshError::InvalidResponse(_) => true,
            RefreshError::Rejected { status } => (400..500).contains(status),
            RefreshError::Transport(_) => false,
        }
    }
}

/// Cloneable error snapshot kept in the session state as `last_error`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The identity provider returned an error response.
    #[error("authorization failed: {error}")]
    OAuth {
        error: String,
        description: Option<String>,
    },

    /// The session was torn down after a failed refresh.
    #[error("session expired: {0}")]
    Refresh(RefreshError),

    /// A session-affecting request failed.
    #[error("{0}")]
    Request(String),
}

impl From<&AuthError> for SessionError {
    fn from(err: &AuthError) -> Self {
        match err {
            AuthError::Refresh(e) => SessionError::Refresh(e.clone()),
            other => SessionError::Request(other.to_string()),
        }
    }
}
