//! Platform-specific session mechanics.
//!
//! The web build rides on an HTTP-only cookie the backend sets; the native
//! build holds an access/refresh token pair. [`SessionTransport`] hides that
//! difference so the session actions call one method instead of branching.
//! A transport is chosen once, when the client is built.

mod bearer;
mod cookie;

pub use bearer::BearerTokenTransport;
pub use cookie::CookieTransport;

use async_trait::async_trait;
use reqwest::Response;
use serde::Deserialize;

use super::fetch::FetchOptions;
use super::user::AuthenticatedUser;
use crate::config::Platform;
use crate::error::Result;
use crate::net::ApiClient;

/// Web cookie session check.
pub const SESSION_PATH: &str = "/api/auth/session";
/// OAuth code exchange.
pub const TOKEN_PATH: &str = "/api/auth/token";
/// Access token validation.
pub const VERIFY_PATH: &str = "/api/auth/verify";
/// Server-side session teardown.
pub const LOGOUT_PATH: &str = "/api/auth/logout";

/// Result of reconstructing a session at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// The backend confirmed the session.
    Restored(AuthenticatedUser),
    /// Nothing usable; the user has to sign in. Local credentials are gone.
    NeedsLogin,
    /// The backend could not be reached. Carries the cached user, if any,
    /// which stays signed in until the backend says otherwise.
    TransientFailure(Option<AuthenticatedUser>),
}

impl RestoreOutcome {
    /// The user the session should hold after this outcome.
    pub fn user(&self) -> Option<&AuthenticatedUser> {
        match self {
            RestoreOutcome::Restored(user) => Some(user),
            RestoreOutcome::TransientFailure(user) => user.as_ref(),
            RestoreOutcome::NeedsLogin => None,
        }
    }
}

/// Success body of `authenticate`, `register` and `token`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user: Option<AuthenticatedUser>,
    #[serde(default)]
    pub success: Option<bool>,
}

impl CredentialResponse {
    /// Parse a response body. An empty body is an empty response.
    pub fn parse(body: &str) -> Result<Self> {
        if body.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(body)?)
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref().filter(|t| !t.is_empty())
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// How the client holds and proves its session.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    fn platform(&self) -> Platform;

    /// Backend client used for unauthenticated calls (sign-in, sign-up).
    fn api(&self) -> &ApiClient;

    /// Reconstruct the session at startup.
    async fn restore(&self) -> RestoreOutcome;

    /// Fold a successful sign-in or sign-up response into a user.
    async fn establish(&self, response: CredentialResponse) -> Result<AuthenticatedUser>;

    /// Exchange an authorization code (plus PKCE verifier) for a session.
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<AuthenticatedUser>;

    /// Re-read the identity after a call that may have changed its claims.
    ///
    /// `access_token` is the replacement token the backend returned, if
    /// any. `Ok(None)` means no fresher identity is available.
    async fn refresh_identity(
        &self,
        access_token: Option<&str>,
    ) -> Result<Option<AuthenticatedUser>>;

    /// Send an authenticated request.
    async fn send(&self, url: &str, options: FetchOptions) -> Result<Response>;

    /// Ask the backend to end the session.
    async fn logout(&self) -> Result<()>;

    /// Drop every local credential.
    async fn clear_credentials(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_response_parse() {
        let resp = CredentialResponse::parse(r#"{"accessToken":"a","refreshToken":""}"#).unwrap();
        assert_eq!(resp.access_token(), Some("a"));
        assert_eq!(resp.refresh_token(), None);

        let empty = CredentialResponse::parse("  ").unwrap();
        assert!(empty.access_token().is_none());
        assert!(empty.user.is_none());

        assert!(CredentialResponse::parse("<html>").is_err());
    }

    #[test]
    fn test_restore_outcome_user() {
        assert!(RestoreOutcome::NeedsLogin.user().is_none());
        assert!(RestoreOutcome::TransientFailure(None).user().is_none());
    }
}
