//! Cookie-session transport (web).

use async_trait::async_trait;
use reqwest::Response;
use tracing::{debug, info, warn};

use super::{
    CredentialResponse, LOGOUT_PATH, RestoreOutcome, SESSION_PATH, SessionTransport, TOKEN_PATH,
};
use crate::auth::fetch::FetchOptions;
use crate::auth::user::AuthenticatedUser;
use crate::config::Platform;
use crate::error::{AuthError, Result};
use crate::net::{ApiClient, api_error};

/// Session held in an HTTP-only cookie set by the backend.
///
/// The [`ApiClient`] must be built with a cookie store so the cookie set by
/// sign-in or code exchange rides along on later requests. No token is
/// stored locally.
#[derive(Debug, Clone)]
pub struct CookieTransport {
    api: ApiClient,
}

impl CookieTransport {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// `GET /api/auth/session`.
    async fn fetch_session(&self) -> Result<AuthenticatedUser> {
        let response = self.api.get(SESSION_PATH)?.send().await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl SessionTransport for CookieTransport {
    fn platform(&self) -> Platform {
        Platform::Web
    }

    fn api(&self) -> &ApiClient {
        &self.api
    }

    async fn restore(&self) -> RestoreOutcome {
        let request = match self.api.get(SESSION_PATH) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Cannot build session check");
                return RestoreOutcome::NeedsLogin;
            }
        };

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Session check failed; staying signed out");
                return RestoreOutcome::TransientFailure(None);
            }
        };

        if !response.status().is_success() {
            debug!(status = response.status().as_u16(), "No cookie session");
            return RestoreOutcome::NeedsLogin;
        }

        match response.json::<AuthenticatedUser>().await {
            Ok(user) => {
                info!(email = %user.email, "Cookie session restored");
                RestoreOutcome::Restored(user)
            }
            Err(e) => {
                warn!(error = %e, "Unreadable session payload");
                RestoreOutcome::NeedsLogin
            }
        }
    }

    async fn establish(&self, response: CredentialResponse) -> Result<AuthenticatedUser> {
        if let Some(user) = response.user {
            return Ok(user);
        }
        if let Some(token) = response.access_token() {
            return AuthenticatedUser::from_token(token);
        }
        if response.success == Some(true) {
            return self.fetch_session().await;
        }
        Err(AuthError::MissingField("user"))
    }

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<AuthenticatedUser> {
        let mut form = vec![
            ("code".to_string(), code.to_string()),
            ("platform".to_string(), "web".to_string()),
        ];
        if let Some(verifier) = code_verifier {
            form.push(("code_verifier".to_string(), verifier.to_string()));
        }

        let response = self.api.post(TOKEN_PATH)?.form(&form).send().await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let body = CredentialResponse::parse(&response.text().await?)?;
        if body.success != Some(true) {
            return Err(AuthError::OAuth("code exchange was not accepted".to_string()));
        }

        // The exchange set the cookie; the session endpoint is the source of truth.
        self.fetch_session().await
    }

    async fn refresh_identity(
        &self,
        access_token: Option<&str>,
    ) -> Result<Option<AuthenticatedUser>> {
        match self.fetch_session().await {
            Ok(user) => Ok(Some(user)),
            Err(e) => {
                warn!(error = %e, "Could not re-read cookie session");
                match access_token {
                    Some(token) => AuthenticatedUser::from_token(token).map(Some),
                    None => Ok(None),
                }
            }
        }
    }

    async fn send(&self, url: &str, options: FetchOptions) -> Result<Response> {
        Ok(options.build(&self.api, url)?.send().await?)
    }

    async fn logout(&self) -> Result<()> {
        let response = self.api.post(LOGOUT_PATH)?.send().await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        Ok(())
    }

    async fn clear_credentials(&self) {
        debug!("Cookie session has no local credentials");
    }
}
