//! Token-pair transport (native).

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use tracing::{debug, error, info, warn};

use super::{
    CredentialResponse, LOGOUT_PATH, RestoreOutcome, SessionTransport, TOKEN_PATH, VERIFY_PATH,
};
use crate::auth::fetch::{AuthFetch, FetchOptions};
use crate::auth::jwt;
use crate::auth::refresh::Refresher;
use crate::auth::store::{REFRESH_TOKEN_KEY, TOKEN_KEY, TokenStore};
use crate::auth::user::AuthenticatedUser;
use crate::config::Platform;
use crate::error::{AuthError, Result};
use crate::net::{ApiClient, api_error};
use crate::session::SessionStore;

/// Session held as an access/refresh token pair in the [`TokenStore`].
#[derive(Debug, Clone)]
pub struct BearerTokenTransport {
    api: ApiClient,
    store: TokenStore,
    fetcher: AuthFetch,
}

impl BearerTokenTransport {
    pub fn new(api: ApiClient, store: TokenStore, session: SessionStore) -> Self {
        let refresher = Arc::new(Refresher::new(api.clone(), store.clone()));
        let fetcher = AuthFetch::new(api.clone(), refresher, store.clone(), session);
        Self {
            api,
            store,
            fetcher,
        }
    }

    pub fn auth_fetch(&self) -> &AuthFetch {
        &self.fetcher
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// `GET /api/auth/verify` with `token`.
    async fn verify(&self, token: &str) -> Result<StatusCode> {
        let response = self.api.get(VERIFY_PATH)?.bearer_auth(token).send().await?;
        Ok(response.status())
    }

    /// Expired access token: refresh it, or tear everything down.
    async fn recover_expired(&self) -> Option<(String, jwt::Claims)> {
        if self.store.refresh_token().await.is_none() {
            info!("Access token expired and no refresh token stored");
            if let Err(e) = self.store.delete(TOKEN_KEY).await {
                warn!(error = %e, "Failed to delete expired access token");
            }
            return None;
        }

        let token = match self.fetcher.refresher().refresh().await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Refresh failed during restore");
                self.store.clear().await;
                return None;
            }
        };

        match jwt::decode(&token) {
            Ok(claims) => Some((token, claims)),
            Err(e) => {
                warn!(error = %e, "Refreshed token is malformed");
                self.store.clear().await;
                None
            }
        }
    }
}

#[async_trait]
impl SessionTransport for BearerTokenTransport {
    fn platform(&self) -> Platform {
        Platform::Native
    }

    fn api(&self) -> &ApiClient {
        &self.api
    }

    async fn restore(&self) -> RestoreOutcome {
        let Some(token) = self.store.access_token().await else {
            debug!("No stored access token");
            return RestoreOutcome::NeedsLogin;
        };

        let claims = match jwt::decode(&token) {
            Ok(claims) => claims,
            Err(e) => {
                warn!(error = %e, "Stored access token is malformed");
                self.store.clear().await;
                return RestoreOutcome::NeedsLogin;
            }
        };

        let (token, claims) = if jwt::is_expired(&claims, jwt::now_seconds()) {
            match self.recover_expired().await {
                Some(refreshed) => refreshed,
                None => return RestoreOutcome::NeedsLogin,
            }
        } else {
            (token, claims)
        };

        let user = match AuthenticatedUser::from_claims(&claims) {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "Access token carries no usable identity");
                self.store.clear().await;
                return RestoreOutcome::NeedsLogin;
            }
        };

        match self.verify(&token).await {
            Ok(status) if status.is_success() => {
                info!(email = %user.email, "Session restored");
                RestoreOutcome::Restored(user)
            }
            Ok(StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND) => {
                info!("Backend no longer accepts this session");
                self.store.clear().await;
                RestoreOutcome::NeedsLogin
            }
            Ok(status) => {
                warn!(status = status.as_u16(), "Verify failed; keeping cached session");
                RestoreOutcome::TransientFailure(Some(user))
            }
            Err(e) => {
                warn!(error = %e, "Verify unreachable; keeping cached session");
                RestoreOutcome::TransientFailure(Some(user))
            }
        }
    }

    async fn establish(&self, response: CredentialResponse) -> Result<AuthenticatedUser> {
        let access_token = response
            .access_token()
            .ok_or(AuthError::MissingField("accessToken"))?;
        let user = AuthenticatedUser::from_token(access_token)?;

        self.store.save(TOKEN_KEY, access_token).await?;
        if let Some(refresh_token) = response.refresh_token() {
            self.store.save(REFRESH_TOKEN_KEY, refresh_token).await?;
        }
        Ok(user)
    }

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<AuthenticatedUser> {
        let mut form = vec![("code".to_string(), code.to_string())];
        if let Some(verifier) = code_verifier {
            form.push(("code_verifier".to_string(), verifier.to_string()));
        }

        let response = self.api.post(TOKEN_PATH)?.form(&form).send().await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let body = CredentialResponse::parse(&response.text().await?)?;
        let (Some(access_token), Some(refresh_token)) = (body.access_token(), body.refresh_token())
        else {
            error!("Code exchange response is missing accessToken or refreshToken");
            return Err(AuthError::MissingField("accessToken/refreshToken"));
        };

        let user = AuthenticatedUser::from_token(access_token)?;
        self.store.save_pair(access_token, refresh_token).await?;
        Ok(user)
    }

    async fn refresh_identity(
        &self,
        access_token: Option<&str>,
    ) -> Result<Option<AuthenticatedUser>> {
        let Some(token) = access_token.filter(|t| !t.is_empty()) else {
            return Ok(None);
        };
        let user = AuthenticatedUser::from_token(token)?;
        self.store.save(TOKEN_KEY, token).await?;
        Ok(Some(user))
    }

    async fn send(&self, url: &str, options: FetchOptions) -> Result<Response> {
        self.fetcher.fetch(url, options).await
    }

    async fn logout(&self) -> Result<()> {
        // Signing out must not trigger a refresh; send whatever is stored.
        let mut request = self.api.post(LOGOUT_PATH)?;
        if let Some(token) = self.store.access_token().await {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        Ok(())
    }

    async fn clear_credentials(&self) {
        self.store.clear().await;
    }
}
