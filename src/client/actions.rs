//! Credential session actions.
//!
//! Each action posts to the backend and folds the answer into the session.
//! Form-facing failures come back as data ([`FieldErrors`] /
//! [`ActionError`]) so a UI can render them inline; nothing here leaves the
//! session half-updated.

use reqwest::Response;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use super::SessionClient;
use crate::auth::fetch::FetchOptions;
use crate::auth::forms::{ActionError, ErrorBody, FieldErrors};
use crate::auth::transport::CredentialResponse;
use crate::auth::user::AuthenticatedUser;
use crate::error::{AuthError, Result, SessionError};
use crate::session::{Route, SessionStore, SignInOrigin};

/// Email/password sign-in.
pub const AUTHENTICATE_PATH: &str = "/api/auth/authenticate";
/// Account creation.
pub const REGISTER_PATH: &str = "/api/auth/register";
pub const CHANGE_PASSWORD_PATH: &str = "/api/auth/change-password";
pub const CHANGE_NAME_PATH: &str = "/api/users/change-name";
pub const COMPLETE_ONBOARDING_PATH: &str = "/api/users/complete-onboarding";

const UNEXPECTED_ERROR: &str = "An unexpected error occurred";
const SESSION_EXPIRED: &str = "Your session has expired. Please sign in again.";
const SIGN_IN_FAILED: &str = "Sign in failed";
const SIGN_UP_FAILED: &str = "Registration failed";
const CHANGE_PASSWORD_FAILED: &str = "Could not change password";
const CHANGE_NAME_FAILED: &str = "Could not change name";
const ONBOARDING_FAILED: &str = "Could not complete onboarding";

const MIN_NAME_LEN: usize = 2;

/// Optional replacement token returned when identity claims changed.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityUpdate {
    #[serde(default)]
    access_token: Option<String>,
}

impl IdentityUpdate {
    fn access_token(body: &str) -> Option<String> {
        serde_json::from_str::<IdentityUpdate>(body)
            .ok()
            .and_then(|u| u.access_token)
            .filter(|t| !t.is_empty())
    }
}

impl SessionClient {
    // MARK: - Credentials

    /// Sign in with email and password.
    ///
    /// A rejected sign-in leaves the session untouched and returns the
    /// backend's field errors (or a general message).
    pub async fn sign_in_with_email(
        &self,
        email: &str,
        password: &str,
    ) -> std::result::Result<AuthenticatedUser, FieldErrors> {
        let body = json!({ "email": email, "password": password });
        self.submit_credentials(AUTHENTICATE_PATH, body, SignInOrigin::Credentials, SIGN_IN_FAILED)
            .await
    }

    /// Create an account and sign in to it.
    pub async fn sign_up(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> std::result::Result<AuthenticatedUser, FieldErrors> {
        let body = json!({ "name": name, "email": email, "password": password });
        self.submit_credentials(REGISTER_PATH, body, SignInOrigin::Registration, SIGN_UP_FAILED)
            .await
    }

    async fn submit_credentials(
        &self,
        path: &str,
        body: Value,
        origin: SignInOrigin,
        fallback: &str,
    ) -> std::result::Result<AuthenticatedUser, FieldErrors> {
        let session = &self.inner.session;
        let _loading = session.begin_loading();

        let (status, text) = match self.post_unauthenticated(path, &body).await {
            Ok(reply) => reply,
            Err(e) => return Err(self.unexpected(e, path)),
        };

        if !status.is_success() {
            debug!(path, status = status.as_u16(), "Credentials rejected");
            return Err(ErrorBody::parse(&text).into_field_errors(fallback));
        }

        let established = match CredentialResponse::parse(&text) {
            Ok(response) => self.inner.transport.establish(response).await,
            Err(e) => Err(e),
        };
        match established {
            Ok(user) => {
                info!(email = %user.email, ?origin, "Signed in");
                session.sign_in(user.clone(), origin);
                Ok(user)
            }
            Err(e) => Err(self.unexpected(e, path)),
        }
    }

    async fn post_unauthenticated(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<(reqwest::StatusCode, String)> {
        let response = self.inner.transport.api().post(path)?.json(body).send().await?;
        let status = response.status();
        Ok((status, response.text().await?))
    }

    fn unexpected(&self, e: AuthError, path: &str) -> FieldErrors {
        error!(error = %e, path, "Credential request failed");
        self.inner.session.set_error(SessionError::from(&e));
        FieldErrors::general(UNEXPECTED_ERROR)
    }

    /// Sign out.
    ///
    /// The logout request is best effort. Local credentials and the session
    /// user are cleared whatever it returns, then the navigator is sent to
    /// the sign-in screen.
    pub async fn sign_out(&self) {
        if let Err(e) = self.inner.transport.logout().await {
            warn!(error = %e, "Logout request failed; clearing local session anyway");
        }
        self.inner.transport.clear_credentials().await;
        self.inner.session.sign_out();
        self.inner.navigator.replace(Route::SignIn);
        info!("Signed out");
    }

    // MARK: - Account

    pub async fn change_password(
        &self,
        old_password: &str,
        new_password: &str,
    ) -> std::result::Result<(), ActionError> {
        let options = FetchOptions::post().json(json!({
            "oldPassword": old_password,
            "newPassword": new_password,
        }));
        self.account_request(CHANGE_PASSWORD_PATH, options, CHANGE_PASSWORD_FAILED)
            .await?;
        info!("Password changed");
        Ok(())
    }

    /// Change the display name.
    ///
    /// Blank names and names shorter than two characters are rejected
    /// without a request. On success the session user is rebuilt from the
    /// returned token or the re-read session, or patched locally when
    /// neither is available.
    pub async fn change_name(&self, name: &str) -> std::result::Result<(), ActionError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ActionError::Fields(FieldErrors {
                name: Some("Name is required".to_string()),
                ..Default::default()
            }));
        }
        if name.chars().count() < MIN_NAME_LEN {
            return Err(ActionError::Fields(FieldErrors {
                name: Some(format!("Name must be at least {MIN_NAME_LEN} characters")),
                ..Default::default()
            }));
        }

        let options = FetchOptions::post().json(json!({ "name": name }));
        let body = self
            .account_request(CHANGE_NAME_PATH, options, CHANGE_NAME_FAILED)
            .await?;

        let token = IdentityUpdate::access_token(&body);
        self.apply_identity_change(token.as_deref(), |session| {
            session.patch_name(name);
        })
        .await;
        info!("Display name changed");
        Ok(())
    }

    /// Mark onboarding as done. The flag never goes back to false.
    pub async fn complete_onboarding(&self) -> std::result::Result<(), ActionError> {
        let body = self
            .account_request(COMPLETE_ONBOARDING_PATH, FetchOptions::post(), ONBOARDING_FAILED)
            .await?;

        let token = IdentityUpdate::access_token(&body);
        self.apply_identity_change(token.as_deref(), |_| {}).await;
        self.inner.session.mark_onboarding_completed();
        info!("Onboarding completed");
        Ok(())
    }

    /// Authenticated POST; returns the success body.
    async fn account_request(
        &self,
        path: &str,
        options: FetchOptions,
        fallback: &str,
    ) -> std::result::Result<String, ActionError> {
        let response = self
            .inner
            .transport
            .send(path, options)
            .await
            .map_err(|e| request_failed(e, path))?;
        read_action_response(response, path, fallback).await
    }

    /// Refresh the session user after its claims changed server-side.
    ///
    /// Falls back to `patch` on the current user when no fresher identity
    /// is available.
    async fn apply_identity_change(
        &self,
        access_token: Option<&str>,
        patch: impl FnOnce(&SessionStore),
    ) {
        let session = &self.inner.session;
        match self.inner.transport.refresh_identity(access_token).await {
            Ok(Some(user)) => {
                let onboarded = session.user().is_some_and(|u| u.onboarding_completed);
                session.set_user(Some(user));
                if onboarded {
                    session.mark_onboarding_completed();
                }
            }
            Ok(None) => patch(session),
            Err(e) => {
                warn!(error = %e, "Could not rebuild identity; patching locally");
                patch(session);
            }
        }
    }
}

fn request_failed(e: AuthError, path: &str) -> ActionError {
    warn!(error = %e, path, "Account request failed");
    match e {
        AuthError::NoValidToken => ActionError::Message(SESSION_EXPIRED.to_string()),
        _ => ActionError::Message(UNEXPECTED_ERROR.to_string()),
    }
}

async fn read_action_response(
    response: Response,
    path: &str,
    fallback: &str,
) -> std::result::Result<String, ActionError> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| request_failed(AuthError::from(e), path))?;
    if status.is_success() {
        return Ok(text);
    }
    debug!(path, status = status.as_u16(), "Account request rejected");
    Err(ErrorBody::parse(&text).into_action_error(fallback))
}
