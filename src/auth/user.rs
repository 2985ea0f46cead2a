//! The authenticated identity held by the session.

use serde::{Deserialize, Serialize};

use super::jwt::{self, Claims};
use crate::error::{AuthError, Result};

/// Who is signed in.
///
/// Never persisted on its own: rebuilt from access-token claims (native) or
/// from the cookie session payload (web), and replaced wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedUser {
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    /// Auth provider tag, e.g. `LOCAL` or `GOOGLE`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Access token expiry, epoch seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Cookie session expiry reported by the web backend, epoch seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie_expiration: Option<i64>,
    #[serde(default)]
    pub onboarding_completed: bool,
}

impl AuthenticatedUser {
    /// Build a user from decoded token claims. The `email` claim is required.
    pub fn from_claims(claims: &Claims) -> Result<Self> {
        let email = claims
            .email
            .clone()
            .filter(|e| !e.is_empty())
            .ok_or_else(|| AuthError::MalformedToken("token has no email claim".to_string()))?;

        Ok(Self {
            email,
            name: claims.name.clone().unwrap_or_default(),
            picture: claims.picture.clone(),
            provider: claims.provider.clone(),
            exp: Some(claims.exp),
            cookie_expiration: None,
            onboarding_completed: claims.onboarding_completed.unwrap_or(false),
        })
    }

    /// Decode `token` and build a user from its claims.
    pub fn from_token(token: &str) -> Result<Self> {
        Self::from_claims(&jwt::decode(token)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use serde_json::json;

    fn mint(payload: serde_json::Value) -> String {
        format!("e30.{}.sig", URL_SAFE_NO_PAD.encode(payload.to_string()))
    }

    #[test]
    fn test_from_token() {
        let token = mint(json!({
            "email": "a@b.com",
            "name": "Ada",
            "picture": "https://img.example/a.png",
            "provider": "LOCAL",
            "exp": 2_000_000_000
        }));
        let user = AuthenticatedUser::from_token(&token).unwrap();
        assert_eq!(user.email, "a@b.com");
        assert_eq!(user.name, "Ada");
        assert_eq!(user.provider.as_deref(), Some("LOCAL"));
        assert_eq!(user.exp, Some(2_000_000_000));
        assert!(!user.onboarding_completed);
    }

    #[test]
    fn test_from_token_requires_email() {
        let token = mint(json!({ "sub": "1", "exp": 2_000_000_000 }));
        assert!(matches!(
            AuthenticatedUser::from_token(&token),
            Err(AuthError::MalformedToken(_))
        ));
    }

    #[test]
    fn test_session_payload_roundtrip() {
        let payload = json!({
            "email": "web@b.com",
            "name": "Web",
            "cookieExpiration": 1_800_000_000,
            "onboardingCompleted": true
        });
        let user: AuthenticatedUser = serde_json::from_value(payload).unwrap();
        assert_eq!(user.cookie_expiration, Some(1_800_000_000));
        assert!(user.onboarding_completed);
        assert_eq!(user.exp, None);

        let back = serde_json::to_value(&user).unwrap();
        assert_eq!(back["onboardingCompleted"], json!(true));
        assert!(back.get("picture").is_none());
    }
}
