//! Unverified JWT inspection.
//!
//! Decodes the payload segment of a bearer token to read identity claims and
//! expiry. No signature check is done here: the backend verifies every
//! request, so these claims only drive local UX decisions.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};

/// Claims carried in a Dealboard access token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    /// Expiry, epoch seconds.
    pub exp: i64,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub onboarding_completed: Option<bool>,
    /// Any claim not modelled above.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Decode a token's payload without verifying its signature.
pub fn decode(token: &str) -> Result<Claims> {
    let mut parts = token.trim().split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(AuthError::MalformedToken(
            "expected three dot-separated segments".to_string(),
        ));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthError::MalformedToken(format!("payload is not base64url: {}", e)))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::MalformedToken(format!("payload is not a claims object: {}", e)))
}

/// `true` once `now` has reached the token's expiry.
pub fn is_expired(claims: &Claims, now: i64) -> bool {
    now >= claims.exp
}

/// Current time in epoch seconds.
pub fn now_seconds() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Decode `token` and return its claims only if it has not expired.
pub fn decode_unexpired(token: &str) -> Option<Claims> {
    decode(token)
        .ok()
        .filter(|claims| !is_expired(claims, now_seconds()))
}
