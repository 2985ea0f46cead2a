//! PKCE (Proof Key for Code Exchange) for the authorization-code flow.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Challenge method sent with the authorization request.
pub const PKCE_METHOD: &str = "S256";

/// Characters allowed in the verifier (RFC 7636 unreserved chars).
const VERIFIER_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// Verifier length in characters.
const PKCE_VERIFIER_LENGTH: usize = 64;

/// A verifier and the S256 challenge derived from it.
///
/// The challenge goes out in the authorization URL; the verifier stays with
/// the client until the code exchange.
#[derive(Clone)]
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

impl Pkce {
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let verifier: String = (0..PKCE_VERIFIER_LENGTH)
            .map(|_| VERIFIER_CHARS[rng.random_range(0..VERIFIER_CHARS.len())] as char)
            .collect();
        Self::from_verifier(verifier)
    }

    /// Derive the challenge for an existing verifier.
    pub fn from_verifier(verifier: impl Into<String>) -> Self {
        let verifier = verifier.into();
        let challenge = challenge_for(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}

impl std::fmt::Debug for Pkce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pkce")
            .field("verifier", &"[redacted]")
            .field("challenge", &self.challenge)
            .finish()
    }
}

/// S256 challenge: base64url(SHA-256(verifier)) without padding.
pub fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}
