//! Transient OAuth session material — CSRF state and PKCE verifier.
//!
//! One [`OAuthSession`] exists per login attempt. It is serialized into a
//! short-lived, HTTP-only cookie keyed per provider, consumed exactly once
//! on callback, and cleared on every outcome. The state value must
//! exact-match on callback; the PKCE verifier is only generated for
//! providers that use PKCE (Google).

use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{RngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::provider::Provider;

/// Maximum age of the transient session cookie. A callback arriving later
/// than this finds no stored state and fails the state check.
pub const SESSION_MAX_AGE: Duration = Duration::from_secs(600);

/// Transient per-attempt OAuth session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthSession {
    /// Provider this session was issued for
    pub provider: Provider,
    /// Anti-CSRF state token
    pub state: String,
    /// PKCE code verifier (Google only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_verifier: Option<String>,
}

impl OAuthSession {
    /// Cookie name for a provider's transient session, keyed per provider so
    /// parallel attempts against different providers don't clobber each
    /// other.
    #[must_use]
    pub fn cookie_name(provider: Provider) -> String {
        format!("oauth_session_{provider}")
    }

    /// Serialize to an opaque cookie value (base64url JSON).
    #[must_use]
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Decode a cookie value. Returns `None` for anything that does not
    /// round-trip — a garbled cookie is treated the same as an absent one.
    #[must_use]
    pub fn decode(value: &str) -> Option<Self> {
        let json = URL_SAFE_NO_PAD.decode(value).ok()?;
        serde_json::from_slice(&json).ok()
    }
}

/// Generate a random anti-CSRF state parameter (128 bits, base64url).
#[must_use]
pub fn generate_state() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a PKCE code verifier and its S256 challenge.
#[must_use]
pub fn generate_pkce() -> (String, String) {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    let verifier = URL_SAFE_NO_PAD.encode(bytes);

    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    let challenge = URL_SAFE_NO_PAD.encode(hasher.finalize());

    (verifier, challenge)
}
