//! Token authority — signs session claims with the active key and verifies
//! tokens against every key the store knows.
//!
//! # Verification flow
//!
//! 1. Decode the token header (no verification) to extract the embedded `kid`.
//! 2. When a `kid` is present and known, verify strictly with that key —
//!    algorithm pinned to RS256, issuer and audience checked. No fallback is
//!    attempted on failure: the kid was explicit, so the failure is final.
//! 3. When no `kid` is present, or the kid is unknown, try every stored key
//!    in stable kid order and accept the first that verifies. This path
//!    exists for tokens issued before kid embedding, or by a key this
//!    instance no longer maps by header.
//!
//! There is no revocation and no refresh: correctness rests on the short
//! token lifetime plus re-authentication.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, DecodingKey, Header, TokenData, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TokenConfig;
use crate::keys::KeyStore;

/// Error variants for token signing and verification failures.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// The key store holds no active signing key.
    #[error("no active signing key available")]
    NoActiveKey,

    /// The token's expiry has passed.
    #[error("token expired")]
    Expired,

    /// The signature does not verify under the selected key.
    #[error("invalid token signature")]
    InvalidSignature,

    /// The token's issuer or audience does not match the configured values.
    #[error("token issuer or audience mismatch")]
    ClaimMismatch,

    /// The token is not structurally a JWT.
    #[error("malformed token: {0}")]
    Malformed(String),

    /// No stored key verified the token (fallback path over an empty or
    /// exhausted key set).
    #[error("no known key verified the token")]
    AllKeysFailed,

    /// Signing itself failed.
    #[error("token signing failed: {0}")]
    Signing(String),
}

/// Claims embedded in every session token. Created once per successful
/// login, never mutated, destroyed implicitly when the token expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject — the directory user id
    pub sub: String,
    /// Verified email address
    pub email: String,
    /// Organization id from the directory
    pub org: String,
    /// Role names, order preserved
    pub roles: Vec<String>,
    /// Issued-at (Unix epoch seconds)
    pub iat: u64,
    /// Expires-at (Unix epoch seconds)
    pub exp: u64,
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
}

/// Identity resolved by the directory lookup, ready for token issuance.
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    /// Directory user id (becomes `sub`)
    pub subject: String,
    /// Verified email address
    pub email: String,
    /// Organization id
    pub organization: String,
    /// Role names
    pub roles: Vec<String>,
}

/// An issued token together with the claims it carries.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The compact JWT
    pub token: String,
    /// The claims that were signed
    pub claims: Claims,
}

/// Signs and verifies session tokens against a [`KeyStore`].
pub struct TokenAuthority {
    store: Arc<KeyStore>,
    issuer: String,
    audience: String,
    lifetime: Duration,
}

impl TokenAuthority {
    /// Create an authority over a key store with the configured issuer,
    /// audience and global token lifetime.
    #[must_use]
    pub fn new(store: Arc<KeyStore>, config: &TokenConfig) -> Self {
        Self {
            store,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            lifetime: config.lifetime,
        }
    }

    /// Configured token lifetime (drives the session cookie Max-Age).
    #[must_use]
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Sign the identity into a session token with the active key.
    ///
    /// Fails with [`TokenError::NoActiveKey`] when the store has no active
    /// key — an unsigned or malformed token is never emitted.
    pub fn issue(&self, identity: &SessionIdentity) -> Result<IssuedToken, TokenError> {
        let pair = self.store.active_key().ok_or(TokenError::NoActiveKey)?;

        let now = unix_now();
        let claims = Claims {
            sub: identity.subject.clone(),
            email: identity.email.clone(),
            org: identity.organization.clone(),
            roles: identity.roles.clone(),
            iat: now,
            exp: now + self.lifetime.as_secs(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(pair.kid().to_string());

        let token = encode(&header, &claims, pair.encoding_key())
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        debug!(kid = %pair.kid(), sub = %claims.sub, "Issued session token");
        Ok(IssuedToken { token, claims })
    }

    /// Verify a session token and return its claims.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let header = jsonwebtoken::decode_header(token)
            .map_err(|e| TokenError::Malformed(e.to_string()))?;

        // Strict path: the kid was explicit, so its key decides alone.
        if let Some(kid) = header.kid.as_deref() {
            if let Some(pair) = self.store.key(kid) {
                return self
                    .verify_with(token, pair.decoding_key())
                    .map(|data| data.claims);
            }
            debug!(kid = %kid, "Token kid unknown to this store, trying all keys");
        }

        // Fallback: try every known key in stable order, keep the last error.
        let pairs = self.store.verification_keys();
        let mut last_err = None;
        for pair in &pairs {
            match self.verify_with(token, pair.decoding_key()) {
                Ok(data) => return Ok(data.claims),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or(TokenError::AllKeysFailed))
    }

    /// Verify against one key, algorithm pinned, issuer/audience checked.
    fn verify_with(
        &self,
        token: &str,
        key: &DecodingKey,
    ) -> Result<TokenData<Claims>, TokenError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.leeway = 60; // clock skew tolerance

        decode::<Claims>(token, key, &validation).map_err(map_jwt_error)
    }
}

/// Map `jsonwebtoken` errors onto the typed taxonomy.
fn map_jwt_error(err: jsonwebtoken::errors::Error) -> TokenError {
    use jsonwebtoken::errors::ErrorKind;

    match err.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::InvalidSignature => TokenError::InvalidSignature,
        ErrorKind::InvalidIssuer | ErrorKind::InvalidAudience => TokenError::ClaimMismatch,
        _ => TokenError::Malformed(err.to_string()),
    }
}

/// Current Unix time in seconds.
fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}
