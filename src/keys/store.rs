//! Key store — in-memory registry of RSA signing key pairs.
//!
//! Holds `{kid -> KeyPair}` plus the designated active key id. The store is
//! constructor-injected wherever it is needed (never a process-wide global)
//! so tests can build isolated instances. All state sits behind a single
//! `parking_lot::RwLock`: readers never block readers, and a mutation is
//! atomic with respect to concurrent reads.
//!
//! Safety invariant: the active signing key can never be removed while it is
//! active. [`KeyStore::remove`] logs and no-ops rather than erroring so a
//! bulk purge never aborts halfway.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey};
use rsa::{
    RsaPrivateKey, RsaPublicKey,
    pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey},
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding},
    traits::PublicKeyParts,
};
use parking_lot::RwLock;
use tracing::warn;

use super::jwks::JsonWebKey;

/// Error variants for key store and key material failures.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    /// The requested key id is not in the store.
    #[error("unknown key id: {0}")]
    UnknownKey(String),

    /// The supplied PEM material does not parse as an RSA key pair.
    #[error("invalid key material for '{kid}': {reason}")]
    InvalidKeyMaterial {
        /// Key id the material was supplied for.
        kid: String,
        /// Parse failure detail.
        reason: String,
    },

    /// Key generation failed (keygen subcommand / tests).
    #[error("key generation failed: {0}")]
    Generation(String),
}

/// An RSA signing key pair, immutable once created.
///
/// Owned exclusively by the [`KeyStore`] (behind `Arc` so readers can hold a
/// pair across a store mutation without blocking it).
pub struct KeyPair {
    kid: String,
    created_at: DateTime<Utc>,
    encoding: EncodingKey,
    decoding: DecodingKey,
    public: RsaPublicKey,
}

impl KeyPair {
    /// Parse a key pair from PEM material.
    ///
    /// Accepts PKCS#8 or PKCS#1 PEM for both halves. Fails fast with
    /// [`KeyError::InvalidKeyMaterial`] when either half does not parse as a
    /// structurally valid RSA key.
    pub fn from_pem(kid: &str, private_pem: &str, public_pem: &str) -> Result<Self, KeyError> {
        Self::from_pem_with_timestamp(kid, private_pem, public_pem, Utc::now())
    }

    /// Parse a key pair from PEM material with an explicit creation time.
    ///
    /// Used when re-registering a key whose age is known (and by tests that
    /// need backdated keys for purge-age behavior).
    pub fn from_pem_with_timestamp(
        kid: &str,
        private_pem: &str,
        public_pem: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Self, KeyError> {
        let invalid = |reason: String| KeyError::InvalidKeyMaterial {
            kid: kid.to_string(),
            reason,
        };

        // Structural validation: both halves must parse as RSA keys.
        RsaPrivateKey::from_pkcs8_pem(private_pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(private_pem))
            .map_err(|e| invalid(format!("private key: {e}")))?;

        let public = RsaPublicKey::from_public_key_pem(public_pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(public_pem))
            .map_err(|e| invalid(format!("public key: {e}")))?;

        let encoding = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| invalid(format!("private key: {e}")))?;
        let decoding = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .map_err(|e| invalid(format!("public key: {e}")))?;

        Ok(Self {
            kid: kid.to_string(),
            created_at,
            encoding,
            decoding,
            public,
        })
    }

    /// Generate a fresh RSA key pair (keygen subcommand and tests).
    ///
    /// Use 2048 bits for fast test execution, 4096 for production material.
    pub fn generate(kid: &str, bits: usize) -> Result<Self, KeyError> {
        use rand::rngs::OsRng;

        let private = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| KeyError::Generation(e.to_string()))?;
        let (private_pem, public_pem) = export_pem(&private)?;
        Self::from_pem(kid, &private_pem, &public_pem)
    }

    /// Key id
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// When this pair was registered with the store
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Signing key for `jsonwebtoken::encode`
    #[must_use]
    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding
    }

    /// Verification key for `jsonwebtoken::decode`
    #[must_use]
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }

    /// Convert the public half to its JWK representation.
    pub fn to_jwk(&self) -> Result<JsonWebKey, KeyError> {
        use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};

        let n = self.public.n().to_bytes_be();
        let e = self.public.e().to_bytes_be();

        Ok(JsonWebKey {
            kty: "RSA".to_string(),
            key_use: "sig".to_string(),
            kid: self.kid.clone(),
            alg: "RS256".to_string(),
            n: URL_SAFE_NO_PAD.encode(n),
            e: URL_SAFE_NO_PAD.encode(e),
        })
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material deliberately excluded
        f.debug_struct("KeyPair")
            .field("kid", &self.kid)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Export a private key and its derived public key as PEM strings.
pub fn export_pem(private: &RsaPrivateKey) -> Result<(String, String), KeyError> {
    let public = RsaPublicKey::from(private);
    let private_pem = private
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| KeyError::Generation(e.to_string()))?
        .to_string();
    let public_pem = public
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| KeyError::Generation(e.to_string()))?;
    Ok((private_pem, public_pem))
}

struct Inner {
    active_kid: Option<String>,
    keys: HashMap<String, Arc<KeyPair>>,
}

/// In-memory registry of signing key pairs with one designated active key.
pub struct KeyStore {
    inner: RwLock<Inner>,
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore").finish_non_exhaustive()
    }
}

impl KeyStore {
    /// Create an empty store. Signing fails with a typed error until keys
    /// are loaded; it never produces an unsigned token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                active_kid: None,
                keys: HashMap::new(),
            }),
        }
    }

    /// Id of the current active signing key, if any.
    #[must_use]
    pub fn active_kid(&self) -> Option<String> {
        self.inner.read().active_kid.clone()
    }

    /// The current active signing key pair, if any.
    #[must_use]
    pub fn active_key(&self) -> Option<Arc<KeyPair>> {
        let inner = self.inner.read();
        let kid = inner.active_kid.as_ref()?;
        inner.keys.get(kid).cloned()
    }

    /// Look up a key pair by id.
    #[must_use]
    pub fn key(&self, kid: &str) -> Option<Arc<KeyPair>> {
        self.inner.read().keys.get(kid).cloned()
    }

    /// All known key ids, sorted.
    #[must_use]
    pub fn all_kids(&self) -> Vec<String> {
        let mut kids: Vec<String> = self.inner.read().keys.keys().cloned().collect();
        kids.sort();
        kids
    }

    /// All key pairs in stable (sorted-kid) order, for verification fallback
    /// and JWKS generation.
    #[must_use]
    pub fn verification_keys(&self) -> Vec<Arc<KeyPair>> {
        let inner = self.inner.read();
        let mut pairs: Vec<Arc<KeyPair>> = inner.keys.values().cloned().collect();
        drop(inner);
        pairs.sort_by(|a, b| a.kid().cmp(b.kid()));
        pairs
    }

    /// Number of keys in the store.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.inner.read().keys.len()
    }

    /// Whether the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().keys.is_empty()
    }

    /// Insert (or overwrite) a key pair. When `make_active` is true the new
    /// key also becomes the active signing key.
    ///
    /// The store holds no derived cache; callers that publish a JWKS must
    /// refresh it after this returns.
    pub fn add(&self, pair: KeyPair, make_active: bool) {
        let kid = pair.kid().to_string();
        let mut inner = self.inner.write();
        inner.keys.insert(kid.clone(), Arc::new(pair));
        if make_active {
            inner.active_kid = Some(kid);
        }
    }

    /// Remove a key pair. Logs and no-ops when `kid` is the active key or
    /// does not exist; returns whether a key was removed.
    pub fn remove(&self, kid: &str) -> bool {
        let mut inner = self.inner.write();
        if inner.active_kid.as_deref() == Some(kid) {
            warn!(kid = %kid, "Refusing to remove the active signing key");
            return false;
        }
        if inner.keys.remove(kid).is_none() {
            warn!(kid = %kid, "Cannot remove unknown key");
            return false;
        }
        true
    }

    /// Promote an existing key to active.
    pub fn set_active(&self, kid: &str) -> Result<(), KeyError> {
        let mut inner = self.inner.write();
        if !inner.keys.contains_key(kid) {
            return Err(KeyError::UnknownKey(kid.to_string()));
        }
        inner.active_kid = Some(kid.to_string());
        Ok(())
    }
}

impl Default for KeyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::store::test_support::pem_pair;

    #[test]
    fn empty_store_has_no_active_key() {
        // GIVEN: a fresh store
        let store = KeyStore::new();

        // THEN: no active key, no keys at all
        assert!(store.active_kid().is_none());
        assert!(store.active_key().is_none());
        assert!(store.is_empty());
        assert_eq!(store.key_count(), 0);
    }

    #[test]
    fn add_with_make_active_promotes() {
        // GIVEN: a store and a parsed key pair
        let store = KeyStore::new();
        let (private_pem, public_pem) = pem_pair();
        let pair = KeyPair::from_pem("auth-2026-01", &private_pem, &public_pem).unwrap();

        // WHEN: added with make_active
        store.add(pair, true);

        // THEN: it is the active key
        assert_eq!(store.active_kid().as_deref(), Some("auth-2026-01"));
        assert_eq!(store.active_key().unwrap().kid(), "auth-2026-01");
        assert_eq!(store.key_count(), 1);
    }

    #[test]
    fn add_without_activating_keeps_previous_active() {
        // GIVEN: a store with an active key
        let store = KeyStore::new();
        let (private_pem, public_pem) = pem_pair();
        store.add(
            KeyPair::from_pem("auth-2026-01", &private_pem, &public_pem).unwrap(),
            true,
        );

        // WHEN: a second key is staged without activation
        store.add(
            KeyPair::from_pem("auth-2026-02", &private_pem, &public_pem).unwrap(),
            false,
        );

        // THEN: active key unchanged, both keys known
        assert_eq!(store.active_kid().as_deref(), Some("auth-2026-01"));
        assert_eq!(store.all_kids(), vec!["auth-2026-01", "auth-2026-02"]);
    }

    #[test]
    fn remove_refuses_active_key() {
        // GIVEN: a store whose only key is active
        let store = KeyStore::new();
        let (private_pem, public_pem) = pem_pair();
        store.add(
            KeyPair::from_pem("auth-2026-01", &private_pem, &public_pem).unwrap(),
            true,
        );

        // WHEN: we try to remove the active key
        let removed = store.remove("auth-2026-01");

        // THEN: no-op, key still present
        assert!(!removed);
        assert_eq!(store.key_count(), 1);
        assert_eq!(store.active_kid().as_deref(), Some("auth-2026-01"));
    }

    #[test]
    fn remove_unknown_key_is_noop() {
        let store = KeyStore::new();
        assert!(!store.remove("does-not-exist"));
    }

    #[test]
    fn remove_inactive_key_succeeds() {
        // GIVEN: two keys, one active
        let store = KeyStore::new();
        let (private_pem, public_pem) = pem_pair();
        store.add(
            KeyPair::from_pem("auth-2026-01", &private_pem, &public_pem).unwrap(),
            false,
        );
        store.add(
            KeyPair::from_pem("auth-2026-02", &private_pem, &public_pem).unwrap(),
            true,
        );

        // WHEN: removing the inactive key
        let removed = store.remove("auth-2026-01");

        // THEN: gone; active key untouched
        assert!(removed);
        assert_eq!(store.all_kids(), vec!["auth-2026-02"]);
        assert_eq!(store.active_kid().as_deref(), Some("auth-2026-02"));
    }

    #[test]
    fn set_active_unknown_key_errors() {
        let store = KeyStore::new();
        let err = store.set_active("ghost").unwrap_err();
        assert!(matches!(err, KeyError::UnknownKey(kid) if kid == "ghost"));
    }

    #[test]
    fn set_active_switches_signing_key() {
        let store = KeyStore::new();
        let (private_pem, public_pem) = pem_pair();
        store.add(
            KeyPair::from_pem("a", &private_pem, &public_pem).unwrap(),
            true,
        );
        store.add(
            KeyPair::from_pem("b", &private_pem, &public_pem).unwrap(),
            false,
        );

        store.set_active("b").unwrap();
        assert_eq!(store.active_kid().as_deref(), Some("b"));
    }

    #[test]
    fn verification_keys_are_in_stable_kid_order() {
        let store = KeyStore::new();
        let (private_pem, public_pem) = pem_pair();
        for kid in ["zeta", "alpha", "mid"] {
            store.add(
                KeyPair::from_pem(kid, &private_pem, &public_pem).unwrap(),
                false,
            );
        }

        let kids: Vec<String> = store
            .verification_keys()
            .iter()
            .map(|p| p.kid().to_string())
            .collect();
        assert_eq!(kids, ["alpha", "mid", "zeta"]);
    }

    #[test]
    fn from_pem_rejects_garbage_material() {
        let err = KeyPair::from_pem("bad", "not a pem", "also not a pem").unwrap_err();
        assert!(matches!(
            err,
            KeyError::InvalidKeyMaterial { kid, .. } if kid == "bad"
        ));
    }

    #[test]
    fn to_jwk_exports_rsa_components() {
        let (private_pem, public_pem) = pem_pair();
        let pair = KeyPair::from_pem("auth-2026-01", &private_pem, &public_pem).unwrap();

        let jwk = pair.to_jwk().unwrap();
        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.key_use, "sig");
        assert_eq!(jwk.alg, "RS256");
        assert_eq!(jwk.kid, "auth-2026-01");
        // base64url, no padding
        assert!(!jwk.n.is_empty());
        assert!(!jwk.n.contains('='));
        assert!(!jwk.e.is_empty());
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::OnceLock;

    use super::export_pem;
    use rsa::RsaPrivateKey;

    /// One 2048-bit PEM pair shared across unit tests — RSA generation is
    /// slow enough that per-test generation dominates the suite runtime.
    pub(crate) fn pem_pair() -> (String, String) {
        static PAIR: OnceLock<(String, String)> = OnceLock::new();
        PAIR.get_or_init(|| {
            use rand::rngs::OsRng;
            let private = RsaPrivateKey::new(&mut OsRng, 2048).expect("test key generation");
            export_pem(&private).expect("test key export")
        })
        .clone()
    }
}
