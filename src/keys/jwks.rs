//! JWKS publishing — derives the public verification document from the
//! key store.
//!
//! The document is cached and regenerated only on [`JwksPublisher::refresh`].
//! The publisher does not observe the store: every store mutation must be
//! followed by a `refresh()` call before the mutation can be considered
//! visible (the rotation controller owns that sequencing). A stale cache
//! window is a correctness bug, not a performance tradeoff.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::store::KeyStore;

/// JWK (JSON Web Key) representation of one RSA public key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonWebKey {
    /// Key type (always "RSA")
    pub kty: String,
    /// Public key use (always "sig")
    #[serde(rename = "use")]
    pub key_use: String,
    /// Key id, matching the `kid` embedded in token headers
    pub kid: String,
    /// Algorithm (RS256)
    pub alg: String,
    /// RSA modulus (base64url)
    pub n: String,
    /// RSA exponent (base64url)
    pub e: String,
}

/// JWKS (JSON Web Key Set) container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonWebKeySet {
    /// Public keys, ordered by kid
    pub keys: Vec<JsonWebKey>,
}

/// Cached JWKS document derived from a [`KeyStore`].
pub struct JwksPublisher {
    store: Arc<KeyStore>,
    cached: RwLock<Option<Arc<JsonWebKeySet>>>,
}

impl JwksPublisher {
    /// Create a publisher over a store. The document is built lazily on the
    /// first [`document`](Self::document) call.
    #[must_use]
    pub fn new(store: Arc<KeyStore>) -> Self {
        Self {
            store,
            cached: RwLock::new(None),
        }
    }

    /// Return the current JWKS document, building it if no cached copy
    /// exists. An empty key store yields a document with an empty `keys`
    /// list — verifiers treat that as "nothing to validate against", not an
    /// error.
    #[must_use]
    pub fn document(&self) -> Arc<JsonWebKeySet> {
        if let Some(doc) = self.cached.read().as_ref() {
            return Arc::clone(doc);
        }

        let doc = Arc::new(self.build());
        *self.cached.write() = Some(Arc::clone(&doc));
        doc
    }

    /// Rebuild the cached document from the store's current state.
    ///
    /// Called synchronously by the rotation controller after every store
    /// mutation, before the mutation is reported back to the operator.
    pub fn refresh(&self) {
        let doc = Arc::new(self.build());
        debug!(keys = doc.keys.len(), "JWKS document refreshed");
        *self.cached.write() = Some(doc);
    }

    /// Convert every stored public key to its JWK form. Keys that fail
    /// conversion are logged and skipped — one bad key never aborts the
    /// whole document.
    fn build(&self) -> JsonWebKeySet {
        let mut keys = Vec::new();
        for pair in self.store.verification_keys() {
            match pair.to_jwk() {
                Ok(jwk) => keys.push(jwk),
                Err(e) => {
                    warn!(kid = %pair.kid(), error = %e, "Skipping key that failed JWK conversion");
                }
            }
        }
        JsonWebKeySet { keys }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::store::{KeyPair, test_support::pem_pair};

    fn store_with(kids: &[&str]) -> Arc<KeyStore> {
        let store = Arc::new(KeyStore::new());
        let (private_pem, public_pem) = pem_pair();
        for kid in kids {
            store.add(KeyPair::from_pem(kid, &private_pem, &public_pem).unwrap(), true);
        }
        store
    }

    #[test]
    fn empty_store_yields_empty_key_list() {
        // GIVEN: a publisher over an empty store
        let publisher = JwksPublisher::new(Arc::new(KeyStore::new()));

        // THEN: the document exists with zero keys
        assert!(publisher.document().keys.is_empty());
    }

    #[test]
    fn document_contains_one_entry_per_key() {
        let publisher = JwksPublisher::new(store_with(&["auth-2026-01", "auth-2026-02"]));

        let doc = publisher.document();
        let kids: Vec<&str> = doc.keys.iter().map(|k| k.kid.as_str()).collect();
        assert_eq!(kids, vec!["auth-2026-01", "auth-2026-02"]);
        assert!(doc.keys.iter().all(|k| k.key_use == "sig" && k.alg == "RS256"));
    }

    #[test]
    fn document_is_cached_until_refresh() {
        // GIVEN: a published document
        let store = store_with(&["auth-2026-01"]);
        let publisher = JwksPublisher::new(Arc::clone(&store));
        assert_eq!(publisher.document().keys.len(), 1);

        // WHEN: the store mutates without a refresh
        let (private_pem, public_pem) = pem_pair();
        store.add(
            KeyPair::from_pem("auth-2026-02", &private_pem, &public_pem).unwrap(),
            false,
        );

        // THEN: the cached document is still served
        assert_eq!(publisher.document().keys.len(), 1);

        // WHEN: refreshed
        publisher.refresh();

        // THEN: the new key appears
        assert_eq!(publisher.document().keys.len(), 2);
    }

    #[test]
    fn document_serializes_to_standard_jwks_shape() {
        let publisher = JwksPublisher::new(store_with(&["auth-2026-01"]));

        let json = serde_json::to_value(publisher.document().as_ref()).unwrap();
        let key = &json["keys"][0];
        assert_eq!(key["kty"], "RSA");
        assert_eq!(key["use"], "sig");
        assert_eq!(key["kid"], "auth-2026-01");
        assert_eq!(key["alg"], "RS256");
        assert!(key["n"].is_string());
        assert!(key["e"].is_string());
    }
}
