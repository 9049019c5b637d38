//! Key rotation — the only component permitted to mutate the key store
//! after startup.
//!
//! # Operations
//!
//! | Operation | Effect |
//! |-----------|--------|
//! | `rotate` | Add a new key and promote it to active. The outgoing key is retained for verification. |
//! | `add_inactive` | Stage a key without the cutover (publish ahead of rotation). |
//! | `purge` | Drop retired keys, never the active one. |
//! | `status` | Read-only projection for observability. |
//!
//! Every mutation refreshes the JWKS publisher before returning, so a
//! verifier can never observe a rotation ahead of the published document.
//!
//! Operational guidance: purge only after a grace period at least as long as
//! the token lifetime, so tokens signed moments before the cutover stay
//! verifiable until they expire on their own.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use super::jwks::JwksPublisher;
use super::store::{KeyError, KeyPair, KeyStore};

/// Result of a completed rotation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationOutcome {
    /// Active kid before the rotation (absent on first rotation into an
    /// empty store)
    pub previous_active: Option<String>,
    /// The newly active kid
    pub new_active: String,
    /// Total keys now held
    pub total_keys: usize,
}

/// Result of a purge pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeOutcome {
    /// Kids that were removed
    pub removed: Vec<String>,
    /// Kids still held after the pass
    pub remaining: Vec<String>,
}

/// Read-only key store projection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyStatus {
    /// Current active kid
    pub active_kid: Option<String>,
    /// All known kids, sorted
    pub available_kids: Vec<String>,
    /// Number of keys held
    pub key_count: usize,
}

/// Orchestrates key store mutations and the JWKS refresh that must follow
/// each one.
pub struct RotationController {
    store: Arc<KeyStore>,
    publisher: Arc<JwksPublisher>,
}

impl RotationController {
    /// Create a controller over a store and its publisher.
    #[must_use]
    pub fn new(store: Arc<KeyStore>, publisher: Arc<JwksPublisher>) -> Self {
        Self { store, publisher }
    }

    /// Add a new key and promote it to active.
    ///
    /// Fails fast with [`KeyError::InvalidKeyMaterial`] before touching the
    /// store, so a failed rotation leaves it unchanged. The previous active
    /// key is deliberately not removed — it stays valid for verification
    /// until an explicit purge.
    pub fn rotate(
        &self,
        kid: &str,
        private_pem: &str,
        public_pem: &str,
    ) -> Result<RotationOutcome, KeyError> {
        let pair = KeyPair::from_pem(kid, private_pem, public_pem)?;

        let previous_active = self.store.active_kid();
        self.store.add(pair, true);
        self.publisher.refresh();

        let outcome = RotationOutcome {
            previous_active,
            new_active: kid.to_string(),
            total_keys: self.store.key_count(),
        };
        info!(
            new_active = %outcome.new_active,
            previous = outcome.previous_active.as_deref().unwrap_or("<none>"),
            total = outcome.total_keys,
            "Signing key rotated"
        );
        Ok(outcome)
    }

    /// Stage a key without activating it, for rotations where the public key
    /// is published ahead of the cutover.
    pub fn add_inactive(
        &self,
        kid: &str,
        private_pem: &str,
        public_pem: &str,
    ) -> Result<KeyStatus, KeyError> {
        let pair = KeyPair::from_pem(kid, private_pem, public_pem)?;

        self.store.add(pair, false);
        self.publisher.refresh();

        info!(kid = %kid, "Signing key staged (not active)");
        Ok(self.status())
    }

    /// Remove retired keys.
    ///
    /// With an explicit kid list, each listed key is removed unless it is
    /// the active key (skipped with a warning, never an error). Without a
    /// list, every non-active key older than `min_age` is removed; pass no
    /// `min_age` to drop all non-active keys.
    pub fn purge(&self, explicit: Option<&[String]>, min_age: Option<Duration>) -> PurgeOutcome {
        let active = self.store.active_kid();
        let candidates: Vec<String> = match explicit {
            Some(kids) => kids.to_vec(),
            None => self
                .store
                .all_kids()
                .into_iter()
                .filter(|kid| Some(kid) != active.as_ref())
                .collect(),
        };

        let mut removed = Vec::new();
        for kid in candidates {
            if Some(&kid) == active.as_ref() {
                warn!(kid = %kid, "Purge skipping the active signing key");
                continue;
            }

            // Age check applies only to the implicit sweep; an explicit list
            // is operator intent.
            if explicit.is_none() {
                if let (Some(min_age), Some(pair)) = (min_age, self.store.key(&kid)) {
                    let age = Utc::now().signed_duration_since(pair.created_at());
                    if age.num_seconds() < min_age.as_secs() as i64 {
                        info!(kid = %kid, "Purge skipping key younger than the minimum age");
                        continue;
                    }
                }
            }

            if self.store.remove(&kid) {
                removed.push(kid);
            }
        }

        self.publisher.refresh();

        let outcome = PurgeOutcome {
            removed,
            remaining: self.store.all_kids(),
        };
        info!(
            removed = outcome.removed.len(),
            remaining = outcome.remaining.len(),
            "Key purge complete"
        );
        outcome
    }

    /// Read-only projection of the key store.
    #[must_use]
    pub fn status(&self) -> KeyStatus {
        KeyStatus {
            active_kid: self.store.active_kid(),
            available_kids: self.store.all_kids(),
            key_count: self.store.key_count(),
        }
    }
}
