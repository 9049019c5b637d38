//! Key source — loads signing key material at process start.
//!
//! Two mutually exclusive strategies, selected by the deployment-mode flag:
//!
//! | Mode | Strategy |
//! |------|----------|
//! | `production` | Indexed environment slots `SIGNING_KEY_{n}` / `SIGNING_PUBLIC_KEY_{n}` / `SIGNING_KID_{n}`, n = 1, 2, … |
//! | `development` | One private/public PEM file pair from configured paths |
//!
//! Slot scanning stops at the first missing slot — slot `n + 1` is only
//! consulted when slot `n` exists, so gaps end the scan. A slot with key
//! material but no kid gets the positional fallback `key-{n}`.
//!
//! After loading, the active kid is the configured override when it names a
//! loaded key; otherwise the lexicographically-last loaded kid. That
//! fallback is a deterministic heuristic, not a guarantee of "most recent" —
//! date-shaped kids (`auth-2026-08`) happen to sort newest-last.
//!
//! Environment access is injected as a lookup function so tests construct
//! isolated sources without touching the process environment.

use std::fs;
use std::sync::Arc;

use tracing::{info, warn};

use super::store::{KeyPair, KeyStore};
use crate::config::{DeploymentMode, KeysConfig};
use crate::{Error, Result};

/// Environment slot names for indexed key loading.
const ENV_PRIVATE: &str = "SIGNING_KEY";
const ENV_PUBLIC: &str = "SIGNING_PUBLIC_KEY";
const ENV_KID: &str = "SIGNING_KID";

/// Default kid for the development file-pair strategy.
const DEFAULT_FILE_KID: &str = "local-dev";

/// Load signing keys per the configured strategy and resolve the active kid.
///
/// A zero-key outcome is not an error: the store is returned empty (with a
/// warning) and every downstream signing operation fails with a typed
/// unavailable error instead.
pub fn load_keys(
    config: &KeysConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Arc<KeyStore>> {
    let store = Arc::new(KeyStore::new());

    match config.mode {
        DeploymentMode::Production => load_indexed_env(&store, &env),
        DeploymentMode::Development => load_file_pair(&store, config)?,
    }

    resolve_active(&store, config.active_kid.as_deref());

    if store.is_empty() {
        warn!("No signing keys loaded — token issuance is unavailable until keys are configured");
    } else {
        info!(
            keys = store.key_count(),
            active = store.active_kid().as_deref().unwrap_or("<none>"),
            "Signing keys loaded"
        );
    }

    Ok(store)
}

/// Scan sequential environment slots `1, 2, 3, …` for key triples.
fn load_indexed_env(store: &KeyStore, env: &impl Fn(&str) -> Option<String>) {
    for n in 1.. {
        let private_pem = env(&format!("{ENV_PRIVATE}_{n}"));
        let public_pem = env(&format!("{ENV_PUBLIC}_{n}"));

        // First missing slot ends the scan; no gaps permitted.
        let (Some(private_pem), Some(public_pem)) = (private_pem, public_pem) else {
            break;
        };

        let kid = env(&format!("{ENV_KID}_{n}")).unwrap_or_else(|| format!("key-{n}"));

        match KeyPair::from_pem(&kid, &private_pem, &public_pem) {
            Ok(pair) => {
                info!(kid = %kid, slot = n, "Loaded signing key from environment");
                store.add(pair, false);
            }
            Err(e) => {
                warn!(kid = %kid, slot = n, error = %e, "Skipping unparseable key slot");
            }
        }
    }
}

/// Read one private/public PEM file pair.
fn load_file_pair(store: &KeyStore, config: &KeysConfig) -> Result<()> {
    let (Some(private_path), Some(public_path)) =
        (&config.private_key_file, &config.public_key_file)
    else {
        warn!("Development mode without key file paths configured — no keys loaded");
        return Ok(());
    };

    let private_pem = fs::read_to_string(private_path).map_err(|e| {
        Error::Config(format!("Cannot read private key file {private_path}: {e}"))
    })?;
    let public_pem = fs::read_to_string(public_path)
        .map_err(|e| Error::Config(format!("Cannot read public key file {public_path}: {e}")))?;

    let kid = config
        .file_kid
        .clone()
        .unwrap_or_else(|| DEFAULT_FILE_KID.to_string());

    let pair = KeyPair::from_pem(&kid, &private_pem, &public_pem)?;
    info!(kid = %kid, file = %private_path, "Loaded signing key from file pair");
    store.add(pair, false);
    Ok(())
}

/// Resolve the active kid: explicit override when valid, else the
/// lexicographically-last loaded kid.
fn resolve_active(store: &KeyStore, configured: Option<&str>) {
    if store.is_empty() {
        return;
    }

    if let Some(kid) = configured {
        if store.set_active(kid).is_ok() {
            return;
        }
        warn!(kid = %kid, "Configured active kid is not among the loaded keys, falling back");
    }

    let kids = store.all_kids();
    if let Some(last) = kids.last() {
        // all_kids is sorted, so last() is the lexicographic maximum
        let _ = store.set_active(last);
    }
}
