//! Authentication Gateway Library
//!
//! Turns third-party OAuth2/OpenID-Connect logins (Google, GitHub, LinkedIn)
//! into short-lived RS256-signed session tokens and publishes the public
//! verification material as a JWKS document.
//!
//! # Subsystems
//!
//! - **Key authority**: multi-key [`keys::KeyStore`] with one active signing
//!   key, startup loading from environment slots or key files, JWKS
//!   publishing, and live rotation that never invalidates freshly-issued
//!   tokens.
//! - **Login flow**: per-provider OAuth state machine with CSRF state and
//!   PKCE, unified behind one [`oauth::LoginFlow`].
//! - **Token authority**: [`token::TokenAuthority`] signs claims with the
//!   active key and verifies with kid-directed lookup plus an all-keys
//!   fallback.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod cli;
pub mod config;
pub mod directory;
pub mod error;
pub mod gateway;
pub mod keys;
pub mod oauth;
pub mod token;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
