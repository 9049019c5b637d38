//! OpenID Connect discovery — fetches and caches Google's provider
//! metadata document.
//!
//! The document is fetched lazily on first use and cached for a TTL
//! (default 1 hour); Google rotates endpoints rarely enough that a stale
//! window here is harmless, unlike the JWKS cache which is refreshed
//! synchronously on rotation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::FlowError;

/// Google's OIDC discovery endpoint.
pub const GOOGLE_DISCOVERY_URL: &str =
    "https://accounts.google.com/.well-known/openid-configuration";

/// OpenID Connect provider metadata (the subset this gateway consumes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    /// Issuer URL
    pub issuer: String,
    /// Authorization endpoint URL
    pub authorization_endpoint: String,
    /// Token endpoint URL
    pub token_endpoint: String,
    /// Userinfo endpoint URL
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    /// JWKS URI (published for completeness; this gateway verifies identity
    /// via the userinfo endpoint)
    #[serde(default)]
    pub jwks_uri: Option<String>,
    /// Supported PKCE code challenge methods
    #[serde(default)]
    pub code_challenge_methods_supported: Vec<String>,
}

impl DiscoveryDocument {
    /// Check if PKCE is supported (S256 method)
    #[must_use]
    pub fn supports_pkce(&self) -> bool {
        self.code_challenge_methods_supported
            .contains(&"S256".to_string())
    }
}

struct Cached {
    doc: Arc<DiscoveryDocument>,
    fetched_at: Instant,
}

/// TTL cache over one discovery document.
pub struct DiscoveryCache {
    http: Client,
    url: String,
    ttl: Duration,
    cached: RwLock<Option<Cached>>,
}

impl DiscoveryCache {
    /// Create a cache for the given discovery URL with a 1-hour TTL.
    #[must_use]
    pub fn new(http: Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
            ttl: Duration::from_secs(3600),
            cached: RwLock::new(None),
        }
    }

    /// Return the cached document, fetching when absent or stale.
    pub async fn get(&self) -> Result<Arc<DiscoveryDocument>, FlowError> {
        {
            let cached = self.cached.read();
            if let Some(c) = cached.as_ref() {
                if c.fetched_at.elapsed() < self.ttl {
                    return Ok(Arc::clone(&c.doc));
                }
            }
        }

        debug!(url = %self.url, "Fetching OIDC discovery document");
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FlowError::Upstream(format!("discovery fetch failed: {e}")))?;

        if !response.status().is_success() {
            return Err(FlowError::Upstream(format!(
                "discovery fetch failed: HTTP {}",
                response.status()
            )));
        }

        let doc: DiscoveryDocument = response
            .json()
            .await
            .map_err(|e| FlowError::Upstream(format!("invalid discovery document: {e}")))?;

        let doc = Arc::new(doc);
        *self.cached.write() = Some(Cached {
            doc: Arc::clone(&doc),
            fetched_at: Instant::now(),
        });

        Ok(doc)
    }
}
