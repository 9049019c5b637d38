//! Configuration management
//!
//! Configuration is layered: YAML file first, then `AUTH_GATEWAY_`-prefixed
//! environment variables (nested keys split on `__`). Secrets support the
//! `env:VAR_NAME` indirection so key material and client secrets never live
//! in the config file itself.

use std::{env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Loaded in order, later files override earlier. Variables are set into
    /// the process environment so `env:VAR` references resolve.
    #[serde(default)]
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// Token issuance configuration
    pub token: TokenConfig,
    /// Signing key configuration
    pub keys: KeysConfig,
    /// OAuth provider configuration
    pub providers: ProvidersConfig,
    /// Directory (Coordinator) lookup configuration
    pub directory: DirectoryConfig,
    /// Post-login redirect destinations
    pub pages: PagesConfig,
    /// Operator endpoints configuration
    pub admin: AdminConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Externally visible base URL (used to build OAuth redirect URIs)
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 39500,
            request_timeout: Duration::from_secs(30),
            public_url: "http://127.0.0.1:39500".to_string(),
        }
    }
}

/// Token issuance configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Lifetime of issued session tokens. One global value, not per-request.
    #[serde(with = "humantime_serde")]
    pub lifetime: Duration,
    /// `iss` claim embedded in every token
    pub issuer: String,
    /// `aud` claim embedded in every token
    pub audience: String,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            lifetime: Duration::from_secs(15 * 60),
            issuer: "auth-gateway".to_string(),
            audience: "internal-services".to_string(),
        }
    }
}

/// Deployment mode — selects the key loading strategy at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    /// Load keys from indexed environment slots (`SIGNING_KEY_1`, …)
    #[default]
    Production,
    /// Load a single key pair from PEM files on disk
    Development,
}

/// Signing key configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct KeysConfig {
    /// Deployment mode (selects environment-slot or file-pair loading)
    pub mode: DeploymentMode,
    /// Explicit active key id. When unset or not among the loaded keys, the
    /// lexicographically-last loaded kid is chosen as a deterministic
    /// fallback.
    pub active_kid: Option<String>,
    /// Private key PEM path (development mode)
    pub private_key_file: Option<String>,
    /// Public key PEM path (development mode)
    pub public_key_file: Option<String>,
    /// Key id assigned to the file-pair key (development mode)
    pub file_kid: Option<String>,
}

/// OAuth provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct ProvidersConfig {
    /// Google (OpenID Connect with discovery + PKCE)
    pub google: Option<ProviderSettings>,
    /// GitHub (raw OAuth2 authorization-code)
    pub github: Option<ProviderSettings>,
    /// LinkedIn (raw OAuth2 authorization-code)
    pub linkedin: Option<ProviderSettings>,
}

/// Per-provider OAuth client credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// OAuth client id (supports `env:VAR_NAME`)
    pub client_id: String,
    /// OAuth client secret (supports `env:VAR_NAME`)
    pub client_secret: String,
}

impl ProviderSettings {
    /// Resolve the client id (expand `env:VAR` indirection)
    #[must_use]
    pub fn resolve_client_id(&self) -> String {
        resolve_env_ref(&self.client_id)
    }

    /// Resolve the client secret (expand `env:VAR` indirection)
    #[must_use]
    pub fn resolve_client_secret(&self) -> String {
        resolve_env_ref(&self.client_secret)
    }
}

/// Directory (Coordinator) lookup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Coordinator endpoint URL for user lookups
    pub coordinator_url: String,
    /// Timeout for a single lookup request
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            coordinator_url: "http://127.0.0.1:39510/coordinator".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Post-login redirect destinations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PagesConfig {
    /// Destination after a successful login
    pub success_url: String,
    /// Destination after a failed login (the error reason is appended as a
    /// query parameter)
    pub failure_url: String,
}

impl Default for PagesConfig {
    fn default() -> Self {
        Self {
            success_url: "/".to_string(),
            failure_url: "/login".to_string(),
        }
    }
}

/// Operator endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct AdminConfig {
    /// Bearer token guarding the key-rotation control endpoints
    /// (supports `env:VAR_NAME`). When unset, those endpoints return 503.
    pub bearer_token: Option<String>,
}

impl AdminConfig {
    /// Resolve the admin bearer token (expand `env:VAR` indirection)
    #[must_use]
    pub fn resolve_bearer_token(&self) -> Option<String> {
        self.bearer_token.as_deref().map(resolve_env_ref)
    }
}

/// Expand an `env:VAR_NAME` reference, or return the value as-is.
fn resolve_env_ref(value: &str) -> String {
    if let Some(var_name) = value.strip_prefix("env:") {
        env::var(var_name).unwrap_or_else(|_| value.to_string())
    } else {
        value.to_string()
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (AUTH_GATEWAY_ prefix)
        figment = figment.merge(Env::prefixed("AUTH_GATEWAY_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        // Load env files into process environment (before env var expansion)
        config.load_env_files();

        // Expand ${VAR} in string-valued settings
        config.expand_env_vars();

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let path = Path::new(path_str);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => {
                        tracing::info!("Loaded env file: {path_str}");
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load env file {path_str}: {e}");
                    }
                }
            } else {
                tracing::debug!("Env file not found (skipped): {path_str}");
            }
        }
    }

    /// Expand ${VAR} and ${VAR:-default} patterns in config values
    fn expand_env_vars(&mut self) {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").unwrap();

        self.server.public_url = Self::expand_string(&re, &self.server.public_url);
        self.directory.coordinator_url = Self::expand_string(&re, &self.directory.coordinator_url);

        for settings in [
            self.providers.google.as_mut(),
            self.providers.github.as_mut(),
            self.providers.linkedin.as_mut(),
        ]
        .into_iter()
        .flatten()
        {
            settings.client_id = Self::expand_string(&re, &settings.client_id);
            settings.client_secret = Self::expand_string(&re, &settings.client_secret);
        }
    }

    /// Expand environment variables in a string
    fn expand_string(re: &Regex, value: &str) -> String {
        re.replace_all(value, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map_or("", |m| m.as_str());
            env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
    }
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to human-readable string (e.g., "30s")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    }

    /// Deserialize human-readable duration string (e.g., "30s", "15m", "100ms")
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(serde::de::Error::custom)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(serde::de::Error::custom)
        } else if let Some(hours) = s.strip_suffix('h') {
            hours
                .parse::<u64>()
                .map(|h| Duration::from_secs(h * 3600))
                .map_err(serde::de::Error::custom)
        } else {
            // Assume seconds
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_sensible() {
        let config = Config::default();
        assert_eq!(config.server.port, 39500);
        assert_eq!(config.token.lifetime, Duration::from_secs(900));
        assert_eq!(config.token.issuer, "auth-gateway");
        assert_eq!(config.keys.mode, DeploymentMode::Production);
        assert!(config.providers.google.is_none());
        assert!(config.admin.bearer_token.is_none());
    }

    #[test]
    fn config_deserialized_from_yaml() {
        let yaml = r#"
server:
  host: "0.0.0.0"
  port: 8443
  public_url: "https://auth.example.com"
token:
  lifetime: 15m
  issuer: "https://auth.example.com"
  audience: "example-services"
keys:
  mode: development
  private_key_file: /etc/keys/signing.pem
  public_key_file: /etc/keys/signing.pub.pem
  file_kid: auth-2026-08
providers:
  google:
    client_id: "abc.apps.googleusercontent.com"
    client_secret: "env:GOOGLE_CLIENT_SECRET"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 8443);
        assert_eq!(config.token.lifetime, Duration::from_secs(900));
        assert_eq!(config.keys.mode, DeploymentMode::Development);
        assert_eq!(config.keys.file_kid.as_deref(), Some("auth-2026-08"));
        assert!(config.providers.google.is_some());
        assert!(config.providers.linkedin.is_none());
    }

    #[test]
    fn humantime_parses_all_suffixes() {
        #[derive(Deserialize)]
        struct D {
            #[serde(with = "humantime_serde")]
            d: Duration,
        }

        let parse = |s: &str| serde_yaml::from_str::<D>(&format!("d: {s}")).unwrap().d;
        assert_eq!(parse("30s"), Duration::from_secs(30));
        assert_eq!(parse("15m"), Duration::from_secs(900));
        assert_eq!(parse("2h"), Duration::from_secs(7200));
        assert_eq!(parse("250ms"), Duration::from_millis(250));
        assert_eq!(parse("\"45\""), Duration::from_secs(45));
    }

    #[test]
    fn env_ref_resolution() {
        // GIVEN: an env-indirected secret, loaded via an env file
        // (env::set_var is unsafe in edition 2024 and the lib forbids unsafe)
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join("secret.env");
        let mut f = std::fs::File::create(&env_path).unwrap();
        writeln!(f, "AUTH_GW_TEST_SECRET=s3cret").unwrap();
        drop(f);
        dotenvy::from_path(&env_path).unwrap();

        let settings = ProviderSettings {
            client_id: "plain-id".to_string(),
            client_secret: "env:AUTH_GW_TEST_SECRET".to_string(),
        };

        // THEN: plain values pass through, env: refs resolve
        assert_eq!(settings.resolve_client_id(), "plain-id");
        assert_eq!(settings.resolve_client_secret(), "s3cret");
    }

    #[test]
    fn env_ref_missing_var_passes_through() {
        let settings = ProviderSettings {
            client_id: "env:AUTH_GW_TEST_DOES_NOT_EXIST".to_string(),
            client_secret: String::new(),
        };
        assert_eq!(
            settings.resolve_client_id(),
            "env:AUTH_GW_TEST_DOES_NOT_EXIST"
        );
    }

    #[test]
    fn load_env_files_skips_missing() {
        let config = Config {
            env_files: vec!["/nonexistent/path/.env".to_string()],
            ..Default::default()
        };
        // Should not panic
        config.load_env_files();
    }

    #[test]
    fn load_env_files_sets_env_vars() {
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join("test.env");
        let mut f = std::fs::File::create(&env_path).unwrap();
        writeln!(f, "AUTH_GW_TEST_FROM_FILE=hello").unwrap();
        drop(f);

        let config = Config {
            env_files: vec![env_path.to_string_lossy().to_string()],
            ..Default::default()
        };
        config.load_env_files();

        assert_eq!(env::var("AUTH_GW_TEST_FROM_FILE").unwrap(), "hello");
    }
}
