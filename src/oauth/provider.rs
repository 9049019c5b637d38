//! Provider dispatch — the capability interface behind which the three
//! providers' protocol differences live.
//!
//! | Provider | Protocol | Authorization / token endpoints | Identity |
//! |----------|----------|---------------------------------|----------|
//! | Google | OIDC + PKCE | via discovery metadata | userinfo endpoint |
//! | GitHub | raw OAuth2 | static | `/user`, plus `/user/emails` for the primary address |
//! | LinkedIn | raw OAuth2 | static | OIDC userinfo endpoint |
//!
//! [`IdentityBroker`] is the seam the login flow drives; the one production
//! implementation, [`HttpIdentityBroker`], dispatches on the [`Provider`]
//! variant. Tests substitute a fake broker to exercise the flow's gates
//! without a network.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::FlowError;
use super::discovery::{DiscoveryCache, GOOGLE_DISCOVERY_URL};
use crate::config::ProvidersConfig;

const GITHUB_AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GITHUB_USER_URL: &str = "https://api.github.com/user";
const GITHUB_EMAILS_URL: &str = "https://api.github.com/user/emails";

const LINKEDIN_AUTHORIZE_URL: &str = "https://www.linkedin.com/oauth/v2/authorization";
const LINKEDIN_TOKEN_URL: &str = "https://www.linkedin.com/oauth/v2/accessToken";
const LINKEDIN_USERINFO_URL: &str = "https://api.linkedin.com/v2/userinfo";

/// GitHub requires a User-Agent on API requests.
const USER_AGENT: &str = concat!("auth-gateway/", env!("CARGO_PKG_VERSION"));

/// The supported login providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Google — OpenID Connect with discovery and PKCE
    Google,
    /// GitHub — raw OAuth2 authorization-code
    Github,
    /// LinkedIn — raw OAuth2 authorization-code
    Linkedin,
}

impl Provider {
    /// Lowercase name used in routes, cookie names and directory lookups.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Github => "github",
            Self::Linkedin => "linkedin",
        }
    }

    /// Whether this provider's flow binds the code exchange with PKCE.
    #[must_use]
    pub fn uses_pkce(self) -> bool {
        matches!(self, Self::Google)
    }

    /// OAuth scopes requested at authorization.
    #[must_use]
    pub fn scopes(self) -> &'static str {
        match self {
            Self::Google => "openid email profile",
            Self::Github => "read:user user:email",
            Self::Linkedin => "openid profile email",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google" => Ok(Self::Google),
            "github" => Ok(Self::Github),
            "linkedin" => Ok(Self::Linkedin),
            other => Err(FlowError::UnsupportedProvider(other.to_string())),
        }
    }
}

/// Identity fields a provider hands back after a successful exchange.
///
/// `email` stays optional here; the flow turns its absence into
/// `IdentityIncomplete`.
#[derive(Debug, Clone, Default)]
pub struct ProviderIdentity {
    /// Provider-side subject id, when supplied
    pub subject: Option<String>,
    /// Email address, when supplied and verified
    pub email: Option<String>,
    /// Display name, when supplied
    pub name: Option<String>,
}

/// Capability interface the login flow drives: build the authorization URL,
/// exchange the code, fetch the verified identity.
#[async_trait]
pub trait IdentityBroker: Send + Sync + 'static {
    /// Build the provider-specific authorization URL for a login attempt.
    async fn authorization_url(
        &self,
        provider: Provider,
        state: &str,
        code_challenge: Option<&str>,
    ) -> Result<Url, FlowError>;

    /// Exchange an authorization code for an access token.
    async fn exchange_code(
        &self,
        provider: Provider,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<String, FlowError>;

    /// Fetch the verified identity behind an access token.
    async fn fetch_identity(
        &self,
        provider: Provider,
        access_token: &str,
    ) -> Result<ProviderIdentity, FlowError>;
}

/// Resolved OAuth client credentials for one provider.
struct Credentials {
    client_id: String,
    client_secret: String,
}

/// The production broker: real HTTP against the providers, variant dispatch
/// per operation.
pub struct HttpIdentityBroker {
    http: Client,
    credentials: HashMap<Provider, Credentials>,
    discovery: DiscoveryCache,
    redirect_base: String,
}

impl HttpIdentityBroker {
    /// Build a broker from configuration. Providers without configured
    /// credentials are simply not registered; attempts against them fail
    /// with `UnsupportedProvider`.
    #[must_use]
    pub fn new(http: Client, providers: &ProvidersConfig, public_url: &str) -> Self {
        let mut credentials = HashMap::new();
        for (provider, settings) in [
            (Provider::Google, providers.google.as_ref()),
            (Provider::Github, providers.github.as_ref()),
            (Provider::Linkedin, providers.linkedin.as_ref()),
        ] {
            if let Some(settings) = settings {
                credentials.insert(
                    provider,
                    Credentials {
                        client_id: settings.resolve_client_id(),
                        client_secret: settings.resolve_client_secret(),
                    },
                );
            }
        }

        Self {
            discovery: DiscoveryCache::new(http.clone(), GOOGLE_DISCOVERY_URL),
            http,
            credentials,
            redirect_base: public_url.trim_end_matches('/').to_string(),
        }
    }

    /// Providers with registered credentials.
    #[must_use]
    pub fn registered(&self) -> Vec<Provider> {
        let mut providers: Vec<Provider> = self.credentials.keys().copied().collect();
        providers.sort_by_key(|p| p.as_str());
        providers
    }

    fn credentials(&self, provider: Provider) -> Result<&Credentials, FlowError> {
        self.credentials
            .get(&provider)
            .ok_or_else(|| FlowError::UnsupportedProvider(provider.to_string()))
    }

    /// Callback URL registered with the provider.
    fn redirect_uri(&self, provider: Provider) -> String {
        format!("{}/auth/{provider}/callback", self.redirect_base)
    }

    async fn authorization_endpoint(&self, provider: Provider) -> Result<String, FlowError> {
        match provider {
            Provider::Google => Ok(self.discovery.get().await?.authorization_endpoint.clone()),
            Provider::Github => Ok(GITHUB_AUTHORIZE_URL.to_string()),
            Provider::Linkedin => Ok(LINKEDIN_AUTHORIZE_URL.to_string()),
        }
    }

    async fn token_endpoint(&self, provider: Provider) -> Result<String, FlowError> {
        match provider {
            Provider::Google => Ok(self.discovery.get().await?.token_endpoint.clone()),
            Provider::Github => Ok(GITHUB_TOKEN_URL.to_string()),
            Provider::Linkedin => Ok(LINKEDIN_TOKEN_URL.to_string()),
        }
    }
}

/// OAuth token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Userinfo response shape shared by Google and LinkedIn (OIDC userinfo).
#[derive(Debug, Deserialize)]
struct UserinfoResponse {
    sub: Option<String>,
    email: Option<String>,
    name: Option<String>,
}

/// GitHub `/user` response (subset).
#[derive(Debug, Deserialize)]
struct GithubUser {
    id: Option<u64>,
    email: Option<String>,
    name: Option<String>,
}

/// GitHub `/user/emails` entry.
#[derive(Debug, Deserialize)]
struct GithubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

#[async_trait]
impl IdentityBroker for HttpIdentityBroker {
    async fn authorization_url(
        &self,
        provider: Provider,
        state: &str,
        code_challenge: Option<&str>,
    ) -> Result<Url, FlowError> {
        let creds = self.credentials(provider)?;
        let endpoint = self.authorization_endpoint(provider).await?;

        let mut url = Url::parse(&endpoint)
            .map_err(|e| FlowError::Upstream(format!("invalid authorization endpoint: {e}")))?;

        {
            let mut params = url.query_pairs_mut();
            params.append_pair("response_type", "code");
            params.append_pair("client_id", &creds.client_id);
            params.append_pair("redirect_uri", &self.redirect_uri(provider));
            params.append_pair("scope", provider.scopes());
            params.append_pair("state", state);

            if let Some(challenge) = code_challenge {
                params.append_pair("code_challenge", challenge);
                params.append_pair("code_challenge_method", "S256");
            }
        }

        debug!(provider = %provider, "Built authorization URL");
        Ok(url)
    }

    async fn exchange_code(
        &self,
        provider: Provider,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<String, FlowError> {
        let creds = self.credentials(provider)?;
        let endpoint = self.token_endpoint(provider).await?;
        let redirect_uri = self.redirect_uri(provider);

        let mut params = HashMap::new();
        params.insert("grant_type", "authorization_code");
        params.insert("code", code);
        params.insert("redirect_uri", &redirect_uri);
        params.insert("client_id", &creds.client_id);
        params.insert("client_secret", &creds.client_secret);
        if let Some(verifier) = code_verifier {
            params.insert("code_verifier", verifier);
        }

        let response = self
            .http
            .post(&endpoint)
            // GitHub defaults to form-encoded responses without this
            .header("Accept", "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| FlowError::Upstream(format!("token request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(FlowError::ExchangeFailed(format!("HTTP {status} - {body}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| FlowError::ExchangeFailed(format!("unparseable token response: {e}")))?;

        if let Some(error) = token.error {
            let detail = token.error_description.unwrap_or_default();
            return Err(FlowError::ExchangeFailed(format!("{error} {detail}")));
        }

        token
            .access_token
            .ok_or_else(|| FlowError::ExchangeFailed("response carried no access token".into()))
    }

    async fn fetch_identity(
        &self,
        provider: Provider,
        access_token: &str,
    ) -> Result<ProviderIdentity, FlowError> {
        match provider {
            Provider::Google => {
                let endpoint = self
                    .discovery
                    .get()
                    .await?
                    .userinfo_endpoint
                    .clone()
                    .ok_or_else(|| {
                        FlowError::Upstream("discovery document lacks a userinfo endpoint".into())
                    })?;
                self.fetch_userinfo(&endpoint, access_token).await
            }
            Provider::Linkedin => self.fetch_userinfo(LINKEDIN_USERINFO_URL, access_token).await,
            Provider::Github => self.fetch_github_identity(access_token).await,
        }
    }
}

impl HttpIdentityBroker {
    /// OIDC userinfo fetch shared by Google and LinkedIn.
    async fn fetch_userinfo(
        &self,
        endpoint: &str,
        access_token: &str,
    ) -> Result<ProviderIdentity, FlowError> {
        let response = self
            .http
            .get(endpoint)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| FlowError::Upstream(format!("userinfo request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(FlowError::Upstream(format!(
                "userinfo request failed: HTTP {}",
                response.status()
            )));
        }

        let info: UserinfoResponse = response
            .json()
            .await
            .map_err(|e| FlowError::Upstream(format!("unparseable userinfo response: {e}")))?;

        Ok(ProviderIdentity {
            subject: info.sub,
            email: info.email,
            name: info.name,
        })
    }

    /// GitHub identity: `/user`, then `/user/emails` when the primary record
    /// carries no email (email visibility is user-controlled on GitHub).
    async fn fetch_github_identity(
        &self,
        access_token: &str,
    ) -> Result<ProviderIdentity, FlowError> {
        let response = self
            .http
            .get(GITHUB_USER_URL)
            .bearer_auth(access_token)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| FlowError::Upstream(format!("github user request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(FlowError::Upstream(format!(
                "github user request failed: HTTP {}",
                response.status()
            )));
        }

        let user: GithubUser = response
            .json()
            .await
            .map_err(|e| FlowError::Upstream(format!("unparseable github user response: {e}")))?;

        let email = match user.email {
            Some(email) => Some(email),
            None => self.fetch_github_primary_email(access_token).await?,
        };

        Ok(ProviderIdentity {
            subject: user.id.map(|id| id.to_string()),
            email,
            name: user.name,
        })
    }

    async fn fetch_github_primary_email(
        &self,
        access_token: &str,
    ) -> Result<Option<String>, FlowError> {
        let response = self
            .http
            .get(GITHUB_EMAILS_URL)
            .bearer_auth(access_token)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| FlowError::Upstream(format!("github emails request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(FlowError::Upstream(format!(
                "github emails request failed: HTTP {}",
                response.status()
            )));
        }

        let emails: Vec<GithubEmail> = response
            .json()
            .await
            .map_err(|e| FlowError::Upstream(format!("unparseable github emails response: {e}")))?;

        // Prefer the primary verified address; fall back to any verified one.
        Ok(emails
            .iter()
            .find(|e| e.primary && e.verified)
            .or_else(|| emails.iter().find(|e| e.verified))
            .map(|e| e.email.clone()))
    }
}
