//! The login flow state machine.
//!
//! One [`LoginFlow`] serves every attempt; attempts are independent and
//! share no mutable state. The flow owns the gate ordering on callback —
//! provider error, parameter presence, state match, code exchange, identity
//! completeness, directory resolution, token issuance — and fails closed at
//! the first gate that rejects. It holds no transient storage itself: the
//! caller passes in the decoded [`OAuthSession`] and is responsible for
//! clearing it on every outcome.

use std::sync::Arc;

use tracing::{debug, info};
use url::Url;

use super::FlowError;
use super::provider::{IdentityBroker, Provider};
use super::session::{OAuthSession, generate_pkce, generate_state};
use crate::directory::{DirectoryClient, DirectoryError};
use crate::token::{Claims, SessionIdentity, TokenAuthority};

/// A freshly initiated login: where to send the browser, and what to stash
/// in the transient session cookie.
#[derive(Debug)]
pub struct InitiatedLogin {
    /// Provider authorization URL. The caller must redirect the user agent
    /// here — this is a full browser navigation, not an API call, because
    /// the provider later redirects the browser back to the callback.
    pub authorization_url: Url,
    /// Transient session to persist until the callback
    pub session: OAuthSession,
}

/// Query parameters the provider sends to the callback.
#[derive(Debug, Default, Clone)]
pub struct CallbackParams {
    /// Authorization code
    pub code: Option<String>,
    /// Echoed anti-CSRF state
    pub state: Option<String>,
    /// Provider-reported error, when the user denied or the provider failed
    pub error: Option<String>,
}

/// A completed login, ready to become a session cookie.
#[derive(Debug)]
pub struct CompletedLogin {
    /// The signed session token
    pub token: String,
    /// The claims inside it
    pub claims: Claims,
}

/// Per-provider OAuth login state machine.
pub struct LoginFlow {
    broker: Arc<dyn IdentityBroker>,
    directory: Arc<dyn DirectoryClient>,
    authority: Arc<TokenAuthority>,
}

impl LoginFlow {
    /// Wire the flow to its collaborators.
    #[must_use]
    pub fn new(
        broker: Arc<dyn IdentityBroker>,
        directory: Arc<dyn DirectoryClient>,
        authority: Arc<TokenAuthority>,
    ) -> Self {
        Self {
            broker,
            directory,
            authority,
        }
    }

    /// Start a login attempt: fresh CSRF state, PKCE material for providers
    /// that use it, and the provider-specific authorization URL.
    ///
    /// Fails with `UnsupportedProvider` when the provider has no registered
    /// credentials.
    pub async fn initiate(&self, provider: Provider) -> Result<InitiatedLogin, FlowError> {
        let state = generate_state();
        let (code_verifier, code_challenge) = if provider.uses_pkce() {
            let (verifier, challenge) = generate_pkce();
            (Some(verifier), Some(challenge))
        } else {
            (None, None)
        };

        let authorization_url = self
            .broker
            .authorization_url(provider, &state, code_challenge.as_deref())
            .await?;

        debug!(provider = %provider, "Login initiated");
        Ok(InitiatedLogin {
            authorization_url,
            session: OAuthSession {
                provider,
                state,
                code_verifier,
            },
        })
    }

    /// Drive a callback through every gate to a signed session token.
    ///
    /// `session` is the decoded transient cookie for this provider, when one
    /// survived. Whatever the outcome, the caller clears that cookie — a
    /// rejected attempt must leave no state behind for the next one.
    pub async fn handle_callback(
        &self,
        provider: Provider,
        params: CallbackParams,
        session: Option<OAuthSession>,
    ) -> Result<CompletedLogin, FlowError> {
        // Gate 1: the provider itself reported failure.
        if let Some(error) = params.error {
            return Err(FlowError::ProviderError(error));
        }

        // Gate 2: both parameters must be present.
        let code = params.code.ok_or(FlowError::MissingParameters("code"))?;
        let state = params.state.ok_or(FlowError::MissingParameters("state"))?;

        // Gate 3: exact state match against the stored session for THIS
        // provider. A missing or foreign session is the same hard failure.
        let session = session
            .filter(|s| s.provider == provider)
            .ok_or(FlowError::StateMismatch)?;
        if session.state != state {
            return Err(FlowError::StateMismatch);
        }

        // Gate 4: exchange the code (PKCE verifier rides along for Google).
        let access_token = self
            .broker
            .exchange_code(provider, &code, session.code_verifier.as_deref())
            .await?;

        // Gate 5: fetch the verified identity; email is the minimum.
        let identity = self.broker.fetch_identity(provider, &access_token).await?;
        let email = identity
            .email
            .ok_or(FlowError::IdentityIncomplete("email"))?;

        // Gate 6: the directory decides whether this identity is provisioned.
        let user = self
            .directory
            .get_user(&email, provider)
            .await
            .map_err(|e| match e {
                DirectoryError::Unavailable(m) | DirectoryError::Protocol(m) => {
                    FlowError::DirectoryUnavailable(m)
                }
            })?
            .ok_or(FlowError::UserNotProvisioned)?;

        // Terminal: sign the session token.
        let issued = self.authority.issue(&SessionIdentity {
            subject: user.user_id,
            email,
            organization: user.organization_id,
            roles: user.roles,
        })?;

        info!(provider = %provider, sub = %issued.claims.sub, "Login completed");
        Ok(CompletedLogin {
            token: issued.token,
            claims: issued.claims,
        })
    }

    /// Token lifetime, for the session cookie Max-Age.
    #[must_use]
    pub fn token_lifetime(&self) -> std::time::Duration {
        self.authority.lifetime()
    }
}
