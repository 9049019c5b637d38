//! OAuth login flow — three providers, one CSRF-safe, replay-resistant
//! state machine.
//!
//! Google speaks OpenID Connect (endpoint discovery + PKCE); GitHub and
//! LinkedIn speak raw OAuth2 authorization-code exchange. The differences
//! live behind the [`IdentityBroker`] capability interface (authorization
//! URL, code exchange, identity fetch), dispatched on the [`Provider`]
//! variant — one implementation per provider, no inheritance.
//!
//! A login attempt walks `Initiated -> CallbackReceived -> IdentityResolved
//! -> TokenIssued`, or terminates in `Rejected` at any gate. The transient
//! per-attempt material (CSRF state, PKCE verifier) lives in a short-lived
//! HTTP-only cookie keyed per provider and is consumed exactly once; the
//! HTTP layer clears it on every callback outcome so a failed attempt never
//! leaves state behind for the next one.

pub mod discovery;
pub mod flow;
pub mod provider;
pub mod session;

pub use discovery::{DiscoveryCache, DiscoveryDocument};
pub use flow::{CallbackParams, CompletedLogin, InitiatedLogin, LoginFlow};
pub use provider::{HttpIdentityBroker, IdentityBroker, Provider, ProviderIdentity};
pub use session::OAuthSession;

/// Error variants for the login flow. Every variant is terminal for the
/// current attempt; nothing in the flow retries.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// The provider is not in the configured set.
    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// The provider redirected back with an error report.
    #[error("provider reported an error: {0}")]
    ProviderError(String),

    /// The callback is missing a required query parameter.
    #[error("missing callback parameter: {0}")]
    MissingParameters(&'static str),

    /// The callback state does not exact-match the stored one (or no state
    /// was stored for this provider). Never downgraded to a retry.
    #[error("oauth state mismatch")]
    StateMismatch,

    /// The authorization-code exchange was rejected.
    #[error("code exchange failed: {0}")]
    ExchangeFailed(String),

    /// The provider's identity response lacks a required field.
    #[error("provider identity incomplete: missing {0}")]
    IdentityIncomplete(&'static str),

    /// The directory has no user for this verified identity.
    #[error("user not provisioned")]
    UserNotProvisioned,

    /// The directory could not be reached or answered abnormally.
    #[error("directory unavailable: {0}")]
    DirectoryUnavailable(String),

    /// Token issuance failed (typically: no active signing key).
    #[error("token issuance failed: {0}")]
    Signing(#[from] crate::token::TokenError),

    /// A provider endpoint could not be reached or answered abnormally.
    #[error("upstream request failed: {0}")]
    Upstream(String),
}

impl FlowError {
    /// Short, human-readable reason carried on the failure redirect.
    /// Never exposes upstream internals.
    #[must_use]
    pub fn user_reason(&self) -> &'static str {
        match self {
            Self::UnsupportedProvider(_) => "unknown sign-in provider",
            Self::ProviderError(_) => "the sign-in provider reported an error",
            Self::MissingParameters(_) => "the sign-in response was incomplete",
            Self::StateMismatch => "the sign-in attempt could not be validated, please retry",
            Self::ExchangeFailed(_) => "sign-in could not be completed with the provider",
            Self::IdentityIncomplete(_) => "the provider did not supply a verified email address",
            Self::UserNotProvisioned => "this account has not been provisioned",
            Self::DirectoryUnavailable(_) => "the user directory is temporarily unavailable",
            Self::Signing(_) => "sign-in is temporarily unavailable",
            Self::Upstream(_) => "the sign-in provider is temporarily unavailable",
        }
    }
}
