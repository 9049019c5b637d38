//! Signing key authority — multi-key store, startup loading, JWKS
//! publishing, and live rotation.
//!
//! # Architecture
//!
//! ```text
//! KeySource (startup)  ──populates──>  KeyStore
//! RotationController   ──mutates───>   KeyStore ──refresh──> JwksPublisher
//! TokenAuthority       ──reads─────>   KeyStore
//! ```
//!
//! The [`KeyStore`] is the only shared mutable state on the login hot path.
//! It is read-mostly; mutation happens out-of-band through the
//! [`RotationController`], which is also responsible for refreshing the
//! [`JwksPublisher`] cache after every store mutation. That ordering
//! (mutate store, then refresh publisher) is a hard sequencing contract:
//! a verifier must never observe a rotation before the JWKS document does.
//!
//! Rotation never removes the outgoing key. Tokens signed moments before a
//! rotation stay verifiable for their full lifetime; retired keys are only
//! dropped by an explicit purge after a grace period at least as long as the
//! token lifetime.

pub mod jwks;
pub mod rotation;
pub mod source;
pub mod store;

pub use jwks::{JsonWebKey, JsonWebKeySet, JwksPublisher};
pub use rotation::{KeyStatus, PurgeOutcome, RotationController, RotationOutcome};
pub use source::load_keys;
pub use store::{KeyError, KeyPair, KeyStore};
