//! End-to-end token authority tests
//!
//! Covers the issue/verify contract:
//! - a token issued now is always accepted immediately, claims intact
//! - the active kid is embedded in the header
//! - an empty key store yields a typed failure, never an unsigned token

use std::sync::Arc;

use auth_gateway::config::TokenConfig;
use auth_gateway::keys::{KeyPair, KeyStore};
use auth_gateway::token::{SessionIdentity, TokenAuthority, TokenError};
use rsa::RsaPrivateKey;

fn pem_pair() -> (String, String) {
    let private = RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048).unwrap();
    auth_gateway::keys::store::export_pem(&private).unwrap()
}

fn identity() -> SessionIdentity {
    SessionIdentity {
        subject: "user-42".to_string(),
        email: "alice@corp.example".to_string(),
        organization: "org-7".to_string(),
        roles: vec!["admin".to_string(), "auditor".to_string()],
    }
}

#[test]
fn issued_token_verifies_immediately_with_exact_claims() {
    let store = Arc::new(KeyStore::new());
    let (private_pem, public_pem) = pem_pair();
    store.add(
        KeyPair::from_pem("auth-2026-08", &private_pem, &public_pem).unwrap(),
        true,
    );
    let authority = TokenAuthority::new(store, &TokenConfig::default());

    let issued = authority.issue(&identity()).unwrap();
    let claims = authority.verify(&issued.token).unwrap();

    assert_eq!(claims, issued.claims);
    assert_eq!(claims.sub, "user-42");
    assert_eq!(claims.email, "alice@corp.example");
    assert_eq!(claims.org, "org-7");
    // Role order is preserved
    assert_eq!(claims.roles, vec!["admin", "auditor"]);
    assert_eq!(claims.iss, "auth-gateway");
    assert_eq!(claims.aud, "internal-services");
    // Expiry is issued-at plus the configured 15-minute lifetime
    assert_eq!(claims.exp, claims.iat + 900);
}

#[test]
fn token_header_names_the_signing_key() {
    let store = Arc::new(KeyStore::new());
    let (private_pem, public_pem) = pem_pair();
    store.add(
        KeyPair::from_pem("auth-2026-08", &private_pem, &public_pem).unwrap(),
        true,
    );
    let authority = TokenAuthority::new(store, &TokenConfig::default());

    let issued = authority.issue(&identity()).unwrap();
    let header = jsonwebtoken::decode_header(&issued.token).unwrap();
    assert_eq!(header.kid.as_deref(), Some("auth-2026-08"));
}

#[test]
fn zero_keys_means_typed_unavailable_never_an_unsigned_token() {
    let authority = TokenAuthority::new(Arc::new(KeyStore::new()), &TokenConfig::default());

    let err = authority.issue(&identity()).unwrap_err();
    assert!(matches!(err, TokenError::NoActiveKey));
}

#[test]
fn custom_lifetime_and_issuer_are_honored() {
    let store = Arc::new(KeyStore::new());
    let (private_pem, public_pem) = pem_pair();
    store.add(
        KeyPair::from_pem("k", &private_pem, &public_pem).unwrap(),
        true,
    );

    let config = TokenConfig {
        lifetime: std::time::Duration::from_secs(300),
        issuer: "https://auth.corp.example".to_string(),
        audience: "corp-apps".to_string(),
    };
    let authority = TokenAuthority::new(store, &config);

    let issued = authority.issue(&identity()).unwrap();
    assert_eq!(issued.claims.exp, issued.claims.iat + 300);
    assert_eq!(issued.claims.iss, "https://auth.corp.example");
    assert_eq!(issued.claims.aud, "corp-apps");

    let claims = authority.verify(&issued.token).unwrap();
    assert_eq!(claims.iss, "https://auth.corp.example");
}

#[test]
fn token_from_another_key_set_is_rejected() {
    let (private_a, public_a) = pem_pair();
    let (private_b, public_b) = pem_pair();

    let store_a = Arc::new(KeyStore::new());
    store_a.add(KeyPair::from_pem("a", &private_a, &public_a).unwrap(), true);
    let authority_a = TokenAuthority::new(store_a, &TokenConfig::default());

    let store_b = Arc::new(KeyStore::new());
    store_b.add(KeyPair::from_pem("b", &private_b, &public_b).unwrap(), true);
    let authority_b = TokenAuthority::new(store_b, &TokenConfig::default());

    let issued = authority_a.issue(&identity()).unwrap();
    // kid "a" is unknown to store B, so it falls back over all keys and
    // still finds no match
    let err = authority_b.verify(&issued.token).unwrap_err();
    assert!(matches!(err, TokenError::InvalidSignature));
}
