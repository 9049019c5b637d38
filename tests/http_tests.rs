//! HTTP surface tests
//!
//! Drives the router end to end with a fake broker and directory. The
//! invariant under heaviest test: the transient OAuth session cookie is
//! cleared on every callback outcome, success or failure.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use auth_gateway::audit::TracingAuditLog;
use auth_gateway::config::{PagesConfig, TokenConfig};
use auth_gateway::directory::{DirectoryClient, DirectoryError, DirectoryUser};
use auth_gateway::gateway::{AppState, create_router};
use auth_gateway::keys::{JwksPublisher, KeyPair, KeyStore, RotationController};
use auth_gateway::oauth::{FlowError, IdentityBroker, LoginFlow, OAuthSession, Provider, ProviderIdentity};
use auth_gateway::token::TokenAuthority;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use rsa::RsaPrivateKey;
use tower::ServiceExt;
use url::Url;

// ── Fakes ─────────────────────────────────────────────────────────────────

struct FakeBroker;

#[async_trait]
impl IdentityBroker for FakeBroker {
    async fn authorization_url(
        &self,
        _provider: Provider,
        state: &str,
        _code_challenge: Option<&str>,
    ) -> Result<Url, FlowError> {
        let mut url = Url::parse("https://provider.example/authorize").unwrap();
        url.query_pairs_mut().append_pair("state", state);
        Ok(url)
    }

    async fn exchange_code(
        &self,
        _provider: Provider,
        _code: &str,
        _code_verifier: Option<&str>,
    ) -> Result<String, FlowError> {
        Ok("access-token".to_string())
    }

    async fn fetch_identity(
        &self,
        _provider: Provider,
        _access_token: &str,
    ) -> Result<ProviderIdentity, FlowError> {
        Ok(ProviderIdentity {
            subject: Some("prov-1".to_string()),
            email: Some("alice@corp.example".to_string()),
            name: None,
        })
    }
}

struct FakeDirectory;

#[async_trait]
impl DirectoryClient for FakeDirectory {
    async fn get_user(
        &self,
        _email: &str,
        _provider: Provider,
    ) -> Result<Option<DirectoryUser>, DirectoryError> {
        Ok(Some(DirectoryUser {
            user_id: "user-42".to_string(),
            organization_id: "org-7".to_string(),
            roles: vec!["viewer".to_string()],
        }))
    }
}

// ── Harness ───────────────────────────────────────────────────────────────

fn test_app() -> Router {
    let store = Arc::new(KeyStore::new());
    let private = RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048).unwrap();
    let (private_pem, public_pem) = auth_gateway::keys::store::export_pem(&private).unwrap();
    store.add(
        KeyPair::from_pem("auth-2026-08", &private_pem, &public_pem).unwrap(),
        true,
    );

    let jwks = Arc::new(JwksPublisher::new(Arc::clone(&store)));
    let rotation = Arc::new(RotationController::new(Arc::clone(&store), Arc::clone(&jwks)));
    let authority = Arc::new(TokenAuthority::new(Arc::clone(&store), &TokenConfig::default()));

    let flow = Arc::new(LoginFlow::new(
        Arc::new(FakeBroker),
        Arc::new(FakeDirectory),
        Arc::clone(&authority),
    ));

    let state = Arc::new(AppState {
        flow,
        authority,
        jwks,
        rotation,
        audit: Arc::new(TracingAuditLog),
        admin_token: Some("sekrit".to_string()),
        pages: PagesConfig::default(),
        secure_cookies: false,
    });

    create_router(state, Duration::from_secs(5))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn set_cookies(response: &axum::http::Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

/// Start a login and hand back the transient session it stored.
async fn initiate_github(app: &Router) -> (String, OAuthSession) {
    let response = app.clone().oneshot(get("/login/github")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

    let cookies = set_cookies(&response);
    let session_cookie = cookies
        .iter()
        .find(|c| c.starts_with("oauth_session_github="))
        .expect("login must set the transient session cookie");

    let value = session_cookie
        .split(';')
        .next()
        .unwrap()
        .split_once('=')
        .unwrap()
        .1
        .to_string();
    let session = OAuthSession::decode(&value).expect("cookie must decode");
    (value, session)
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn login_redirects_to_provider_with_session_cookie() {
    let app = test_app();
    let response = app.clone().oneshot(get("/login/github")).await.unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    assert!(location.starts_with("https://provider.example/authorize"));

    let cookies = set_cookies(&response);
    let session = cookies
        .iter()
        .find(|c| c.starts_with("oauth_session_github="))
        .unwrap();
    assert!(session.contains("HttpOnly"));
    assert!(session.contains("Max-Age=600"));
}

#[tokio::test]
async fn unknown_provider_is_a_400() {
    let app = test_app();
    let response = app.oneshot(get("/login/facebook")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn successful_callback_sets_token_and_clears_session() {
    let app = test_app();
    let (cookie_value, session) = initiate_github(&app).await;

    let request = Request::builder()
        .uri(format!(
            "/auth/github/callback?code=code-x&state={}",
            session.state
        ))
        .header(
            header::COOKIE,
            format!("oauth_session_github={cookie_value}"),
        )
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[header::LOCATION], "/");

    let cookies = set_cookies(&response);
    // The transient session is cleared...
    assert!(
        cookies
            .iter()
            .any(|c| c.starts_with("oauth_session_github=;") && c.contains("Max-Age=0"))
    );
    // ...and the session token cookie is set with the token lifetime
    let token_cookie = cookies
        .iter()
        .find(|c| c.starts_with("gateway_session="))
        .unwrap();
    assert!(token_cookie.contains("HttpOnly"));
    assert!(token_cookie.contains("Max-Age=900"));
}

#[tokio::test]
async fn wrong_state_redirects_to_failure_and_clears_session() {
    let app = test_app();
    let (cookie_value, _session) = initiate_github(&app).await;

    let request = Request::builder()
        .uri("/auth/github/callback?code=code-x&state=wrong")
        .header(
            header::COOKIE,
            format!("oauth_session_github={cookie_value}"),
        )
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    assert!(location.starts_with("/login?error="));

    // No token cookie; transient session actively cleared
    let cookies = set_cookies(&response);
    assert!(!cookies.iter().any(|c| c.starts_with("gateway_session=")));
    assert!(
        cookies
            .iter()
            .any(|c| c.starts_with("oauth_session_github=;") && c.contains("Max-Age=0"))
    );
}

#[tokio::test]
async fn missing_parameters_answer_json_not_redirect() {
    let app = test_app();
    let (cookie_value, _) = initiate_github(&app).await;

    let request = Request::builder()
        .uri("/auth/github/callback")
        .header(
            header::COOKIE,
            format!("oauth_session_github={cookie_value}"),
        )
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    // Session still cleared on this path
    assert!(
        set_cookies(&response)
            .iter()
            .any(|c| c.starts_with("oauth_session_github=;") && c.contains("Max-Age=0"))
    );
}

#[tokio::test]
async fn jwks_is_published_and_cacheable() {
    let app = test_app();
    let response = app.oneshot(get("/.well-known/jwks.json")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CACHE_CONTROL],
        "public, max-age=86400"
    );

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let jwks: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(jwks["keys"][0]["kid"], "auth-2026-08");
    assert_eq!(jwks["keys"][0]["use"], "sig");
}

#[tokio::test]
async fn logout_always_succeeds_and_clears_the_cookie() {
    let app = test_app();
    let request = Request::builder()
        .method("POST")
        .uri("/logout")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        set_cookies(&response)
            .iter()
            .any(|c| c.starts_with("gateway_session=;") && c.contains("Max-Age=0"))
    );
}

#[tokio::test]
async fn admin_status_requires_the_bearer_token() {
    let app = test_app();

    let response = app
        .clone()
        .oneshot(get("/admin/keys/status"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/admin/keys/status")
        .header(header::AUTHORIZATION, "Bearer sekrit")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let status: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(status["activeKid"], "auth-2026-08");
    assert_eq!(status["keyCount"], 1);
}

#[tokio::test]
async fn health_answers_ok() {
    let app = test_app();
    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
