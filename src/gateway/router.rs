//! HTTP router and handlers
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/login/{provider}` | Redirect the browser to the provider's authorization URL |
//! | `GET` | `/auth/{provider}/callback` | OAuth callback: verify, exchange, issue the session token |
//! | `GET` | `/.well-known/jwks.json` | Public verification keys, cacheable for 24h |
//! | `POST` | `/logout` | Clear the session cookie (always succeeds) |
//! | `POST` | `/admin/keys/rotate` | Rotate in new key material (admin) |
//! | `POST` | `/admin/keys/purge` | Drop retired keys (admin) |
//! | `GET` | `/admin/keys/status` | Key store projection (admin) |
//! | `GET` | `/health` | Liveness |
//!
//! ## Admin Authentication
//!
//! Admin endpoints require `Authorization: Bearer <admin_token>` matching
//! `admin.bearer_token` from configuration, compared in constant time.
//! Without a configured token they return `503 Service Unavailable`.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{
        HeaderMap, StatusCode,
        header::{CACHE_CONTROL, LOCATION, SET_COOKIE},
    },
    response::{AppendHeaders, IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::warn;

use super::cookies::{
    CookieOptions, SESSION_COOKIE, build_clear_cookie, build_set_cookie, cookie_value,
};
use crate::audit::{self, AuditEvent, AuditLog};
use crate::config::PagesConfig;
use crate::keys::{JwksPublisher, RotationController};
use crate::oauth::{CallbackParams, FlowError, LoginFlow, OAuthSession, Provider, session};
use crate::token::TokenAuthority;

/// Environment variables the rotate endpoint reads key material from at
/// call time.
const ROTATE_ENV_PRIVATE: &str = "AUTH_GATEWAY_NEXT_SIGNING_KEY";
const ROTATE_ENV_PUBLIC: &str = "AUTH_GATEWAY_NEXT_SIGNING_PUBLIC_KEY";
const ROTATE_ENV_KID: &str = "AUTH_GATEWAY_NEXT_SIGNING_KID";

/// Shared application state
pub struct AppState {
    /// Login flow state machine
    pub flow: Arc<LoginFlow>,
    /// Token authority (logout uses it to recover the subject)
    pub authority: Arc<TokenAuthority>,
    /// JWKS publisher
    pub jwks: Arc<JwksPublisher>,
    /// Rotation controller
    pub rotation: Arc<RotationController>,
    /// Audit sink
    pub audit: Arc<dyn AuditLog>,
    /// Resolved admin bearer token
    pub admin_token: Option<String>,
    /// Redirect destinations
    pub pages: PagesConfig,
    /// Whether cookies carry the `Secure` attribute (off for plain-HTTP dev)
    pub secure_cookies: bool,
}

impl AppState {
    fn cookie_options(&self, max_age: Option<Duration>) -> CookieOptions {
        CookieOptions {
            secure: self.secure_cookies,
            max_age,
            ..CookieOptions::default()
        }
    }
}

/// Create the router
pub fn create_router(state: Arc<AppState>, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/login/{provider}", get(login_handler))
        .route("/auth/{provider}/callback", get(callback_handler))
        .route("/.well-known/jwks.json", get(jwks_handler))
        .route("/logout", post(logout_handler))
        .route("/admin/keys/rotate", post(rotate_handler))
        .route("/admin/keys/purge", post(purge_handler))
        .route("/admin/keys/status", get(status_handler))
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Login ─────────────────────────────────────────────────────────────────

/// `GET /login/{provider}` — start a login attempt.
///
/// Issues the transient session cookie and redirects the browser to the
/// provider. This is a full navigation, never an API call.
async fn login_handler(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
) -> Response {
    let provider = match provider.parse::<Provider>() {
        Ok(p) => p,
        Err(_) => return unsupported_provider_response(&provider),
    };

    match state.flow.initiate(provider).await {
        Ok(login) => {
            audit::emit(&AuditEvent::login_initiated(provider.as_str()));

            let cookie = build_set_cookie(
                &OAuthSession::cookie_name(provider),
                &login.session.encode(),
                &state.cookie_options(Some(session::SESSION_MAX_AGE)),
            );

            (
                StatusCode::TEMPORARY_REDIRECT,
                AppendHeaders([
                    (LOCATION, login.authorization_url.to_string()),
                    (SET_COOKIE, cookie),
                ]),
            )
                .into_response()
        }
        Err(FlowError::UnsupportedProvider(p)) => unsupported_provider_response(&p),
        Err(e) => {
            warn!(provider = %provider, error = %e, "Login initiation failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({"error": "upstream_unavailable", "message": e.user_reason()})),
            )
                .into_response()
        }
    }
}

/// `GET /auth/{provider}/callback` — complete a login attempt.
///
/// The transient session cookie is cleared on EVERY outcome, success or
/// failure, so no state survives into the next attempt.
async fn callback_handler(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
) -> Response {
    let provider = match provider.parse::<Provider>() {
        Ok(p) => p,
        Err(_) => return unsupported_provider_response(&provider),
    };

    let session = headers
        .get("cookie")
        .and_then(|v| v.to_str().ok())
        .and_then(|header| cookie_value(header, &OAuthSession::cookie_name(provider)))
        .and_then(OAuthSession::decode);

    let clear_session = build_clear_cookie(
        &OAuthSession::cookie_name(provider),
        &state.cookie_options(None),
    );

    let params = CallbackParams {
        code: query.code,
        state: query.state,
        error: query.error,
    };

    match state.flow.handle_callback(provider, params, session).await {
        Ok(login) => {
            audit::emit(&AuditEvent::login_completed(
                provider.as_str(),
                &login.claims.sub,
                &login.claims.email,
            ));

            let token_cookie = build_set_cookie(
                SESSION_COOKIE,
                &login.token,
                &state.cookie_options(Some(state.flow.token_lifetime())),
            );

            (
                StatusCode::FOUND,
                AppendHeaders([
                    (LOCATION, state.pages.success_url.clone()),
                    (SET_COOKIE, clear_session),
                    (SET_COOKIE, token_cookie),
                ]),
            )
                .into_response()
        }
        Err(e) => {
            audit::emit(&AuditEvent::login_rejected(provider.as_str(), e.to_string()));
            warn!(provider = %provider, error = %e, "Login rejected");

            // Parameter-level errors are the caller's bug: answer JSON, not
            // a redirect.
            if matches!(e, FlowError::MissingParameters(_)) {
                return (
                    StatusCode::BAD_REQUEST,
                    AppendHeaders([(SET_COOKIE, clear_session)]),
                    Json(json!({"error": "invalid_request", "message": e.user_reason()})),
                )
                    .into_response();
            }

            let destination = failure_redirect(&state.pages.failure_url, e.user_reason());
            (
                StatusCode::FOUND,
                AppendHeaders([(LOCATION, destination), (SET_COOKIE, clear_session)]),
            )
                .into_response()
        }
    }
}

/// Query parameters the provider sends to the callback.
#[derive(Debug, Deserialize)]
struct CallbackQuery {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Append the human-readable reason to the failure destination.
fn failure_redirect(failure_url: &str, reason: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(reason.as_bytes()).collect();
    let separator = if failure_url.contains('?') { '&' } else { '?' };
    format!("{failure_url}{separator}error={encoded}")
}

fn unsupported_provider_response(provider: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": "unsupported_provider",
            "message": format!("'{provider}' is not a supported login provider")
        })),
    )
        .into_response()
}

// ── JWKS ──────────────────────────────────────────────────────────────────

/// `GET /.well-known/jwks.json` — public verification keys.
///
/// Long-cacheable: the document only changes on rotation, and retired keys
/// stay published through the purge grace period.
async fn jwks_handler(State(state): State<Arc<AppState>>) -> Response {
    let document = state.jwks.document();
    (
        StatusCode::OK,
        [(CACHE_CONTROL, "public, max-age=86400")],
        Json(document.as_ref().clone()),
    )
        .into_response()
}

// ── Logout ────────────────────────────────────────────────────────────────

/// `POST /logout` — clear the session cookie.
///
/// Always answers success. The audit record update is fire-and-forget with
/// its own timeout; its failure never reaches this response.
async fn logout_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let subject = headers
        .get("cookie")
        .and_then(|v| v.to_str().ok())
        .and_then(|header| cookie_value(header, SESSION_COOKIE))
        .and_then(|token| state.authority.verify(token).ok())
        .map(|claims| claims.sub);

    audit::notify_logout(Arc::clone(&state.audit), subject);

    let clear = build_clear_cookie(SESSION_COOKIE, &state.cookie_options(None));
    (
        StatusCode::OK,
        AppendHeaders([(SET_COOKIE, clear)]),
        Json(json!({"status": "ok"})),
    )
        .into_response()
}

// ── Admin: key rotation control ───────────────────────────────────────────

/// `POST /admin/keys/rotate` request body.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RotateRequest {
    /// Kid override (defaults to the env-provided kid)
    #[serde(default)]
    kid: Option<String>,
    /// When false, stage the key without the cutover
    #[serde(default)]
    activate: Option<bool>,
}

/// `POST /admin/keys/rotate` — rotate in new key material.
///
/// Key material is read from `AUTH_GATEWAY_NEXT_SIGNING_KEY` /
/// `AUTH_GATEWAY_NEXT_SIGNING_PUBLIC_KEY` at call time, never from the
/// request body.
async fn rotate_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Option<Json<RotateRequest>>,
) -> Response {
    if let Err(response) = check_admin_auth(state.admin_token.as_deref(), &headers) {
        return response;
    }

    let request = body.map(|Json(r)| r).unwrap_or_default();

    let (Ok(private_pem), Ok(public_pem)) =
        (env::var(ROTATE_ENV_PRIVATE), env::var(ROTATE_ENV_PUBLIC))
    else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "no_key_material",
            "Set AUTH_GATEWAY_NEXT_SIGNING_KEY and AUTH_GATEWAY_NEXT_SIGNING_PUBLIC_KEY before rotating",
        );
    };

    let Some(kid) = request.kid.or_else(|| env::var(ROTATE_ENV_KID).ok()) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "no_kid",
            "Provide a kid in the request body or AUTH_GATEWAY_NEXT_SIGNING_KID",
        );
    };

    if request.activate.unwrap_or(true) {
        match state.rotation.rotate(&kid, &private_pem, &public_pem) {
            Ok(outcome) => {
                audit::emit(&AuditEvent::key_rotated(
                    outcome.previous_active.as_deref(),
                    &outcome.new_active,
                ));
                (StatusCode::OK, Json(outcome)).into_response()
            }
            Err(e) => error_response(StatusCode::BAD_REQUEST, "invalid_key_material", &e.to_string()),
        }
    } else {
        match state.rotation.add_inactive(&kid, &private_pem, &public_pem) {
            Ok(status) => {
                audit::emit(&AuditEvent::key_staged(&kid));
                (StatusCode::OK, Json(status)).into_response()
            }
            Err(e) => error_response(StatusCode::BAD_REQUEST, "invalid_key_material", &e.to_string()),
        }
    }
}

/// `POST /admin/keys/purge` request body.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PurgeRequest {
    /// Explicit kids to remove; omit to sweep all non-active keys
    #[serde(default)]
    kids_to_purge: Option<Vec<String>>,
    /// Minimum key age for the implicit sweep
    #[serde(default)]
    min_age_minutes: Option<u64>,
}

/// `POST /admin/keys/purge` — drop retired keys. Never removes the active
/// key, even when explicitly listed.
async fn purge_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Option<Json<PurgeRequest>>,
) -> Response {
    if let Err(response) = check_admin_auth(state.admin_token.as_deref(), &headers) {
        return response;
    }

    let request = body.map(|Json(r)| r).unwrap_or_default();
    let min_age = request
        .min_age_minutes
        .map(|minutes| Duration::from_secs(minutes * 60));

    let outcome = state
        .rotation
        .purge(request.kids_to_purge.as_deref(), min_age);
    audit::emit(&AuditEvent::key_purged(&outcome.removed));

    (StatusCode::OK, Json(outcome)).into_response()
}

/// `GET /admin/keys/status` — key store projection.
async fn status_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Err(response) = check_admin_auth(state.admin_token.as_deref(), &headers) {
        return response;
    }

    (StatusCode::OK, Json(state.rotation.status())).into_response()
}

/// Check the `Authorization: Bearer <token>` header against the configured
/// admin token. Returns `Err(response)` if auth fails.
///
/// The `Err` variant carries the full HTTP response to return immediately.
#[allow(clippy::result_large_err)]
fn check_admin_auth(admin_token: Option<&str>, headers: &HeaderMap) -> Result<(), Response> {
    use subtle::ConstantTimeEq;

    let Some(admin_token) = admin_token else {
        return Err(error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "admin_not_configured",
            "Admin token not configured — key rotation endpoints disabled",
        ));
    };

    let provided = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            v.strip_prefix("Bearer ")
                .or_else(|| v.strip_prefix("bearer "))
        });

    // Constant-time comparison to prevent timing side-channels
    let matches = provided.is_some_and(|p| p.as_bytes().ct_eq(admin_token.as_bytes()).into());

    if matches {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            [("WWW-Authenticate", "Bearer")],
            Json(json!({"error": "unauthorized", "message": "Invalid admin token"})),
        )
            .into_response())
    }
}

// ── Misc ──────────────────────────────────────────────────────────────────

/// `GET /health` — liveness probe.
async fn health_handler() -> Response {
    (
        StatusCode::OK,
        Json(json!({"status": "ok", "version": env!("CARGO_PKG_VERSION")})),
    )
        .into_response()
}

/// Create a JSON error response.
fn error_response(status: StatusCode, error: &str, message: &str) -> Response {
    (status, Json(json!({"error": error, "message": message}))).into_response()
}
