//! Audit logging for login and key lifecycle events.
//!
//! Every event is emitted via `tracing::info!` with the serialized event in
//! an `audit` field, queryable by any log aggregator.
//!
//! # Events
//!
//! | Event | When |
//! |-------|------|
//! | `login.initiated` | A login attempt is started |
//! | `login.completed` | A session token is issued |
//! | `login.rejected` | Any gate rejects the attempt |
//! | `logout` | The session cookie is cleared |
//! | `key.rotated` | A new signing key becomes active |
//! | `key.staged` | A key is added without activation |
//! | `key.purged` | Retired keys are removed |
//!
//! Persistence is behind the [`AuditLog`] trait; the default sink is the
//! tracing emitter. Audit failures are non-fatal by construction — the
//! logout update runs as a detached task with its own timeout and can never
//! abort an otherwise-successful logout.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

/// Error variants for audit sinks.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// The sink rejected or could not store the record.
    #[error("audit sink unavailable: {0}")]
    Sink(String),
}

/// Structured audit event.
#[derive(Debug, Serialize)]
pub struct AuditEvent {
    /// Event type string (e.g., `"login.completed"`).
    pub event: &'static str,
    /// Record id
    pub id: String,
    /// Provider involved, for login events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Token subject, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Email, for completed logins
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Key ids touched, for key lifecycle events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kids: Option<Vec<String>>,
    /// Human-readable reason for rejections
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AuditEvent {
    fn base(event: &'static str) -> Self {
        Self {
            event,
            id: uuid::Uuid::new_v4().to_string(),
            provider: None,
            subject: None,
            email: None,
            kids: None,
            reason: None,
        }
    }

    /// Construct a `login.initiated` event.
    #[must_use]
    pub fn login_initiated(provider: &str) -> Self {
        Self {
            provider: Some(provider.to_string()),
            ..Self::base("login.initiated")
        }
    }

    /// Construct a `login.completed` event.
    #[must_use]
    pub fn login_completed(provider: &str, subject: &str, email: &str) -> Self {
        Self {
            provider: Some(provider.to_string()),
            subject: Some(subject.to_string()),
            email: Some(email.to_string()),
            ..Self::base("login.completed")
        }
    }

    /// Construct a `login.rejected` event.
    #[must_use]
    pub fn login_rejected(provider: &str, reason: impl Into<String>) -> Self {
        Self {
            provider: Some(provider.to_string()),
            reason: Some(reason.into()),
            ..Self::base("login.rejected")
        }
    }

    /// Construct a `logout` event.
    #[must_use]
    pub fn logout(subject: Option<&str>) -> Self {
        Self {
            subject: subject.map(str::to_string),
            ..Self::base("logout")
        }
    }

    /// Construct a `key.rotated` event.
    #[must_use]
    pub fn key_rotated(previous: Option<&str>, new_active: &str) -> Self {
        let mut kids = Vec::new();
        if let Some(previous) = previous {
            kids.push(previous.to_string());
        }
        kids.push(new_active.to_string());
        Self {
            kids: Some(kids),
            ..Self::base("key.rotated")
        }
    }

    /// Construct a `key.staged` event.
    #[must_use]
    pub fn key_staged(kid: &str) -> Self {
        Self {
            kids: Some(vec![kid.to_string()]),
            ..Self::base("key.staged")
        }
    }

    /// Construct a `key.purged` event.
    #[must_use]
    pub fn key_purged(removed: &[String]) -> Self {
        Self {
            kids: Some(removed.to_vec()),
            ..Self::base("key.purged")
        }
    }
}

/// Emit an audit event via `tracing::info!` with structured fields.
pub fn emit(event: &AuditEvent) {
    match serde_json::to_string(event) {
        Ok(ref json) => tracing::info!(audit = %json, "audit"),
        Err(ref e) => tracing::warn!(error = %e, "Failed to serialize audit event"),
    }
}

/// Audit persistence boundary — a simple append/update store.
#[async_trait]
pub trait AuditLog: Send + Sync + 'static {
    /// Append an event record.
    async fn append(&self, event: &AuditEvent) -> Result<(), AuditError>;

    /// Update the session record for a logout.
    async fn record_logout(&self, subject: Option<&str>) -> Result<(), AuditError>;
}

/// Default sink: structured tracing emission. Cannot fail.
pub struct TracingAuditLog;

#[async_trait]
impl AuditLog for TracingAuditLog {
    async fn append(&self, event: &AuditEvent) -> Result<(), AuditError> {
        emit(event);
        Ok(())
    }

    async fn record_logout(&self, subject: Option<&str>) -> Result<(), AuditError> {
        emit(&AuditEvent::logout(subject));
        Ok(())
    }
}

/// Best-effort logout notification: a detached task with its own timeout
/// and error channel. Failures are logged and never reach the caller.
pub fn notify_logout(log: Arc<dyn AuditLog>, subject: Option<String>) {
    tokio::spawn(async move {
        let update = log.record_logout(subject.as_deref());
        match tokio::time::timeout(Duration::from_secs(5), update).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Audit logout update failed"),
            Err(_) => warn!("Audit logout update timed out"),
        }
    });
}
