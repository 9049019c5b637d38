//! Directory lookup — maps a verified provider identity onto a provisioned
//! user through the Coordinator service.
//!
//! The Coordinator routes on the request's `action` string; on this side
//! that string is a typed [`DirectoryAction`] variant so an unknown action
//! cannot be constructed. A lookup miss (user not provisioned) and a
//! directory outage are deliberately distinct outcomes: the first is an
//! authorization answer, the second a service failure.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::DirectoryConfig;
use crate::oauth::Provider;

/// Error variants for directory lookups.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// The Coordinator could not be reached or answered a server error.
    #[error("directory unavailable: {0}")]
    Unavailable(String),

    /// The Coordinator answered something this client cannot interpret.
    #[error("directory protocol error: {0}")]
    Protocol(String),
}

/// Actions this client may request from the Coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirectoryAction {
    /// Resolve a user by email + provider
    #[serde(rename = "get-user")]
    GetUser,
}

/// Coordinator lookup request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DirectoryRequest<'a> {
    requester_service: &'static str,
    action: DirectoryAction,
    email: &'a str,
    provider: &'a str,
}

/// A provisioned user as the directory knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryUser {
    /// Directory user id
    pub user_id: String,
    /// Organization the user belongs to
    pub organization_id: String,
    /// Role names, order preserved
    pub roles: Vec<String>,
}

/// Directory lookup interface. The login flow depends on this seam; tests
/// substitute a fake.
#[async_trait]
pub trait DirectoryClient: Send + Sync + 'static {
    /// Resolve `email + provider` to a provisioned user.
    ///
    /// `Ok(None)` means the directory answered and knows no such user.
    async fn get_user(
        &self,
        email: &str,
        provider: Provider,
    ) -> Result<Option<DirectoryUser>, DirectoryError>;
}

/// HTTP client against the Coordinator endpoint.
pub struct CoordinatorClient {
    http: Client,
    endpoint: String,
    timeout: std::time::Duration,
}

impl CoordinatorClient {
    /// Create a client from configuration.
    #[must_use]
    pub fn new(http: Client, config: &DirectoryConfig) -> Self {
        Self {
            http,
            endpoint: config.coordinator_url.clone(),
            timeout: config.timeout,
        }
    }
}

#[async_trait]
impl DirectoryClient for CoordinatorClient {
    async fn get_user(
        &self,
        email: &str,
        provider: Provider,
    ) -> Result<Option<DirectoryUser>, DirectoryError> {
        let request = DirectoryRequest {
            requester_service: "auth",
            action: DirectoryAction::GetUser,
            email,
            provider: provider.as_str(),
        };

        let response = self
            .http
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::OK => {
                let user: DirectoryUser = response
                    .json()
                    .await
                    .map_err(|e| DirectoryError::Protocol(e.to_string()))?;
                debug!(user_id = %user.user_id, "Directory resolved user");
                Ok(Some(user))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(DirectoryError::Unavailable(format!(
                "coordinator answered HTTP {status}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_with_tagged_action() {
        let request = DirectoryRequest {
            requester_service: "auth",
            action: DirectoryAction::GetUser,
            email: "alice@corp.example",
            provider: "google",
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["requesterService"], "auth");
        assert_eq!(json["action"], "get-user");
        assert_eq!(json["email"], "alice@corp.example");
        assert_eq!(json["provider"], "google");
    }

    #[test]
    fn user_deserializes_from_camel_case() {
        let json = r#"{
            "userId": "user-42",
            "organizationId": "org-7",
            "roles": ["admin", "viewer"]
        }"#;
        let user: DirectoryUser = serde_json::from_str(json).unwrap();
        assert_eq!(user.user_id, "user-42");
        assert_eq!(user.organization_id, "org-7");
        assert_eq!(user.roles, vec!["admin", "viewer"]);
    }

    #[test]
    fn action_round_trips_through_its_wire_name() {
        let action: DirectoryAction = serde_json::from_str("\"get-user\"").unwrap();
        assert_eq!(action, DirectoryAction::GetUser);
        // An unknown action string cannot deserialize into the enum
        assert!(serde_json::from_str::<DirectoryAction>("\"drop-user\"").is_err());
    }
}
