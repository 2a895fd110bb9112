// 🪪 Identity Client - who is calling, resolved through the Access service

use crate::models::UserDetails;
use crate::sparql::ForwardedHeaders;
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum IdentityError {
    /// Access answered with an error status
    #[error("Error calling Access:{reason}")]
    Status { status: u16, reason: String },

    #[error("Error calling Access, Internal Server Error")]
    Unavailable(String),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn get_user_details(&self, headers: &ForwardedHeaders) -> Result<UserDetails, IdentityError>;
}

// ============================================================================
// ACCESS CLIENT
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessUser {
    display_name: String,
    username: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccessResponse {
    content: AccessUser,
}

impl From<AccessUser> for UserDetails {
    fn from(user: AccessUser) -> Self {
        UserDetails {
            username: user.display_name,
            user_id: user.username,
            email: user.email,
        }
    }
}

pub struct AccessClient {
    client: reqwest::Client,
    user_details_url: String,
}

impl AccessClient {
    pub fn new(client: reqwest::Client, identity_api_url: &str) -> Self {
        AccessClient {
            client,
            user_details_url: format!("{}/api/v1/user-details", identity_api_url.trim_end_matches('/')),
        }
    }

    pub fn user_details_url(&self) -> &str {
        &self.user_details_url
    }
}

#[async_trait]
impl IdentityProvider for AccessClient {
    async fn get_user_details(&self, headers: &ForwardedHeaders) -> Result<UserDetails, IdentityError> {
        info!(url = %self.user_details_url, "fetching user details");

        let response = headers
            .apply(self.client.get(&self.user_details_url))
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Access is unreachable");
                IdentityError::Unavailable(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(status = status.as_u16(), "Access returned an error status");
            return Err(IdentityError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        let body: AccessResponse = response
            .json()
            .await
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;

        Ok(body.content.into())
    }
}

// ============================================================================
// DEV IDENTITY
// ============================================================================

/// Fixed user for local development
#[derive(Debug, Clone, Default)]
pub struct DevIdentity;

impl DevIdentity {
    pub fn user() -> UserDetails {
        UserDetails {
            username: "Test User1".to_string(),
            user_id: "1234-5678-99ab-cdef".to_string(),
            email: Some("test.user@example.com".to_string()),
        }
    }
}

#[async_trait]
impl IdentityProvider for DevIdentity {
    async fn get_user_details(&self, _headers: &ForwardedHeaders) -> Result<UserDetails, IdentityError> {
        info!("dev mode enabled, returning dummy user details");
        Ok(DevIdentity::user())
    }
}
