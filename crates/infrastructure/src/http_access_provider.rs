use std::sync::Arc;

use async_trait::async_trait;
use grantry_application::{
    AccessProvider, ProviderKind, ProviderOutcome, ProvisioningRequest, UpstreamSession,
    UpstreamSessionSource,
};
use grantry_core::AppResult;
use reqwest::StatusCode;
use serde::Serialize;

use crate::upstream_http::{describe_transport_error, endpoint, with_session};

/// Automated provider calling the upstream provisioning API directly.
#[derive(Clone)]
pub struct HttpAccessProvider {
    http_client: reqwest::Client,
    sessions: Arc<dyn UpstreamSessionSource>,
}

#[derive(Debug, Serialize)]
struct AccessChangeBody<'a> {
    username: &'a str,
    resource_id: &'a str,
}

/// Upstream call kind; decides which non-2xx statuses count as success.
#[derive(Debug, Clone, Copy)]
enum Call {
    ValidateUsername,
    Grant,
    Revoke,
}

impl HttpAccessProvider {
    /// Creates a provider. The client should carry the upstream timeout.
    #[must_use]
    pub fn new(http_client: reqwest::Client, sessions: Arc<dyn UpstreamSessionSource>) -> Self {
        Self {
            http_client,
            sessions,
        }
    }

    async fn session(&self) -> AppResult<Result<UpstreamSession, ProviderOutcome>> {
        Ok(self
            .sessions
            .current_session()
            .await?
            .ok_or_else(|| ProviderOutcome::AuthError {
                status: None,
                reason: "no upstream credentials are configured".to_owned(),
            }))
    }

    async fn change_access(
        &self,
        call: Call,
        request: &ProvisioningRequest,
    ) -> AppResult<ProviderOutcome> {
        let session = match self.session().await? {
            Ok(session) => session,
            Err(outcome) => return Ok(outcome),
        };

        let action = match call {
            Call::Revoke => "revoke",
            _ => "grant",
        };
        let url = endpoint(session.api_url.as_str(), &["access", action])?;
        let response = with_session(self.http_client.post(url), &session)
            .json(&AccessChangeBody {
                username: request.username.as_str(),
                resource_id: request.upstream_resource_id.as_str(),
            })
            .send()
            .await;

        Ok(classify(call, response).await)
    }
}

#[async_trait]
impl AccessProvider for HttpAccessProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::AutomatedApi
    }

    async fn is_configured(&self) -> bool {
        match self.sessions.current_session().await {
            Ok(session) => session.is_some(),
            Err(error) => {
                tracing::warn!(error = %error, "failed to resolve upstream session");
                false
            }
        }
    }

    async fn validate_username(&self, username: &str) -> AppResult<ProviderOutcome> {
        let session = match self.session().await? {
            Ok(session) => session,
            Err(outcome) => return Ok(outcome),
        };

        let url = endpoint(session.api_url.as_str(), &["users", username])?;
        let response = with_session(self.http_client.get(url), &session)
            .send()
            .await;

        Ok(classify(Call::ValidateUsername, response).await)
    }

    async fn grant_access(&self, request: &ProvisioningRequest) -> AppResult<ProviderOutcome> {
        self.change_access(Call::Grant, request).await
    }

    async fn revoke_access(&self, request: &ProvisioningRequest) -> AppResult<ProviderOutcome> {
        self.change_access(Call::Revoke, request).await
    }
}

async fn classify(
    call: Call,
    response: Result<reqwest::Response, reqwest::Error>,
) -> ProviderOutcome {
    let response = match response {
        Ok(response) => response,
        Err(error) => {
            return ProviderOutcome::TransientFailure {
                reason: describe_transport_error(&error),
            };
        }
    };

    let status = response.status();
    if status.is_success() {
        return ProviderOutcome::Succeeded;
    }

    match (call, status) {
        (Call::Grant, StatusCode::CONFLICT) | (Call::Revoke, StatusCode::NOT_FOUND) => {
            return ProviderOutcome::Succeeded;
        }
        (_, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
            return ProviderOutcome::AuthError {
                status: Some(status.as_u16()),
                reason: format!("upstream rejected the session with status {status}"),
            };
        }
        (_, StatusCode::TOO_MANY_REQUESTS) => {
            return ProviderOutcome::TransientFailure {
                reason: format!("upstream rate limited the request with status {status}"),
            };
        }
        _ => {}
    }

    if status.is_server_error() {
        return ProviderOutcome::TransientFailure {
            reason: format!("upstream returned status {status}"),
        };
    }

    if status.is_client_error() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<response body unavailable>".to_owned());
        let reason = match (call, status) {
            (Call::ValidateUsername, StatusCode::NOT_FOUND) => {
                "username does not exist on the upstream platform".to_owned()
            }
            _ => format!("upstream rejected the request with status {status}: {body}"),
        };
        return ProviderOutcome::InvalidInput { reason };
    }

    ProviderOutcome::TransientFailure {
        reason: format!("unexpected upstream status {status}"),
    }
}
