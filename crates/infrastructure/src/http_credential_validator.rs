use async_trait::async_trait;
use grantry_application::{CredentialValidation, UpstreamCredentialValidator, UpstreamSession};
use grantry_core::AppResult;

use crate::upstream_http::{describe_transport_error, endpoint, with_session};

/// Validates submitted session credentials with one authenticated
/// `GET {api_url}/me` probe. Anything but a 2xx response rejects them.
#[derive(Clone)]
pub struct HttpCredentialValidator {
    http_client: reqwest::Client,
}

impl HttpCredentialValidator {
    /// Creates a validator. The client should carry the upstream timeout.
    #[must_use]
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl UpstreamCredentialValidator for HttpCredentialValidator {
    async fn validate(&self, session: &UpstreamSession) -> AppResult<CredentialValidation> {
        let url = endpoint(session.api_url.as_str(), &["me"])?;

        match with_session(self.http_client.get(url), session).send().await {
            Ok(response) if response.status().is_success() => Ok(CredentialValidation::Valid),
            Ok(response) => {
                let status = response.status();
                Ok(CredentialValidation::Rejected {
                    status: Some(status.as_u16()),
                    reason: format!("upstream responded with status {status}"),
                })
            }
            Err(error) => Ok(CredentialValidation::Rejected {
                status: None,
                reason: describe_transport_error(&error),
            }),
        }
    }
}
