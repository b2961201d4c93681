use async_trait::async_trait;
use grantry_core::{AppError, AppResult};
use grantry_domain::{AccessGrantId, ProtectedResourceId};

/// Provider strategy identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Direct calls to the upstream HTTP API.
    AutomatedApi,
    /// Scripted browser login; permanently unavailable.
    BrowserAutomation,
    /// Operator-performed changes tracked as manual tasks.
    Manual,
}

impl ProviderKind {
    /// Returns stable configuration value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutomatedApi => "automated_api",
            Self::BrowserAutomation => "browser_automation",
            Self::Manual => "manual",
        }
    }

    /// Parses configuration value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "automated_api" => Ok(Self::AutomatedApi),
            "browser_automation" => Ok(Self::BrowserAutomation),
            "manual" => Ok(Self::Manual),
            _ => Err(AppError::Validation(format!(
                "unknown provisioning provider '{value}'"
            ))),
        }
    }
}

/// One grant or revoke call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningRequest {
    /// Grant being provisioned.
    pub access_grant_id: AccessGrantId,
    /// Customer username on the upstream platform.
    pub username: String,
    /// Local resource identifier.
    pub resource_id: ProtectedResourceId,
    /// Resource identifier on the upstream platform.
    pub upstream_resource_id: String,
}

/// Classified result of one provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderOutcome {
    /// The upstream change is in place.
    Succeeded,
    /// The request is legitimate but an operator has to perform it.
    RequiresManual {
        /// Why automation could not proceed.
        reason: String,
    },
    /// Upstream rejected the session credentials.
    AuthError {
        /// HTTP status when a response was received.
        status: Option<u16>,
        /// Diagnostic detail.
        reason: String,
    },
    /// Upstream rejected the request itself, e.g. unknown username.
    InvalidInput {
        /// Diagnostic detail.
        reason: String,
    },
    /// Network failure, timeout or upstream 5xx.
    TransientFailure {
        /// Diagnostic detail.
        reason: String,
    },
}

impl ProviderOutcome {
    /// Whether the call failed in a way a different provider might fix.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::AuthError { .. } | Self::InvalidInput { .. } | Self::TransientFailure { .. }
        )
    }
}

/// Pluggable access provisioning strategy.
#[async_trait]
pub trait AccessProvider: Send + Sync {
    /// Returns the strategy identifier.
    fn kind(&self) -> ProviderKind;

    /// Whether the provider can currently be selected.
    async fn is_configured(&self) -> bool;

    /// Checks that the username exists upstream.
    async fn validate_username(&self, username: &str) -> AppResult<ProviderOutcome>;

    /// Grants access to the upstream resource.
    async fn grant_access(&self, request: &ProvisioningRequest) -> AppResult<ProviderOutcome>;

    /// Revokes access to the upstream resource.
    async fn revoke_access(&self, request: &ProvisioningRequest) -> AppResult<ProviderOutcome>;
}
