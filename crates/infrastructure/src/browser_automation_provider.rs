use async_trait::async_trait;
use grantry_application::{AccessProvider, ProviderKind, ProviderOutcome, ProvisioningRequest};
use grantry_core::AppResult;

const UNAVAILABLE: &str = "browser automation provisioning is not available in this deployment";

/// Placeholder for scripted browser provisioning.
///
/// It always reports itself unconfigured so the selector never picks it; a
/// direct call hands the work to an operator.
#[derive(Clone, Copy, Debug, Default)]
pub struct BrowserAutomationProvider;

impl BrowserAutomationProvider {
    /// Creates the provider.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn unavailable() -> ProviderOutcome {
        ProviderOutcome::RequiresManual {
            reason: UNAVAILABLE.to_owned(),
        }
    }
}

#[async_trait]
impl AccessProvider for BrowserAutomationProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::BrowserAutomation
    }

    async fn is_configured(&self) -> bool {
        false
    }

    async fn validate_username(&self, _username: &str) -> AppResult<ProviderOutcome> {
        Ok(Self::unavailable())
    }

    async fn grant_access(&self, _request: &ProvisioningRequest) -> AppResult<ProviderOutcome> {
        Ok(Self::unavailable())
    }

    async fn revoke_access(&self, _request: &ProvisioningRequest) -> AppResult<ProviderOutcome> {
        Ok(Self::unavailable())
    }
}
