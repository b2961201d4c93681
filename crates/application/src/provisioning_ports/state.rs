use async_trait::async_trait;
use grantry_core::AppResult;
use grantry_domain::{DegradeTransition, ProvisioningState, RecoverTransition};
use serde_json::Value;

/// Repository port for the provisioning state singleton.
///
/// Both mutations are read-modify-write under a row lock, and write their
/// audit entry in the same transaction, so concurrent incident detection
/// converges on the first writer's incident.
#[async_trait]
pub trait ProvisioningStateRepository: Send + Sync {
    /// Loads the current state.
    async fn load_state(&self) -> AppResult<ProvisioningState>;

    /// Applies [`ProvisioningState::degrade`] atomically.
    async fn degrade(
        &self,
        reason: &str,
        metadata: Value,
        subject: &str,
    ) -> AppResult<(ProvisioningState, DegradeTransition)>;

    /// Applies [`ProvisioningState::recover`] atomically.
    async fn recover(&self, subject: &str) -> AppResult<(ProvisioningState, RecoverTransition)>;
}
