use async_trait::async_trait;
use grantry_core::AppResult;
use grantry_domain::{ManualTaskOrigin, ManualTaskType};

use crate::manual_task_service::{CreateManualTaskInput, ManualTaskService};
use crate::provisioning_ports::{AccessProvider, ProviderKind, ProviderOutcome, ProvisioningRequest};

const MANUAL_PROVIDER_SUBJECT: &str = "system:manual-provider";

/// Provider that turns grant and revoke calls into manual tasks.
#[derive(Clone)]
pub struct ManualAccessProvider {
    manual_task_service: ManualTaskService,
}

impl ManualAccessProvider {
    /// Creates a manual provider.
    #[must_use]
    pub fn new(manual_task_service: ManualTaskService) -> Self {
        Self {
            manual_task_service,
        }
    }

    async fn request_task(
        &self,
        task_type: ManualTaskType,
        request: &ProvisioningRequest,
    ) -> AppResult<ProviderOutcome> {
        let creation = self
            .manual_task_service
            .create_pending(
                MANUAL_PROVIDER_SUBJECT,
                CreateManualTaskInput {
                    task_type,
                    target_username: request.username.clone(),
                    resource_id: request.resource_id,
                    access_grant_id: Some(request.access_grant_id),
                    origin: ManualTaskOrigin::ManualProvider,
                },
            )
            .await?;

        Ok(ProviderOutcome::RequiresManual {
            reason: format!("awaiting manual provisioning (task {})", creation.task().id()),
        })
    }
}

#[async_trait]
impl AccessProvider for ManualAccessProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Manual
    }

    async fn is_configured(&self) -> bool {
        true
    }

    async fn validate_username(&self, _username: &str) -> AppResult<ProviderOutcome> {
        Ok(ProviderOutcome::Succeeded)
    }

    async fn grant_access(&self, request: &ProvisioningRequest) -> AppResult<ProviderOutcome> {
        self.request_task(ManualTaskType::Grant, request).await
    }

    async fn revoke_access(&self, request: &ProvisioningRequest) -> AppResult<ProviderOutcome> {
        self.request_task(ManualTaskType::Revoke, request).await
    }
}
