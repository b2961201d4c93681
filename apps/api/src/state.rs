use grantry_application::{
    CredentialService, FanoutService, ManualTaskService, ProvisioningJobService,
    ProvisioningStatusService,
};
use sqlx::PgPool;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub fanout_service: FanoutService,
    pub credential_service: CredentialService,
    pub manual_task_service: ManualTaskService,
    pub provisioning_job_service: ProvisioningJobService,
    pub provisioning_status_service: ProvisioningStatusService,
    pub admin_api_token: String,
    pub payment_webhook_secret: String,
    pub postgres_pool: PgPool,
    pub redis_client: Option<redis::Client>,
}
