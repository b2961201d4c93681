mod common;
mod credentials;
mod grants;
mod manual_tasks;
mod status;
mod webhooks;

pub use credentials::{
    CredentialMetadataResponse, CredentialStatusResponse, RecoveryResponse,
    StoreCredentialsRequest, StoreCredentialsResponse,
};
pub use grants::{JobEnqueuedResponse, ManualFallbackResponse};
pub use manual_tasks::{CloseManualTaskRequest, ManualTaskResponse};
pub use status::{
    DependencyStatusResponse, HealthResponse, ProvisioningStatsResponse,
    ProvisioningStatusResponse,
};
pub use webhooks::{PaymentCompletedRequest, PaymentCompletedResponse};
