//! Application services and ports.

#![forbid(unsafe_code)]

mod credential_service;
mod fanout_service;
mod manual_task_service;
mod provider_selector;
mod provisioning_job_service;
mod provisioning_ports;
mod provisioning_state_service;
mod provisioning_status_service;
mod resume_service;

#[cfg(test)]
mod test_support;

pub use credential_service::{
    CredentialService, CredentialStatus, CredentialValidated, StoreCredentialsInput,
    StoreCredentialsResult,
};
pub use fanout_service::{FanoutService, PaymentCompletedInput};
pub use manual_task_service::{CreateManualTaskInput, ManualTaskService};
pub use provider_selector::{
    ManualAccessProvider, PrimaryProviderSetting, ProviderExecution, ProviderOperation,
    ProviderSelector,
};
pub use provisioning_job_service::ProvisioningJobService;
pub use provisioning_ports::{
    AccessGrantRepository, AccessNotice, AccessProvider, AlertUrgency, AuditEvent,
    AuditRepository, ClaimedProvisioningJob, CompletePurchaseInput, CredentialRepository,
    CredentialValidation, EmailService, EnqueueProvisioningJob, FanoutOutcome, FanoutRepository,
    GrantTarget, GrantWriteFence, JobDisposition, JobQueue, ManualTaskCreation,
    ManualTaskRepository, NewCredential, OperatorAlert, ProviderKind, ProviderOutcome,
    ProvisioningNotifier,
    ProvisioningRequest, ProvisioningStateRepository, ProvisioningStats, ProvisioningStatsCache,
    ProvisioningStatsRepository, SecretEncryptor, StoredCredential, UpstreamCredentialValidator,
    UpstreamSession, UpstreamSessionSource,
};
pub use provisioning_state_service::{ProvisioningStateService, RecoveryReport};
pub use provisioning_status_service::{ProvisioningStatusService, ProvisioningStatusView};
pub use resume_service::{ResumeService, ResumeSummary};
