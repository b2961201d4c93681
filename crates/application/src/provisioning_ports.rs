mod access_grant;
mod audit;
mod credential;
mod fanout;
mod manual_task;
mod notifier;
mod provider;
mod queue;
mod state;
mod stats;

pub use access_grant::{AccessGrantRepository, GrantTarget, GrantWriteFence};
pub use audit::{AuditEvent, AuditRepository};
pub use credential::{
    CredentialRepository, CredentialValidation, NewCredential, SecretEncryptor, StoredCredential,
    UpstreamCredentialValidator, UpstreamSession, UpstreamSessionSource,
};
pub use fanout::{CompletePurchaseInput, FanoutOutcome, FanoutRepository};
pub use manual_task::{ManualTaskCreation, ManualTaskRepository};
pub use notifier::{AccessNotice, AlertUrgency, EmailService, OperatorAlert, ProvisioningNotifier};
pub use provider::{AccessProvider, ProviderKind, ProviderOutcome, ProvisioningRequest};
pub use queue::{ClaimedProvisioningJob, EnqueueProvisioningJob, JobDisposition, JobQueue};
pub use state::ProvisioningStateRepository;
pub use stats::{ProvisioningStats, ProvisioningStatsCache, ProvisioningStatsRepository};
