//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod access_grant;
mod credential;
mod identifiers;
mod manual_task;
mod provisioning_state;
mod purchase;
mod resource;
mod retry_policy;
mod security;

pub use access_grant::{AccessGrant, AccessGrantParts, AccessGrantStatus, ProvisioningAction};
pub use credential::{
    CREDENTIAL_AGING_AFTER_HOURS, CREDENTIAL_STALE_AFTER_HOURS, CredentialAgeWarning,
    CredentialMetadata, EncryptedCredentialPair, EncryptedSecret, GCM_NONCE_LEN, GCM_TAG_LEN,
    credential_age_hours,
};
pub use identifiers::{
    AccessGrantId, CredentialId, IncidentId, JobId, ManualTaskId, ProtectedResourceId, PurchaseId,
    UserId,
};
pub use manual_task::{
    ManualTask, ManualTaskOrigin, ManualTaskParts, ManualTaskStatus, ManualTaskType,
};
pub use provisioning_state::{
    DegradeTransition, ProvisioningState, ProvisioningStatus, RecoverTransition,
};
pub use purchase::{CheckoutSessionId, PurchaseStatus};
pub use resource::ProtectedResource;
pub use retry_policy::RetryPolicy;
pub use security::AuditAction;
