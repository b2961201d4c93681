use serde::{Deserialize, Serialize};

/// Audit event actions emitted by provisioning flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    /// Provisioning entered DEGRADED.
    ProvisioningDegraded,
    /// Provisioning returned to HEALTHY.
    ProvisioningRecovered,
    /// Pending grants were requeued after recovery.
    ProvisioningResumed,
    /// A grant reached GRANTED.
    AccessGrantGranted,
    /// A grant reached FAILED.
    AccessGrantFailed,
    /// A grant reached REVOKED.
    AccessGrantRevoked,
    /// Revocation gave up while access is still live upstream.
    AccessGrantRevokeFailed,
    /// An operator re-queued a grant.
    AccessGrantRetryRequested,
    /// An operator requested revocation of a grant.
    AccessGrantRevokeRequested,
    /// A grant is waiting for an operator.
    AccessGrantAwaitingManual,
    /// New upstream credentials were stored.
    CredentialStored,
    /// Submitted upstream credentials were rejected.
    CredentialValidationFailed,
    /// A manual task was created.
    ManualTaskCreated,
    /// A manual task was completed.
    ManualTaskCompleted,
    /// A manual task was closed as failed.
    ManualTaskFailed,
    /// A purchase was completed and fanned out.
    PurchaseCompleted,
}

impl AuditAction {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProvisioningDegraded => "provisioning.degraded",
            Self::ProvisioningRecovered => "provisioning.recovered",
            Self::ProvisioningResumed => "provisioning.resumed",
            Self::AccessGrantGranted => "access_grant.granted",
            Self::AccessGrantFailed => "access_grant.failed",
            Self::AccessGrantRevoked => "access_grant.revoked",
            Self::AccessGrantRevokeFailed => "access_grant.revoke_failed",
            Self::AccessGrantRetryRequested => "access_grant.retry_requested",
            Self::AccessGrantRevokeRequested => "access_grant.revoke_requested",
            Self::AccessGrantAwaitingManual => "access_grant.awaiting_manual",
            Self::CredentialStored => "credential.stored",
            Self::CredentialValidationFailed => "credential.validation_failed",
            Self::ManualTaskCreated => "manual_task.created",
            Self::ManualTaskCompleted => "manual_task.completed",
            Self::ManualTaskFailed => "manual_task.failed",
            Self::PurchaseCompleted => "purchase.completed",
        }
    }
}
