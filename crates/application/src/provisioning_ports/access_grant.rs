use async_trait::async_trait;
use grantry_core::AppResult;
use grantry_domain::{AccessGrant, AccessGrantId, AccessGrantStatus, JobId, ProtectedResource};

use super::AuditEvent;

/// Everything the job processor needs to act on one grant.
#[derive(Debug, Clone)]
pub struct GrantTarget {
    /// The grant itself.
    pub grant: AccessGrant,
    /// Customer email for notifications.
    pub user_email: Option<String>,
    /// Customer username on the upstream platform.
    pub external_username: Option<String>,
    /// Resource the grant entitles.
    pub resource: ProtectedResource,
}

/// Ownership check for a write made by the job processor.
///
/// The write only lands while `job_id` is still the grant's current job and
/// the stored status is still `expected_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrantWriteFence {
    /// Job that loaded the grant.
    pub job_id: JobId,
    /// Status the job observed before acting.
    pub expected_status: AccessGrantStatus,
}

/// Repository port for access grant persistence.
///
/// `job_id` is owned by the job queue; saving a grant never overwrites it.
#[async_trait]
pub trait AccessGrantRepository: Send + Sync {
    /// Finds one grant.
    async fn find_grant(&self, grant_id: AccessGrantId) -> AppResult<Option<AccessGrant>>;

    /// Finds one grant with its user and resource context.
    async fn find_grant_target(&self, grant_id: AccessGrantId) -> AppResult<Option<GrantTarget>>;

    /// Persists grant state and its audit entry together.
    async fn save_grant(&self, grant: &AccessGrant, audit: Option<AuditEvent>) -> AppResult<()>;

    /// Persists grant state and its audit entry if the fence still holds.
    ///
    /// Returns `false`, writing nothing, when another job or an operator has
    /// taken the grant over in the meantime.
    async fn save_grant_for_job(
        &self,
        grant: &AccessGrant,
        fence: GrantWriteFence,
        audit: Option<AuditEvent>,
    ) -> AppResult<bool>;

    /// Lists PENDING grants that are not waiting on a manual task.
    async fn list_resumable_grant_ids(&self) -> AppResult<Vec<AccessGrantId>>;
}
