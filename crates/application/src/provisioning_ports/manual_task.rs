use async_trait::async_trait;
use grantry_core::AppResult;
use grantry_domain::{AccessGrant, AccessGrantId, ManualTask, ManualTaskId, ManualTaskType};

use super::AuditEvent;

/// Result of creating a manual task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManualTaskCreation {
    /// A new pending task was stored.
    Created(ManualTask),
    /// A pending task for the same grant and type already exists.
    AlreadyPending(ManualTask),
}

impl ManualTaskCreation {
    /// Returns the pending task.
    #[must_use]
    pub fn task(&self) -> &ManualTask {
        match self {
            Self::Created(task) | Self::AlreadyPending(task) => task,
        }
    }

    /// Returns whether a new task was stored.
    #[must_use]
    pub fn is_new(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Repository port for manual tasks.
#[async_trait]
pub trait ManualTaskRepository: Send + Sync {
    /// Stores a pending task unless one already exists for its grant and type.
    async fn create_pending_task(
        &self,
        task: ManualTask,
        audit: AuditEvent,
    ) -> AppResult<ManualTaskCreation>;

    /// Finds the pending task for one grant and type.
    async fn find_pending_task_for_grant(
        &self,
        grant_id: AccessGrantId,
        task_type: ManualTaskType,
    ) -> AppResult<Option<ManualTask>>;

    /// Finds one task.
    async fn find_task(&self, task_id: ManualTaskId) -> AppResult<Option<ManualTask>>;

    /// Lists pending tasks, oldest first.
    async fn list_pending_tasks(&self) -> AppResult<Vec<ManualTask>>;

    /// Closes a pending task and reconciles its linked grant in one
    /// transaction. Returns a conflict when the task is no longer pending.
    async fn close_task(
        &self,
        task: &ManualTask,
        grant: Option<&AccessGrant>,
        audit: Vec<AuditEvent>,
    ) -> AppResult<()>;
}
