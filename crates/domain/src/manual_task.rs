use chrono::{DateTime, Utc};
use grantry_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};

use crate::{AccessGrantId, ManualTaskId, ProtectedResourceId};

/// Upstream operation an operator performs by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualTaskType {
    /// Grant access by hand.
    Grant,
    /// Revoke access by hand.
    Revoke,
}

impl ManualTaskType {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grant => "grant",
            Self::Revoke => "revoke",
        }
    }

    /// Parses storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "grant" => Ok(Self::Grant),
            "revoke" => Ok(Self::Revoke),
            _ => Err(AppError::Validation(format!(
                "unknown manual task type '{value}'"
            ))),
        }
    }
}

/// Manual task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualTaskStatus {
    /// Waiting for an operator.
    Pending,
    /// Operator performed the upstream change.
    Completed,
    /// Operator could not perform the upstream change.
    Failed,
}

impl ManualTaskStatus {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(AppError::Validation(format!(
                "unknown manual task status '{value}'"
            ))),
        }
    }
}

/// Path that created a manual task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualTaskOrigin {
    /// The manual provider was selected for a job.
    ManualProvider,
    /// The resource has automated provisioning disabled.
    AutoProvisioningDisabled,
    /// An operator explicitly requested the manual fallback.
    OperatorFallback,
}

impl ManualTaskOrigin {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ManualProvider => "manual_provider",
            Self::AutoProvisioningDisabled => "auto_provisioning_disabled",
            Self::OperatorFallback => "operator_fallback",
        }
    }

    /// Parses storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "manual_provider" => Ok(Self::ManualProvider),
            "auto_provisioning_disabled" => Ok(Self::AutoProvisioningDisabled),
            "operator_fallback" => Ok(Self::OperatorFallback),
            _ => Err(AppError::Validation(format!(
                "unknown manual task origin '{value}'"
            ))),
        }
    }
}

/// Raw persisted fields used to rebuild a manual task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualTaskParts {
    /// Task identifier.
    pub id: ManualTaskId,
    /// Operation to perform.
    pub task_type: ManualTaskType,
    /// Upstream username to act on.
    pub target_username: String,
    /// Protected resource to act on.
    pub resource_id: ProtectedResourceId,
    /// Linked access grant, when the task reconciles one.
    pub access_grant_id: Option<AccessGrantId>,
    /// Creation path.
    pub origin: ManualTaskOrigin,
    /// Lifecycle status.
    pub status: ManualTaskStatus,
    /// Operator who closed the task.
    pub completed_by: Option<String>,
    /// Close timestamp.
    pub completed_at: Option<DateTime<Utc>>,
    /// Operator notes.
    pub notes: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Human-actionable grant or revoke request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualTask {
    parts: ManualTaskParts,
}

impl ManualTask {
    /// Creates a pending manual task.
    pub fn new(
        task_type: ManualTaskType,
        target_username: &str,
        resource_id: ProtectedResourceId,
        access_grant_id: Option<AccessGrantId>,
        origin: ManualTaskOrigin,
        now: DateTime<Utc>,
    ) -> AppResult<Self> {
        let target_username = NonEmptyString::new(target_username.trim())?;

        Ok(Self {
            parts: ManualTaskParts {
                id: ManualTaskId::new(),
                task_type,
                target_username: target_username.into(),
                resource_id,
                access_grant_id,
                origin,
                status: ManualTaskStatus::Pending,
                completed_by: None,
                completed_at: None,
                notes: None,
                created_at: now,
            },
        })
    }

    /// Rebuilds a task from persisted fields.
    #[must_use]
    pub fn from_parts(parts: ManualTaskParts) -> Self {
        Self { parts }
    }

    /// Returns the task identifier.
    #[must_use]
    pub fn id(&self) -> ManualTaskId {
        self.parts.id
    }

    /// Returns the operation type.
    #[must_use]
    pub fn task_type(&self) -> ManualTaskType {
        self.parts.task_type
    }

    /// Returns the target upstream username.
    #[must_use]
    pub fn target_username(&self) -> &str {
        self.parts.target_username.as_str()
    }

    /// Returns the target resource.
    #[must_use]
    pub fn resource_id(&self) -> ProtectedResourceId {
        self.parts.resource_id
    }

    /// Returns the linked access grant.
    #[must_use]
    pub fn access_grant_id(&self) -> Option<AccessGrantId> {
        self.parts.access_grant_id
    }

    /// Returns the creation path.
    #[must_use]
    pub fn origin(&self) -> ManualTaskOrigin {
        self.parts.origin
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub fn status(&self) -> ManualTaskStatus {
        self.parts.status
    }

    /// Returns the persisted field view.
    #[must_use]
    pub fn parts(&self) -> &ManualTaskParts {
        &self.parts
    }

    /// Closes the task as done.
    pub fn complete(
        &mut self,
        completed_by: &str,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        self.close(ManualTaskStatus::Completed, completed_by, notes, now)
    }

    /// Closes the task as not doable.
    pub fn fail(
        &mut self,
        completed_by: &str,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        self.close(ManualTaskStatus::Failed, completed_by, notes, now)
    }

    fn close(
        &mut self,
        status: ManualTaskStatus,
        completed_by: &str,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        if self.parts.status != ManualTaskStatus::Pending {
            return Err(AppError::Conflict(format!(
                "manual task '{}' is already {}",
                self.parts.id,
                self.parts.status.as_str()
            )));
        }

        self.parts.status = status;
        self.parts.completed_by = Some(completed_by.to_owned());
        self.parts.completed_at = Some(now);
        self.parts.notes = notes.filter(|value| !value.trim().is_empty());
        Ok(())
    }
}
