//! Access grant lifecycle.
//!
//! An access grant is one user's entitlement to one protected resource. It is
//! created PENDING by a fan-out trigger and only ever mutated through the
//! transition methods below, which keep the status/timestamp invariants:
//!
//! - GRANTED implies `granted_at` is set and `failure_reason` is empty.
//! - REVOKED implies `revoked_at` is set.
//! - Only PENDING grants accept attempt bookkeeping.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use grantry_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::{AccessGrantId, JobId, ProtectedResourceId, UserId};

/// Lifecycle status of one access grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessGrantStatus {
    /// Waiting for provisioning (automated, deferred, or manual).
    Pending,
    /// Access is active on the upstream platform.
    Granted,
    /// Provisioning exhausted retries or the input was invalid.
    Failed,
    /// Access was removed from the upstream platform.
    Revoked,
}

impl AccessGrantStatus {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Granted => "granted",
            Self::Failed => "failed",
            Self::Revoked => "revoked",
        }
    }

    /// Parses storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        Self::from_str(value)
    }
}

impl FromStr for AccessGrantStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "granted" => Ok(Self::Granted),
            "failed" => Ok(Self::Failed),
            "revoked" => Ok(Self::Revoked),
            _ => Err(AppError::Validation(format!(
                "unknown access grant status '{value}'"
            ))),
        }
    }
}

/// Upstream operation a provisioning job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningAction {
    /// Grant access to the resource.
    Grant,
    /// Revoke access from the resource.
    Revoke,
}

impl ProvisioningAction {
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
                "unknown provisioning action '{value}'"
            ))),
        }
    }
}

/// Raw persisted fields used to rebuild an access grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGrantParts {
    /// Stable grant identifier.
    pub id: AccessGrantId,
    /// Entitled user.
    pub user_id: UserId,
    /// Protected resource.
    pub resource_id: ProtectedResourceId,
    /// Current lifecycle status.
    pub status: AccessGrantStatus,
    /// Ordinary failed attempts counted toward the terminal limit.
    pub retry_count: u32,
    /// Last failure or deferral reason.
    pub failure_reason: Option<String>,
    /// Timestamp of the most recent processing attempt.
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Timestamp access became active.
    pub granted_at: Option<DateTime<Utc>>,
    /// Timestamp access was removed.
    pub revoked_at: Option<DateTime<Utc>>,
    /// Queue job currently responsible for this grant.
    pub job_id: Option<JobId>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// One (user, protected resource) entitlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGrant {
    parts: AccessGrantParts,
}

impl AccessGrant {
    /// Creates a new PENDING grant.
    #[must_use]
    pub fn pending(user_id: UserId, resource_id: ProtectedResourceId, now: DateTime<Utc>) -> Self {
        Self {
            parts: AccessGrantParts {
                id: AccessGrantId::new(),
                user_id,
                resource_id,
                status: AccessGrantStatus::Pending,
                retry_count: 0,
                failure_reason: None,
                last_attempt_at: None,
                granted_at: None,
                revoked_at: None,
                job_id: None,
                created_at: now,
            },
        }
    }

    /// Rebuilds a grant from persisted fields, validating status invariants.
    pub fn from_parts(parts: AccessGrantParts) -> AppResult<Self> {
        match parts.status {
            AccessGrantStatus::Granted if parts.granted_at.is_none() => {
                return Err(AppError::Validation(format!(
                    "access grant '{}' is granted without granted_at",
                    parts.id
                )));
            }
            AccessGrantStatus::Granted if parts.failure_reason.is_some() => {
                return Err(AppError::Validation(format!(
                    "access grant '{}' is granted with a failure reason",
                    parts.id
                )));
            }
            AccessGrantStatus::Revoked if parts.revoked_at.is_none() => {
                return Err(AppError::Validation(format!(
                    "access grant '{}' is revoked without revoked_at",
                    parts.id
                )));
            }
            _ => {}
        }

        Ok(Self { parts })
    }

    /// Returns the grant identifier.
    #[must_use]
    pub fn id(&self) -> AccessGrantId {
        self.parts.id
    }

    /// Returns the entitled user.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.parts.user_id
    }

    /// Returns the protected resource.
    #[must_use]
    pub fn resource_id(&self) -> ProtectedResourceId {
        self.parts.resource_id
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub fn status(&self) -> AccessGrantStatus {
        self.parts.status
    }

    /// Returns ordinary failed attempts counted so far.
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.parts.retry_count
    }

    /// Returns the latest failure or deferral reason.
    #[must_use]
    pub fn failure_reason(&self) -> Option<&str> {
        self.parts.failure_reason.as_deref()
    }

    /// Returns the last attempt timestamp.
    #[must_use]
    pub fn last_attempt_at(&self) -> Option<DateTime<Utc>> {
        self.parts.last_attempt_at
    }

    /// Returns the grant timestamp.
    #[must_use]
    pub fn granted_at(&self) -> Option<DateTime<Utc>> {
        self.parts.granted_at
    }

    /// Returns the revocation timestamp.
    #[must_use]
    pub fn revoked_at(&self) -> Option<DateTime<Utc>> {
        self.parts.revoked_at
    }

    /// Returns the job currently responsible for this grant.
    #[must_use]
    pub fn job_id(&self) -> Option<JobId> {
        self.parts.job_id
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.parts.created_at
    }

    /// Returns the persisted field view.
    #[must_use]
    pub fn parts(&self) -> &AccessGrantParts {
        &self.parts
    }

    /// Returns whether the grant still waits for provisioning.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.parts.status == AccessGrantStatus::Pending
    }

    /// Binds the grant to the queue job now responsible for it.
    pub fn assign_job(&mut self, job_id: JobId) {
        self.parts.job_id = Some(job_id);
    }

    /// Records a deferral caused by an upstream outage.
    ///
    /// The retry counter is left untouched: outages never count toward the
    /// terminal-failure limit.
    pub fn record_deferral(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> AppResult<()> {
        self.require_pending("defer")?;
        self.parts.failure_reason = Some(reason.into());
        self.parts.last_attempt_at = Some(now);
        Ok(())
    }

    /// Records one ordinary failed attempt and returns the new retry count.
    pub fn record_failed_attempt(
        &mut self,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> AppResult<u32> {
        self.require_pending("record a failed attempt for")?;
        self.parts.retry_count = self.parts.retry_count.saturating_add(1);
        self.parts.failure_reason = Some(reason.into());
        self.parts.last_attempt_at = Some(now);
        Ok(self.parts.retry_count)
    }

    /// Records an attempt that handed the grant over to manual provisioning.
    pub fn record_manual_handoff(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        self.require_pending("hand off")?;
        self.parts.failure_reason = None;
        self.parts.last_attempt_at = Some(now);
        Ok(())
    }

    /// Moves the grant to the terminal FAILED status.
    pub fn mark_failed(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> AppResult<()> {
        self.require_pending("fail")?;
        self.parts.status = AccessGrantStatus::Failed;
        self.parts.failure_reason = Some(reason.into());
        self.parts.last_attempt_at = Some(now);
        Ok(())
    }

    /// Moves the grant to GRANTED.
    pub fn mark_granted(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        self.require_pending("grant")?;
        self.parts.status = AccessGrantStatus::Granted;
        self.parts.granted_at = Some(now);
        self.parts.failure_reason = None;
        self.parts.last_attempt_at = Some(now);
        Ok(())
    }

    /// Moves a GRANTED grant to REVOKED.
    pub fn mark_revoked(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        if self.parts.status != AccessGrantStatus::Granted {
            return Err(AppError::Conflict(format!(
                "access grant '{}' cannot be revoked from status '{}'",
                self.parts.id,
                self.parts.status.as_str()
            )));
        }

        self.parts.status = AccessGrantStatus::Revoked;
        self.parts.revoked_at = Some(now);
        self.parts.failure_reason = None;
        self.parts.last_attempt_at = Some(now);
        Ok(())
    }

    /// Records a failed revocation attempt without leaving GRANTED.
    ///
    /// GRANTED grants never carry a failure reason, so the failure itself is
    /// only kept in the job and audit trail.
    pub fn record_revoke_attempt(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        if self.parts.status != AccessGrantStatus::Granted {
            return Err(AppError::Conflict(format!(
                "access grant '{}' is not granted",
                self.parts.id
            )));
        }

        self.parts.last_attempt_at = Some(now);
        Ok(())
    }

    /// Resets a FAILED or PENDING grant for a fresh operator-requested run.
    pub fn reset_for_retry(&mut self) -> AppResult<()> {
        match self.parts.status {
            AccessGrantStatus::Failed | AccessGrantStatus::Pending => {
                self.parts.status = AccessGrantStatus::Pending;
                self.parts.retry_count = 0;
                self.parts.failure_reason = None;
                Ok(())
            }
            status => Err(AppError::Conflict(format!(
                "access grant '{}' cannot be retried from status '{}'",
                self.parts.id,
                status.as_str()
            ))),
        }
    }

    fn require_pending(&self, operation: &str) -> AppResult<()> {
        if self.parts.status != AccessGrantStatus::Pending {
            return Err(AppError::Conflict(format!(
                "cannot {operation} access grant '{}' in status '{}'",
                self.parts.id,
                self.parts.status.as_str()
            )));
        }

        Ok(())
    }
}
