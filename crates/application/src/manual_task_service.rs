use std::sync::Arc;

use chrono::Utc;
use grantry_core::{AppError, AppResult, OperatorIdentity};
use grantry_domain::{
    AccessGrant, AccessGrantId, AccessGrantStatus, AuditAction, ManualTask, ManualTaskId,
    ManualTaskOrigin, ManualTaskStatus, ManualTaskType, ProtectedResourceId,
};
use serde_json::json;

use crate::provisioning_ports::{
    AccessGrantRepository, AccessNotice, AlertUrgency, AuditEvent, GrantTarget,
    ManualTaskCreation, ManualTaskRepository, OperatorAlert, ProvisioningNotifier,
};

/// Input for creating one manual task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateManualTaskInput {
    /// Operation to perform.
    pub task_type: ManualTaskType,
    /// Upstream username.
    pub target_username: String,
    /// Resource to act on.
    pub resource_id: ProtectedResourceId,
    /// Linked grant.
    pub access_grant_id: Option<AccessGrantId>,
    /// Creation path.
    pub origin: ManualTaskOrigin,
}

/// Application service for operator-actionable manual tasks.
#[derive(Clone)]
pub struct ManualTaskService {
    repository: Arc<dyn ManualTaskRepository>,
    grant_repository: Arc<dyn AccessGrantRepository>,
    notifier: Arc<dyn ProvisioningNotifier>,
}

impl ManualTaskService {
    /// Creates a manual task service.
    #[must_use]
    pub fn new(
        repository: Arc<dyn ManualTaskRepository>,
        grant_repository: Arc<dyn AccessGrantRepository>,
        notifier: Arc<dyn ProvisioningNotifier>,
    ) -> Self {
        Self {
            repository,
            grant_repository,
            notifier,
        }
    }

    /// Creates a pending task unless one already exists for the same grant
    /// and type. Operators are notified only for new tasks.
    pub async fn create_pending(
        &self,
        subject: &str,
        input: CreateManualTaskInput,
    ) -> AppResult<ManualTaskCreation> {
        let task = ManualTask::new(
            input.task_type,
            input.target_username.as_str(),
            input.resource_id,
            input.access_grant_id,
            input.origin,
            Utc::now(),
        )?;

        let audit = AuditEvent::new(
            subject,
            AuditAction::ManualTaskCreated,
            "manual_task",
            task.id(),
        )
        .with_detail(json!({
            "task_type": task.task_type().as_str(),
            "origin": task.origin().as_str(),
            "access_grant_id": task.access_grant_id().map(|id| id.to_string()),
        }));

        let creation = self.repository.create_pending_task(task, audit).await?;

        if creation.is_new() {
            let task = creation.task();
            tracing::info!(
                task_id = %task.id(),
                task_type = task.task_type().as_str(),
                origin = task.origin().as_str(),
                "manual task created"
            );

            let alert = OperatorAlert::new(
                AlertUrgency::Info,
                format!("Manual {} task", task.task_type().as_str()),
                format!(
                    "Please {} access for upstream user '{}' on resource {} (task {}).",
                    task.task_type().as_str(),
                    task.target_username(),
                    task.resource_id(),
                    task.id()
                ),
            );
            if let Err(error) = self.notifier.operator_alert(&alert).await {
                tracing::warn!(error = %error, "failed to send manual task alert");
            }
        }

        Ok(creation)
    }

    /// Explicit operator-triggered fallback: hands a PENDING or FAILED grant
    /// over to manual provisioning.
    pub async fn create_operator_fallback(
        &self,
        actor: &OperatorIdentity,
        grant_id: AccessGrantId,
    ) -> AppResult<ManualTask> {
        let GrantTarget {
            mut grant,
            external_username,
            resource,
            ..
        } = self
            .grant_repository
            .find_grant_target(grant_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("access grant '{grant_id}' not found")))?;

        let username = external_username
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "access grant '{grant_id}' has no upstream username"
                ))
            })?;

        match grant.status() {
            AccessGrantStatus::Pending => {}
            AccessGrantStatus::Failed => grant.reset_for_retry()?,
            status => {
                return Err(AppError::Conflict(format!(
                    "access grant '{grant_id}' is {} and needs no manual provisioning",
                    status.as_str()
                )));
            }
        }

        let creation = self
            .create_pending(
                actor.subject(),
                CreateManualTaskInput {
                    task_type: ManualTaskType::Grant,
                    target_username: username,
                    resource_id: resource.id,
                    access_grant_id: Some(grant_id),
                    origin: ManualTaskOrigin::OperatorFallback,
                },
            )
            .await?;

        grant.record_manual_handoff(Utc::now())?;
        self.grant_repository
            .save_grant(
                &grant,
                Some(
                    AuditEvent::new(
                        actor.subject(),
                        AuditAction::AccessGrantAwaitingManual,
                        "access_grant",
                        grant_id,
                    )
                    .with_detail(json!({
                        "task_id": creation.task().id().to_string(),
                        "origin": ManualTaskOrigin::OperatorFallback.as_str(),
                    })),
                ),
            )
            .await?;

        Ok(creation.task().clone())
    }

    /// Lists pending tasks.
    pub async fn list_pending(&self) -> AppResult<Vec<ManualTask>> {
        self.repository.list_pending_tasks().await
    }

    /// Returns whether a grant is waiting on a pending manual task.
    pub async fn is_awaiting_manual(
        &self,
        grant_id: AccessGrantId,
        task_type: ManualTaskType,
    ) -> AppResult<bool> {
        Ok(self
            .repository
            .find_pending_task_for_grant(grant_id, task_type)
            .await?
            .is_some())
    }

    /// Closes a task as done and applies it to the linked grant.
    pub async fn complete_task(
        &self,
        actor: &OperatorIdentity,
        task_id: ManualTaskId,
        notes: Option<String>,
    ) -> AppResult<ManualTask> {
        self.close_task(actor, task_id, ManualTaskStatus::Completed, notes)
            .await
    }

    /// Closes a task as not doable and applies it to the linked grant.
    pub async fn fail_task(
        &self,
        actor: &OperatorIdentity,
        task_id: ManualTaskId,
        notes: Option<String>,
    ) -> AppResult<ManualTask> {
        self.close_task(actor, task_id, ManualTaskStatus::Failed, notes)
            .await
    }

    async fn close_task(
        &self,
        actor: &OperatorIdentity,
        task_id: ManualTaskId,
        outcome: ManualTaskStatus,
        notes: Option<String>,
    ) -> AppResult<ManualTask> {
        let mut task = self
            .repository
            .find_task(task_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("manual task '{task_id}' not found")))?;

        let now = Utc::now();
        let action = match outcome {
            ManualTaskStatus::Completed => {
                task.complete(actor.subject(), notes, now)?;
                AuditAction::ManualTaskCompleted
            }
            ManualTaskStatus::Failed => {
                task.fail(actor.subject(), notes, now)?;
                AuditAction::ManualTaskFailed
            }
            ManualTaskStatus::Pending => {
                return Err(AppError::Validation(
                    "manual task can only be closed as completed or failed".to_owned(),
                ));
            }
        };

        let mut audit = vec![
            AuditEvent::new(actor.subject(), action, "manual_task", task.id()).with_detail(
                json!({
                    "task_type": task.task_type().as_str(),
                    "notes": task.parts().notes,
                }),
            ),
        ];

        let target = match task.access_grant_id() {
            Some(grant_id) => self.grant_repository.find_grant_target(grant_id).await?,
            None => None,
        };

        let mut reconciled: Option<AccessGrant> = None;
        let mut notice_kind = None;
        if let Some(target) = &target {
            let mut grant = target.grant.clone();
            if let Some(grant_action) = reconcile_grant(&mut grant, &task, now)? {
                audit.push(
                    AuditEvent::new(actor.subject(), grant_action, "access_grant", grant.id())
                        .with_detail(json!({ "manual_task_id": task.id().to_string() })),
                );
                notice_kind = Some(grant_action);
                reconciled = Some(grant);
            }
        }

        self.repository
            .close_task(&task, reconciled.as_ref(), audit)
            .await?;

        tracing::info!(
            task_id = %task.id(),
            status = task.status().as_str(),
            operator = %actor.subject(),
            "manual task closed"
        );

        if let (Some(target), Some(kind)) = (target, notice_kind) {
            let notice = AccessNotice {
                user_id: target.grant.user_id(),
                email: target.user_email,
                access_grant_id: target.grant.id(),
                resource_name: target.resource.name,
                reason: task.parts().notes.clone(),
            };
            let sent = match kind {
                AuditAction::AccessGrantGranted => self.notifier.access_granted(&notice).await,
                AuditAction::AccessGrantFailed => self.notifier.access_failed(&notice).await,
                _ => Ok(()),
            };
            if let Err(error) = sent {
                tracing::warn!(error = %error, "failed to notify customer about manual task");
            }
        }

        Ok(task)
    }
}

fn reconcile_grant(
    grant: &mut AccessGrant,
    task: &ManualTask,
    now: chrono::DateTime<Utc>,
) -> AppResult<Option<AuditAction>> {
    let action = match (task.task_type(), task.status(), grant.status()) {
        (ManualTaskType::Grant, ManualTaskStatus::Completed, AccessGrantStatus::Pending) => {
            grant.mark_granted(now)?;
            AuditAction::AccessGrantGranted
        }
        (ManualTaskType::Grant, ManualTaskStatus::Failed, AccessGrantStatus::Pending) => {
            grant.mark_failed("manual provisioning failed", now)?;
            AuditAction::AccessGrantFailed
        }
        (ManualTaskType::Revoke, ManualTaskStatus::Completed, AccessGrantStatus::Granted) => {
            grant.mark_revoked(now)?;
            AuditAction::AccessGrantRevoked
        }
        _ => return Ok(None),
    };

    Ok(Some(action))
}
