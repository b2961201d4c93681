use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use grantry_application::{AuditEvent, ManualTaskCreation, ManualTaskRepository};
use grantry_core::{AppError, AppResult};
use grantry_domain::{
    AccessGrant, AccessGrantId, ManualTask, ManualTaskId, ManualTaskOrigin, ManualTaskParts,
    ManualTaskStatus, ManualTaskType, ProtectedResourceId,
};

use crate::postgres_access_grant_repository::update_access_grant;
use crate::postgres_audit_repository::append_audit_event;

/// PostgreSQL-backed manual task repository.
#[derive(Clone)]
pub struct PostgresManualTaskRepository {
    pool: PgPool,
}

impl PostgresManualTaskRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct ManualTaskRow {
    id: uuid::Uuid,
    task_type: String,
    target_username: String,
    resource_id: uuid::Uuid,
    access_grant_id: Option<uuid::Uuid>,
    origin: String,
    status: String,
    completed_by: Option<String>,
    completed_at: Option<DateTime<Utc>>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

#[async_trait]
impl ManualTaskRepository for PostgresManualTaskRepository {
    async fn create_pending_task(
        &self,
        task: ManualTask,
        audit: AuditEvent,
    ) -> AppResult<ManualTaskCreation> {
        let parts = task.parts();
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to start manual task transaction: {error}"))
        })?;

        let inserted = sqlx::query_scalar::<_, uuid::Uuid>(
            r#"
            INSERT INTO manual_tasks (
                id,
                task_type,
                target_username,
                resource_id,
                access_grant_id,
                origin,
                status,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7)
            ON CONFLICT (access_grant_id, task_type)
                WHERE status = 'pending' AND access_grant_id IS NOT NULL
            DO NOTHING
            RETURNING id
            "#,
        )
        .bind(parts.id.as_uuid())
        .bind(parts.task_type.as_str())
        .bind(parts.target_username.as_str())
        .bind(parts.resource_id.as_uuid())
        .bind(parts.access_grant_id.map(|grant_id| grant_id.as_uuid()))
        .bind(parts.origin.as_str())
        .bind(parts.created_at)
        .fetch_optional(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to create manual task: {error}"))
        })?;

        if inserted.is_none() {
            transaction.rollback().await.map_err(|error| {
                AppError::Internal(format!(
                    "failed to roll back duplicate manual task: {error}"
                ))
            })?;

            let grant_id = parts.access_grant_id.ok_or_else(|| {
                AppError::Internal("manual task insert conflicted without a grant".to_owned())
            })?;
            let existing = self
                .find_pending_task_for_grant(grant_id, parts.task_type)
                .await?
                .ok_or_else(|| {
                    AppError::Conflict(format!(
                        "pending manual task for access grant '{grant_id}' changed concurrently"
                    ))
                })?;
            return Ok(ManualTaskCreation::AlreadyPending(existing));
        }

        append_audit_event(&mut transaction, &audit).await?;
        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to commit manual task '{}': {error}",
                parts.id
            ))
        })?;

        Ok(ManualTaskCreation::Created(task))
    }

    async fn find_pending_task_for_grant(
        &self,
        grant_id: AccessGrantId,
        task_type: ManualTaskType,
    ) -> AppResult<Option<ManualTask>> {
        let row = sqlx::query_as::<_, ManualTaskRow>(
            r#"
            SELECT
                id,
                task_type,
                target_username,
                resource_id,
                access_grant_id,
                origin,
                status,
                completed_by,
                completed_at,
                notes,
                created_at
            FROM manual_tasks
            WHERE access_grant_id = $1
              AND task_type = $2
              AND status = 'pending'
            "#,
        )
        .bind(grant_id.as_uuid())
        .bind(task_type.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to load pending manual task for access grant '{grant_id}': {error}"
            ))
        })?;

        row.map(manual_task_from_row).transpose()
    }

    async fn find_task(&self, task_id: ManualTaskId) -> AppResult<Option<ManualTask>> {
        let row = sqlx::query_as::<_, ManualTaskRow>(
            r#"
            SELECT
                id,
                task_type,
                target_username,
                resource_id,
                access_grant_id,
                origin,
                status,
                completed_by,
                completed_at,
                notes,
                created_at
            FROM manual_tasks
            WHERE id = $1
            "#,
        )
        .bind(task_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to load manual task '{task_id}': {error}"))
        })?;

        row.map(manual_task_from_row).transpose()
    }

    async fn list_pending_tasks(&self) -> AppResult<Vec<ManualTask>> {
        let rows = sqlx::query_as::<_, ManualTaskRow>(
            r#"
            SELECT
                id,
                task_type,
                target_username,
                resource_id,
                access_grant_id,
                origin,
                status,
                completed_by,
                completed_at,
                notes,
                created_at
            FROM manual_tasks
            WHERE status = 'pending'
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list pending manual tasks: {error}"))
        })?;

        rows.into_iter().map(manual_task_from_row).collect()
    }

    async fn close_task(
        &self,
        task: &ManualTask,
        grant: Option<&AccessGrant>,
        audit: Vec<AuditEvent>,
    ) -> AppResult<()> {
        let parts = task.parts();
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to start manual task transaction: {error}"))
        })?;

        let result = sqlx::query(
            r#"
            UPDATE manual_tasks
            SET
                status = $2,
                completed_by = $3,
                completed_at = $4,
                notes = $5
            WHERE id = $1
              AND status = 'pending'
            "#,
        )
        .bind(parts.id.as_uuid())
        .bind(parts.status.as_str())
        .bind(parts.completed_by.as_deref())
        .bind(parts.completed_at)
        .bind(parts.notes.as_deref())
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to close manual task '{}': {error}",
                parts.id
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "manual task '{}' is no longer pending",
                parts.id
            )));
        }

        if let Some(grant) = grant {
            update_access_grant(&mut transaction, grant).await?;
        }
        for event in &audit {
            append_audit_event(&mut transaction, event).await?;
        }

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to commit manual task '{}': {error}",
                parts.id
            ))
        })
    }
}

fn manual_task_from_row(row: ManualTaskRow) -> AppResult<ManualTask> {
    Ok(ManualTask::from_parts(ManualTaskParts {
        id: ManualTaskId::from_uuid(row.id),
        task_type: ManualTaskType::parse(row.task_type.as_str())?,
        target_username: row.target_username,
        resource_id: ProtectedResourceId::from_uuid(row.resource_id),
        access_grant_id: row.access_grant_id.map(AccessGrantId::from_uuid),
        origin: ManualTaskOrigin::parse(row.origin.as_str())?,
        status: ManualTaskStatus::parse(row.status.as_str())?,
        completed_by: row.completed_by,
        completed_at: row.completed_at,
        notes: row.notes,
        created_at: row.created_at,
    }))
}

#[cfg(test)]
mod tests;
