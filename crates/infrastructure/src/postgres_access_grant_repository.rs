use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use grantry_application::{
    AccessGrantRepository, AuditEvent, GrantTarget, GrantWriteFence, ProvisioningStats,
    ProvisioningStatsRepository,
};
use grantry_core::{AppError, AppResult};
use grantry_domain::{
    AccessGrant, AccessGrantId, AccessGrantParts, AccessGrantStatus, JobId, ProtectedResource,
    ProtectedResourceId, UserId,
};

use crate::postgres_audit_repository::append_audit_event;

/// PostgreSQL-backed access grant repository.
#[derive(Clone)]
pub struct PostgresAccessGrantRepository {
    pool: PgPool,
}

impl PostgresAccessGrantRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct AccessGrantRow {
    id: uuid::Uuid,
    user_id: uuid::Uuid,
    resource_id: uuid::Uuid,
    status: String,
    retry_count: i32,
    failure_reason: Option<String>,
    last_attempt_at: Option<DateTime<Utc>>,
    granted_at: Option<DateTime<Utc>>,
    revoked_at: Option<DateTime<Utc>>,
    job_id: Option<uuid::Uuid>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct GrantTargetRow {
    #[sqlx(flatten)]
    grant: AccessGrantRow,
    user_email: Option<String>,
    external_username: Option<String>,
    resource_name: String,
    upstream_resource_id: String,
    resource_is_active: bool,
    auto_provisioning_enabled: bool,
}

#[derive(Debug, FromRow)]
struct ProvisioningStatsRow {
    pending: i64,
    failed: i64,
    granted: i64,
    revoked: i64,
    manual_task_count: i64,
}

#[async_trait]
impl AccessGrantRepository for PostgresAccessGrantRepository {
    async fn find_grant(&self, grant_id: AccessGrantId) -> AppResult<Option<AccessGrant>> {
        let row = sqlx::query_as::<_, AccessGrantRow>(
            r#"
            SELECT
                id,
                user_id,
                resource_id,
                status,
                retry_count,
                failure_reason,
                last_attempt_at,
                granted_at,
                revoked_at,
                job_id,
                created_at
            FROM access_grants
            WHERE id = $1
            "#,
        )
        .bind(grant_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to load access grant '{grant_id}': {error}"))
        })?;

        row.map(access_grant_from_row).transpose()
    }

    async fn find_grant_target(&self, grant_id: AccessGrantId) -> AppResult<Option<GrantTarget>> {
        let row = sqlx::query_as::<_, GrantTargetRow>(
            r#"
            SELECT
                grants.id,
                grants.user_id,
                grants.resource_id,
                grants.status,
                grants.retry_count,
                grants.failure_reason,
                grants.last_attempt_at,
                grants.granted_at,
                grants.revoked_at,
                grants.job_id,
                grants.created_at,
                users.email AS user_email,
                users.external_username,
                resources.name AS resource_name,
                resources.upstream_resource_id,
                resources.is_active AS resource_is_active,
                resources.auto_provisioning_enabled
            FROM access_grants grants
            INNER JOIN users
                ON users.id = grants.user_id
            INNER JOIN protected_resources resources
                ON resources.id = grants.resource_id
            WHERE grants.id = $1
            "#,
        )
        .bind(grant_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to load provisioning target for access grant '{grant_id}': {error}"
            ))
        })?;

        let Some(row) = row else {
            return Ok(None);
        };

        let grant = access_grant_from_row(row.grant)?;
        let resource = ProtectedResource {
            id: grant.resource_id(),
            name: row.resource_name,
            upstream_resource_id: row.upstream_resource_id,
            is_active: row.resource_is_active,
            auto_provisioning_enabled: row.auto_provisioning_enabled,
        };

        Ok(Some(GrantTarget {
            grant,
            user_email: row.user_email,
            external_username: row.external_username,
            resource,
        }))
    }

    async fn save_grant(&self, grant: &AccessGrant, audit: Option<AuditEvent>) -> AppResult<()> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to start access grant transaction: {error}"
            ))
        })?;

        update_access_grant(&mut transaction, grant).await?;
        if let Some(audit) = audit {
            append_audit_event(&mut transaction, &audit).await?;
        }

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to commit access grant '{}': {error}",
                grant.id()
            ))
        })
    }

    async fn save_grant_for_job(
        &self,
        grant: &AccessGrant,
        fence: GrantWriteFence,
        audit: Option<AuditEvent>,
    ) -> AppResult<bool> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to start access grant transaction: {error}"
            ))
        })?;

        if !update_owned_access_grant(&mut transaction, grant, fence).await? {
            transaction.rollback().await.map_err(|error| {
                AppError::Internal(format!(
                    "failed to roll back access grant '{}': {error}",
                    grant.id()
                ))
            })?;
            return Ok(false);
        }

        if let Some(audit) = audit {
            append_audit_event(&mut transaction, &audit).await?;
        }

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to commit access grant '{}': {error}",
                grant.id()
            ))
        })?;

        Ok(true)
    }

    async fn list_resumable_grant_ids(&self) -> AppResult<Vec<AccessGrantId>> {
        let ids = sqlx::query_scalar::<_, uuid::Uuid>(
            r#"
            SELECT grants.id
            FROM access_grants grants
            WHERE grants.status = 'pending'
              AND NOT EXISTS (
                    SELECT 1
                    FROM manual_tasks tasks
                    WHERE tasks.access_grant_id = grants.id
                      AND tasks.status = 'pending'
                  )
            ORDER BY grants.created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list resumable access grants: {error}"))
        })?;

        Ok(ids.into_iter().map(AccessGrantId::from_uuid).collect())
    }
}

#[async_trait]
impl ProvisioningStatsRepository for PostgresAccessGrantRepository {
    async fn provisioning_stats(&self) -> AppResult<ProvisioningStats> {
        let row = sqlx::query_as::<_, ProvisioningStatsRow>(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed,
                COUNT(*) FILTER (WHERE status = 'granted') AS granted,
                COUNT(*) FILTER (WHERE status = 'revoked') AS revoked,
                (
                    SELECT COUNT(*)
                    FROM manual_tasks
                    WHERE status = 'pending'
                ) AS manual_task_count
            FROM access_grants
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to load provisioning stats: {error}"))
        })?;

        Ok(ProvisioningStats {
            pending: counter(row.pending),
            failed: counter(row.failed),
            granted: counter(row.granted),
            revoked: counter(row.revoked),
            manual_task_count: counter(row.manual_task_count),
        })
    }
}

fn counter(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

/// Writes grant state inside the caller's transaction. `job_id` is left to
/// the job queue.
pub(crate) async fn update_access_grant(
    transaction: &mut Transaction<'_, Postgres>,
    grant: &AccessGrant,
) -> AppResult<()> {
    let parts = grant.parts();
    let retry_count = i32::try_from(parts.retry_count).map_err(|error| {
        AppError::Validation(format!("invalid access grant retry_count: {error}"))
    })?;

    let result = sqlx::query(
        r#"
        UPDATE access_grants
        SET
            status = $2,
            retry_count = $3,
            failure_reason = $4,
            last_attempt_at = $5,
            granted_at = $6,
            revoked_at = $7,
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(parts.id.as_uuid())
    .bind(parts.status.as_str())
    .bind(retry_count)
    .bind(parts.failure_reason.as_deref())
    .bind(parts.last_attempt_at)
    .bind(parts.granted_at)
    .bind(parts.revoked_at)
    .execute(&mut **transaction)
    .await
    .map_err(|error| {
        AppError::Internal(format!(
            "failed to update access grant '{}': {error}",
            parts.id
        ))
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "access grant '{}' does not exist",
            parts.id
        )));
    }

    Ok(())
}

/// Writes grant state only while `fence` still holds; `false` when the job
/// has been superseded or the status moved underneath it.
async fn update_owned_access_grant(
    transaction: &mut Transaction<'_, Postgres>,
    grant: &AccessGrant,
    fence: GrantWriteFence,
) -> AppResult<bool> {
    let parts = grant.parts();
    let retry_count = i32::try_from(parts.retry_count).map_err(|error| {
        AppError::Validation(format!("invalid access grant retry_count: {error}"))
    })?;

    let result = sqlx::query(
        r#"
        UPDATE access_grants
        SET
            status = $2,
            retry_count = $3,
            failure_reason = $4,
            last_attempt_at = $5,
            granted_at = $6,
            revoked_at = $7,
            updated_at = now()
        WHERE id = $1
          AND job_id = $8
          AND status = $9
        "#,
    )
    .bind(parts.id.as_uuid())
    .bind(parts.status.as_str())
    .bind(retry_count)
    .bind(parts.failure_reason.as_deref())
    .bind(parts.last_attempt_at)
    .bind(parts.granted_at)
    .bind(parts.revoked_at)
    .bind(fence.job_id.as_uuid())
    .bind(fence.expected_status.as_str())
    .execute(&mut **transaction)
    .await
    .map_err(|error| {
        AppError::Internal(format!(
            "failed to update access grant '{}' for job '{}': {error}",
            parts.id, fence.job_id
        ))
    })?;

    Ok(result.rows_affected() > 0)
}

fn access_grant_from_row(row: AccessGrantRow) -> AppResult<AccessGrant> {
    let retry_count = u32::try_from(row.retry_count).map_err(|error| {
        AppError::Internal(format!(
            "invalid retry_count '{}' for access grant '{}': {error}",
            row.retry_count, row.id
        ))
    })?;

    AccessGrant::from_parts(AccessGrantParts {
        id: AccessGrantId::from_uuid(row.id),
        user_id: UserId::from_uuid(row.user_id),
        resource_id: ProtectedResourceId::from_uuid(row.resource_id),
        status: AccessGrantStatus::parse(row.status.as_str())?,
        retry_count,
        failure_reason: row.failure_reason,
        last_attempt_at: row.last_attempt_at,
        granted_at: row.granted_at,
        revoked_at: row.revoked_at,
        job_id: row.job_id.map(JobId::from_uuid),
        created_at: row.created_at,
    })
}

#[cfg(test)]
mod tests;
