use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgQueryResult;
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use grantry_application::{ClaimedProvisioningJob, EnqueueProvisioningJob, JobQueue};
use grantry_core::{AppError, AppResult};
use grantry_domain::{AccessGrantId, JobId, ProvisioningAction};

/// PostgreSQL-backed provisioning job queue.
///
/// Claims use `FOR UPDATE SKIP LOCKED` and fence every later transition on
/// the lease token, so a worker whose lease expired cannot finalize a job
/// another worker has reclaimed.
#[derive(Clone)]
pub struct PostgresProvisioningJobQueue {
    pool: PgPool,
}

impl PostgresProvisioningJobQueue {
    /// Creates a queue with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct ClaimedJobRow {
    job_id: uuid::Uuid,
    access_grant_id: uuid::Uuid,
    action: String,
    attempts: i32,
    deferrals: i32,
    lease_token: String,
}

#[async_trait]
impl JobQueue for PostgresProvisioningJobQueue {
    async fn enqueue(&self, job: EnqueueProvisioningJob) -> AppResult<JobId> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to start enqueue transaction: {error}"))
        })?;

        let job_id = enqueue_job(&mut transaction, job).await?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to commit provisioning job for access grant '{}': {error}",
                job.access_grant_id
            ))
        })?;

        Ok(job_id)
    }

    async fn claim_jobs(
        &self,
        worker_id: &str,
        limit: usize,
        lease_seconds: u32,
    ) -> AppResult<Vec<ClaimedProvisioningJob>> {
        let rows = sqlx::query_as::<_, ClaimedJobRow>(
            r#"
            WITH candidate_jobs AS (
                SELECT id
                FROM provisioning_jobs
                WHERE (status = 'pending' AND available_at <= now())
                   OR (status = 'leased' AND lease_expires_at < now())
                ORDER BY available_at ASC, created_at ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE provisioning_jobs jobs
            SET
                status = 'leased',
                leased_by = $2,
                lease_token = gen_random_uuid()::TEXT,
                lease_expires_at = now() + make_interval(secs => $3::INT),
                updated_at = now()
            FROM candidate_jobs
            WHERE jobs.id = candidate_jobs.id
            RETURNING
                jobs.id AS job_id,
                jobs.access_grant_id,
                jobs.action,
                jobs.attempts,
                jobs.deferrals,
                jobs.lease_token
            "#,
        )
        .bind(i64::try_from(limit).map_err(|error| {
            AppError::Validation(format!("invalid provisioning claim limit: {error}"))
        })?)
        .bind(worker_id)
        .bind(i32::try_from(lease_seconds).map_err(|error| {
            AppError::Validation(format!("invalid provisioning lease_seconds: {error}"))
        })?)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to claim provisioning jobs for worker '{worker_id}': {error}"
            ))
        })?;

        rows.into_iter().map(claimed_job_from_row).collect()
    }

    async fn complete_job(
        &self,
        job_id: JobId,
        worker_id: &str,
        lease_token: &str,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE provisioning_jobs
            SET
                status = 'completed',
                leased_by = NULL,
                lease_token = NULL,
                lease_expires_at = NULL,
                last_error = NULL,
                updated_at = now()
            WHERE id = $1
              AND leased_by = $2
              AND lease_token = $3
              AND status = 'leased'
            "#,
        )
        .bind(job_id.as_uuid())
        .bind(worker_id)
        .bind(lease_token)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to complete provisioning job '{job_id}' for worker '{worker_id}': {error}"
            ))
        })?;

        ensure_leased(result, job_id, worker_id)
    }

    async fn retry_job(
        &self,
        job_id: JobId,
        worker_id: &str,
        lease_token: &str,
        delay: Duration,
        error_message: &str,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE provisioning_jobs
            SET
                status = 'pending',
                attempts = attempts + 1,
                available_at = now() + make_interval(secs => $4::DOUBLE PRECISION),
                leased_by = NULL,
                lease_token = NULL,
                lease_expires_at = NULL,
                last_error = $5,
                updated_at = now()
            WHERE id = $1
              AND leased_by = $2
              AND lease_token = $3
              AND status = 'leased'
            "#,
        )
        .bind(job_id.as_uuid())
        .bind(worker_id)
        .bind(lease_token)
        .bind(delay.as_secs_f64())
        .bind(error_message)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to reschedule provisioning job '{job_id}' for worker '{worker_id}': {error}"
            ))
        })?;

        ensure_leased(result, job_id, worker_id)
    }

    async fn defer_job(
        &self,
        job_id: JobId,
        worker_id: &str,
        lease_token: &str,
        delay: Duration,
        reason: &str,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE provisioning_jobs
            SET
                status = 'pending',
                deferrals = deferrals + 1,
                available_at = now() + make_interval(secs => $4::DOUBLE PRECISION),
                leased_by = NULL,
                lease_token = NULL,
                lease_expires_at = NULL,
                last_error = $5,
                updated_at = now()
            WHERE id = $1
              AND leased_by = $2
              AND lease_token = $3
              AND status = 'leased'
            "#,
        )
        .bind(job_id.as_uuid())
        .bind(worker_id)
        .bind(lease_token)
        .bind(delay.as_secs_f64())
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to defer provisioning job '{job_id}' for worker '{worker_id}': {error}"
            ))
        })?;

        ensure_leased(result, job_id, worker_id)
    }

    async fn fail_job(
        &self,
        job_id: JobId,
        worker_id: &str,
        lease_token: &str,
        error_message: &str,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE provisioning_jobs
            SET
                status = 'failed',
                leased_by = NULL,
                lease_token = NULL,
                lease_expires_at = NULL,
                last_error = $4,
                updated_at = now()
            WHERE id = $1
              AND leased_by = $2
              AND lease_token = $3
              AND status = 'leased'
            "#,
        )
        .bind(job_id.as_uuid())
        .bind(worker_id)
        .bind(lease_token)
        .bind(error_message)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to mark provisioning job '{job_id}' as failed for worker '{worker_id}': {error}"
            ))
        })?;

        ensure_leased(result, job_id, worker_id)
    }
}

/// Supersedes pending jobs for the grant, inserts the new job and points the
/// grant at it, inside the caller's transaction.
pub(crate) async fn enqueue_job(
    transaction: &mut Transaction<'_, Postgres>,
    job: EnqueueProvisioningJob,
) -> AppResult<JobId> {
    let grant_id = job.access_grant_id;

    sqlx::query(
        r#"
        UPDATE provisioning_jobs
        SET status = 'superseded', updated_at = now()
        WHERE access_grant_id = $1
          AND status = 'pending'
        "#,
    )
    .bind(grant_id.as_uuid())
    .execute(&mut **transaction)
    .await
    .map_err(|error| {
        AppError::Internal(format!(
            "failed to supersede pending jobs for access grant '{grant_id}': {error}"
        ))
    })?;

    let job_id = JobId::new();
    sqlx::query(
        r#"
        INSERT INTO provisioning_jobs (
            id,
            access_grant_id,
            action,
            status,
            available_at,
            created_at,
            updated_at
        )
        VALUES ($1, $2, $3, 'pending', now() + make_interval(secs => $4::DOUBLE PRECISION), now(), now())
        "#,
    )
    .bind(job_id.as_uuid())
    .bind(grant_id.as_uuid())
    .bind(job.action.as_str())
    .bind(job.delay.as_secs_f64())
    .execute(&mut **transaction)
    .await
    .map_err(|error| {
        AppError::Internal(format!(
            "failed to enqueue provisioning job for access grant '{grant_id}': {error}"
        ))
    })?;

    let assigned = sqlx::query(
        r#"
        UPDATE access_grants
        SET job_id = $2, updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(grant_id.as_uuid())
    .bind(job_id.as_uuid())
    .execute(&mut **transaction)
    .await
    .map_err(|error| {
        AppError::Internal(format!(
            "failed to assign job '{job_id}' to access grant '{grant_id}': {error}"
        ))
    })?;

    if assigned.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "access grant '{grant_id}' does not exist"
        )));
    }

    Ok(job_id)
}

fn ensure_leased(result: PgQueryResult, job_id: JobId, worker_id: &str) -> AppResult<()> {
    if result.rows_affected() == 0 {
        return Err(AppError::Conflict(format!(
            "provisioning job '{job_id}' is not currently leased by worker '{worker_id}' with matching lease token"
        )));
    }

    Ok(())
}

fn claimed_job_from_row(row: ClaimedJobRow) -> AppResult<ClaimedProvisioningJob> {
    Ok(ClaimedProvisioningJob {
        job_id: JobId::from_uuid(row.job_id),
        access_grant_id: AccessGrantId::from_uuid(row.access_grant_id),
        action: ProvisioningAction::parse(row.action.as_str())?,
        attempts: u32::try_from(row.attempts).map_err(|error| {
            AppError::Internal(format!("invalid provisioning job attempts value: {error}"))
        })?,
        deferrals: u32::try_from(row.deferrals).map_err(|error| {
            AppError::Internal(format!("invalid provisioning job deferrals value: {error}"))
        })?,
        lease_token: row.lease_token,
    })
}
