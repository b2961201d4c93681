use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use grantry_application::{AuditEvent, AuditRepository};
use grantry_core::{AppError, AppResult};

/// PostgreSQL-backed append-only audit repository.
#[derive(Clone)]
pub struct PostgresAuditRepository {
    pool: PgPool,
}

impl PostgresAuditRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditRepository for PostgresAuditRepository {
    async fn append_event(&self, event: AuditEvent) -> AppResult<()> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to start audit transaction: {error}"))
        })?;

        append_audit_event(&mut transaction, &event).await?;

        transaction
            .commit()
            .await
            .map_err(|error| AppError::Internal(format!("failed to commit audit event: {error}")))
    }
}

/// Writes one audit entry inside the caller's transaction.
pub(crate) async fn append_audit_event(
    transaction: &mut Transaction<'_, Postgres>,
    event: &AuditEvent,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_log_entries (
            subject,
            action,
            resource_type,
            resource_id,
            detail
        )
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(event.subject.as_str())
    .bind(event.action.as_str())
    .bind(event.resource_type.as_str())
    .bind(event.resource_id.as_str())
    .bind(event.detail.clone())
    .execute(&mut **transaction)
    .await
    .map_err(|error| {
        AppError::Internal(format!(
            "failed to append audit event '{}': {error}",
            event.action.as_str()
        ))
    })?;

    Ok(())
}
