use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use grantry_application::{
    AuditEvent, CompletePurchaseInput, EnqueueProvisioningJob, FanoutOutcome, FanoutRepository,
};
use grantry_core::{AppError, AppResult};
use grantry_domain::{
    AccessGrantId, AuditAction, CheckoutSessionId, ProvisioningAction, PurchaseId, PurchaseStatus,
};

use crate::postgres_audit_repository::append_audit_event;
use crate::postgres_provisioning_job_queue::enqueue_job;

/// PostgreSQL-backed payment-completion fan-out.
#[derive(Clone)]
pub struct PostgresFanoutRepository {
    pool: PgPool,
}

impl PostgresFanoutRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_purchase_id(
        &self,
        checkout_session_id: &CheckoutSessionId,
    ) -> AppResult<Option<PurchaseId>> {
        let id = sqlx::query_scalar::<_, uuid::Uuid>(
            r#"
            SELECT id
            FROM purchases
            WHERE checkout_session_id = $1
            "#,
        )
        .bind(checkout_session_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to load purchase for checkout session '{}': {error}",
                checkout_session_id.as_str()
            ))
        })?;

        Ok(id.map(PurchaseId::from_uuid))
    }
}

#[derive(Debug, FromRow)]
struct PurchaseRow {
    id: uuid::Uuid,
    status: String,
}

enum PurchaseClaim {
    Claimed(PurchaseId),
    AlreadyCompleted(PurchaseId),
    LostRace,
}

#[async_trait]
impl FanoutRepository for PostgresFanoutRepository {
    async fn complete_purchase(&self, input: CompletePurchaseInput) -> AppResult<FanoutOutcome> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to start fan-out transaction: {error}"))
        })?;

        let purchase_id = match claim_purchase(&mut transaction, &input).await? {
            PurchaseClaim::Claimed(purchase_id) => purchase_id,
            PurchaseClaim::AlreadyCompleted(purchase_id) => {
                rollback(transaction).await?;
                return Ok(FanoutOutcome::AlreadyProcessed {
                    purchase_id: Some(purchase_id),
                });
            }
            PurchaseClaim::LostRace => {
                rollback(transaction).await?;
                let purchase_id = self.find_purchase_id(&input.checkout_session_id).await?;
                return Ok(FanoutOutcome::AlreadyProcessed { purchase_id });
            }
        };

        let access_grant_ids = upsert_pending_grants(&mut transaction, &input).await?;
        for access_grant_id in &access_grant_ids {
            enqueue_job(
                &mut transaction,
                EnqueueProvisioningJob {
                    access_grant_id: *access_grant_id,
                    action: ProvisioningAction::Grant,
                    delay: Duration::ZERO,
                },
            )
            .await?;
        }

        append_audit_event(
            &mut transaction,
            &AuditEvent::new(
                input.subject.as_str(),
                AuditAction::PurchaseCompleted,
                "purchase",
                purchase_id,
            )
            .with_detail(json!({
                "checkout_session_id": input.checkout_session_id.as_str(),
                "user_id": input.user_id.to_string(),
                "access_grant_ids": access_grant_ids
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>(),
            })),
        )
        .await?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to commit fan-out for purchase '{purchase_id}': {error}"
            ))
        })?;

        Ok(FanoutOutcome::Processed {
            purchase_id,
            access_grant_ids,
        })
    }
}

async fn claim_purchase(
    transaction: &mut Transaction<'_, Postgres>,
    input: &CompletePurchaseInput,
) -> AppResult<PurchaseClaim> {
    let checkout_session_id = input.checkout_session_id.as_str();
    let existing = sqlx::query_as::<_, PurchaseRow>(
        r#"
        SELECT id, status
        FROM purchases
        WHERE checkout_session_id = $1
        FOR UPDATE
        "#,
    )
    .bind(checkout_session_id)
    .fetch_optional(&mut **transaction)
    .await
    .map_err(|error| {
        AppError::Internal(format!(
            "failed to lock purchase for checkout session '{checkout_session_id}': {error}"
        ))
    })?;

    if let Some(row) = existing {
        let purchase_id = PurchaseId::from_uuid(row.id);
        if PurchaseStatus::parse(row.status.as_str())? == PurchaseStatus::Completed {
            return Ok(PurchaseClaim::AlreadyCompleted(purchase_id));
        }

        sqlx::query(
            r#"
            UPDATE purchases
            SET status = 'completed', completed_at = now()
            WHERE id = $1
            "#,
        )
        .bind(row.id)
        .execute(&mut **transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to complete purchase '{purchase_id}': {error}"
            ))
        })?;

        return Ok(PurchaseClaim::Claimed(purchase_id));
    }

    let purchase_id = PurchaseId::new();
    let inserted = sqlx::query(
        r#"
        INSERT INTO purchases (
            id,
            checkout_session_id,
            user_id,
            status,
            completed_at,
            created_at
        )
        VALUES ($1, $2, $3, 'completed', now(), now())
        "#,
    )
    .bind(purchase_id.as_uuid())
    .bind(checkout_session_id)
    .bind(input.user_id.as_uuid())
    .execute(&mut **transaction)
    .await;

    match inserted {
        Ok(_) => Ok(PurchaseClaim::Claimed(purchase_id)),
        Err(error) => {
            if let sqlx::Error::Database(database_error) = &error {
                match database_error.code().as_deref() {
                    Some("23505") => return Ok(PurchaseClaim::LostRace),
                    Some("23503") => {
                        return Err(AppError::NotFound(format!(
                            "user '{}' does not exist",
                            input.user_id
                        )));
                    }
                    _ => {}
                }
            }

            Err(AppError::Internal(format!(
                "failed to insert purchase for checkout session '{checkout_session_id}': {error}"
            )))
        }
    }
}

async fn upsert_pending_grants(
    transaction: &mut Transaction<'_, Postgres>,
    input: &CompletePurchaseInput,
) -> AppResult<Vec<AccessGrantId>> {
    let ids = sqlx::query_scalar::<_, uuid::Uuid>(
        r#"
        INSERT INTO access_grants (
            id,
            user_id,
            resource_id,
            status,
            created_at,
            updated_at
        )
        SELECT gen_random_uuid(), $1, resources.id, 'pending', now(), now()
        FROM protected_resources resources
        WHERE resources.is_active
        ORDER BY resources.created_at ASC
        ON CONFLICT (user_id, resource_id) DO UPDATE
        SET
            status = 'pending',
            retry_count = 0,
            failure_reason = NULL,
            last_attempt_at = NULL,
            revoked_at = NULL,
            updated_at = now()
        WHERE access_grants.status <> 'granted'
        RETURNING id
        "#,
    )
    .bind(input.user_id.as_uuid())
    .fetch_all(&mut **transaction)
    .await
    .map_err(|error| {
        AppError::Internal(format!(
            "failed to upsert access grants for user '{}': {error}",
            input.user_id
        ))
    })?;

    Ok(ids.into_iter().map(AccessGrantId::from_uuid).collect())
}

async fn rollback(transaction: Transaction<'_, Postgres>) -> AppResult<()> {
    transaction.rollback().await.map_err(|error| {
        AppError::Internal(format!("failed to roll back fan-out transaction: {error}"))
    })
}
