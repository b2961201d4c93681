use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use sqlx::{PgPool, Postgres, Transaction};

use grantry_application::{AuditEvent, ProvisioningStateRepository};
use grantry_core::{AppError, AppResult};
use grantry_domain::{
    AuditAction, DegradeTransition, ProvisioningState, RecoverTransition,
};

use crate::postgres_audit_repository::append_audit_event;

const PROVISIONING_STATE_KEY: &str = "provisioning_state";

/// PostgreSQL-backed provisioning state singleton stored in `system_config`.
#[derive(Clone)]
pub struct PostgresProvisioningStateRepository {
    pool: PgPool,
}

impl PostgresProvisioningStateRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin_locked(&self) -> AppResult<(Transaction<'static, Postgres>, ProvisioningState)> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to start provisioning state transaction: {error}"
            ))
        })?;

        sqlx::query(
            r#"
            INSERT INTO system_config (key, value)
            VALUES ($1, $2)
            ON CONFLICT (key) DO NOTHING
            "#,
        )
        .bind(PROVISIONING_STATE_KEY)
        .bind(encode_state(&ProvisioningState::healthy())?)
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to seed provisioning state: {error}"))
        })?;

        let value = sqlx::query_scalar::<_, Value>(
            r#"
            SELECT value
            FROM system_config
            WHERE key = $1
            FOR UPDATE
            "#,
        )
        .bind(PROVISIONING_STATE_KEY)
        .fetch_one(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to lock provisioning state: {error}"))
        })?;

        Ok((transaction, decode_state(value)?))
    }
}

#[async_trait]
impl ProvisioningStateRepository for PostgresProvisioningStateRepository {
    async fn load_state(&self) -> AppResult<ProvisioningState> {
        let value = sqlx::query_scalar::<_, Value>(
            r#"
            SELECT value
            FROM system_config
            WHERE key = $1
            "#,
        )
        .bind(PROVISIONING_STATE_KEY)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to load provisioning state: {error}"))
        })?;

        value
            .map(decode_state)
            .transpose()
            .map(Option::unwrap_or_default)
    }

    async fn degrade(
        &self,
        reason: &str,
        metadata: Value,
        subject: &str,
    ) -> AppResult<(ProvisioningState, DegradeTransition)> {
        let (mut transaction, mut state) = self.begin_locked().await?;
        let transition = state.degrade(reason, metadata, Utc::now());

        store_state(&mut transaction, &state).await?;
        if transition.is_new_incident() {
            append_audit_event(
                &mut transaction,
                &AuditEvent::new(
                    subject,
                    AuditAction::ProvisioningDegraded,
                    "provisioning_state",
                    transition.incident_id(),
                )
                .with_detail(json!({
                    "reason": reason,
                    "metadata": state.metadata,
                })),
            )
            .await?;
        }

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to commit provisioning degrade transition: {error}"
            ))
        })?;

        Ok((state, transition))
    }

    async fn recover(&self, subject: &str) -> AppResult<(ProvisioningState, RecoverTransition)> {
        let (mut transaction, mut state) = self.begin_locked().await?;
        let transition = state.recover(subject, Utc::now());

        let closed_incident = match transition {
            RecoverTransition::Recovered { incident_id } => {
                incident_id.map(|incident_id| incident_id.to_string())
            }
            RecoverTransition::AlreadyHealthy => None,
        };

        store_state(&mut transaction, &state).await?;
        append_audit_event(
            &mut transaction,
            &AuditEvent::new(
                subject,
                AuditAction::ProvisioningRecovered,
                "provisioning_state",
                PROVISIONING_STATE_KEY,
            )
            .with_detail(json!({
                "incident_id": closed_incident,
                "was_degraded": matches!(transition, RecoverTransition::Recovered { .. }),
            })),
        )
        .await?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to commit provisioning recover transition: {error}"
            ))
        })?;

        Ok((state, transition))
    }
}

async fn store_state(
    transaction: &mut Transaction<'_, Postgres>,
    state: &ProvisioningState,
) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE system_config
        SET value = $2, updated_at = now()
        WHERE key = $1
        "#,
    )
    .bind(PROVISIONING_STATE_KEY)
    .bind(encode_state(state)?)
    .execute(&mut **transaction)
    .await
    .map_err(|error| AppError::Internal(format!("failed to store provisioning state: {error}")))?;

    Ok(())
}

fn encode_state(state: &ProvisioningState) -> AppResult<Value> {
    serde_json::to_value(state).map_err(|error| {
        AppError::Internal(format!("failed to encode provisioning state: {error}"))
    })
}

fn decode_state(value: Value) -> AppResult<ProvisioningState> {
    serde_json::from_value(value).map_err(|error| {
        AppError::Internal(format!("stored provisioning state is malformed: {error}"))
    })
}
