use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use grantry_application::{AuditEvent, CredentialRepository, NewCredential, StoredCredential};
use grantry_core::{AppError, AppResult};
use grantry_domain::{CredentialId, CredentialMetadata, EncryptedCredentialPair};

use crate::postgres_audit_repository::append_audit_event;

/// PostgreSQL-backed upstream credential repository.
#[derive(Clone)]
pub struct PostgresCredentialRepository {
    pool: PgPool,
}

impl PostgresCredentialRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct CredentialRow {
    id: uuid::Uuid,
    session_id_ciphertext: Vec<u8>,
    session_signature_ciphertext: Vec<u8>,
    iv: Vec<u8>,
    auth_tag: Vec<u8>,
    api_url: String,
    is_active: bool,
    validated_at: Option<DateTime<Utc>>,
    last_used_at: Option<DateTime<Utc>>,
    created_by: String,
    created_at: DateTime<Utc>,
}

#[async_trait]
impl CredentialRepository for PostgresCredentialRepository {
    async fn find_active_credential(&self) -> AppResult<Option<StoredCredential>> {
        let row = sqlx::query_as::<_, CredentialRow>(
            r#"
            SELECT
                id,
                session_id_ciphertext,
                session_signature_ciphertext,
                iv,
                auth_tag,
                api_url,
                is_active,
                validated_at,
                last_used_at,
                created_by,
                created_at
            FROM upstream_credentials
            WHERE is_active
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to load active upstream credential: {error}"))
        })?;

        row.map(stored_credential_from_row).transpose()
    }

    async fn replace_active_credential(
        &self,
        credential: NewCredential,
        audit: AuditEvent,
    ) -> AppResult<CredentialMetadata> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to start credential transaction: {error}"))
        })?;

        sqlx::query(
            r#"
            UPDATE upstream_credentials
            SET is_active = FALSE
            WHERE is_active
            "#,
        )
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to deactivate previous upstream credential: {error}"
            ))
        })?;

        let credential_id = CredentialId::new();
        let created_at = sqlx::query_scalar::<_, DateTime<Utc>>(
            r#"
            INSERT INTO upstream_credentials (
                id,
                session_id_ciphertext,
                session_signature_ciphertext,
                iv,
                auth_tag,
                api_url,
                is_active,
                validated_at,
                created_by,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, TRUE, $7, $8, now())
            RETURNING created_at
            "#,
        )
        .bind(credential_id.as_uuid())
        .bind(credential.secrets.session_id.ciphertext.as_slice())
        .bind(credential.secrets.session_signature.ciphertext.as_slice())
        .bind(credential.secrets.combined_iv())
        .bind(credential.secrets.combined_tag())
        .bind(credential.api_url.as_str())
        .bind(credential.validated_at)
        .bind(credential.created_by.as_str())
        .fetch_one(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to store upstream credential: {error}"))
        })?;

        let mut audit = audit;
        audit.resource_id = credential_id.to_string();
        append_audit_event(&mut transaction, &audit).await?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit upstream credential: {error}"))
        })?;

        Ok(CredentialMetadata {
            id: credential_id,
            api_url: credential.api_url,
            is_active: true,
            validated_at: Some(credential.validated_at),
            last_used_at: None,
            created_by: credential.created_by,
            created_at,
        })
    }

    async fn touch_last_used(&self, used_at: DateTime<Utc>) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE upstream_credentials
            SET last_used_at = $1
            WHERE is_active
            "#,
        )
        .bind(used_at)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to stamp upstream credential last_used_at: {error}"
            ))
        })?;

        Ok(())
    }
}

fn stored_credential_from_row(row: CredentialRow) -> AppResult<StoredCredential> {
    let secrets = EncryptedCredentialPair::from_stored(
        row.session_id_ciphertext,
        row.session_signature_ciphertext,
        row.iv.as_slice(),
        row.auth_tag.as_slice(),
    )?;

    Ok(StoredCredential {
        metadata: CredentialMetadata {
            id: CredentialId::from_uuid(row.id),
            api_url: row.api_url,
            is_active: row.is_active,
            validated_at: row.validated_at,
            last_used_at: row.last_used_at,
            created_by: row.created_by,
            created_at: row.created_at,
        },
        secrets,
    })
}
