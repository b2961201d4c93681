//! Upstream credential lifecycle.
//!
//! Storing credentials is the only path back to HEALTHY: a successful
//! upstream validation mints the [`CredentialValidated`] proof that
//! [`ProvisioningStateService::transition_to_healthy`] requires.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use grantry_core::{AppError, AppResult, OperatorIdentity};
use grantry_domain::{
    AuditAction, CredentialAgeWarning, CredentialId, CredentialMetadata, EncryptedCredentialPair,
};
use serde_json::json;

use crate::provisioning_ports::{
    AuditEvent, AuditRepository, CredentialRepository, CredentialValidation, NewCredential,
    SecretEncryptor, UpstreamCredentialValidator, UpstreamSession, UpstreamSessionSource,
};
use crate::provisioning_state_service::{ProvisioningStateService, RecoveryReport};

/// `last_used_at` is only re-stamped once it is older than this.
const LAST_USED_RESOLUTION_SECS: i64 = 60;

/// Proof that a credential passed upstream validation and was stored.
#[derive(Debug)]
pub struct CredentialValidated {
    credential_id: CredentialId,
}

impl CredentialValidated {
    /// Returns the validated credential.
    #[must_use]
    pub fn credential_id(&self) -> CredentialId {
        self.credential_id
    }
}

/// Operator credential submission.
#[derive(Clone)]
pub struct StoreCredentialsInput {
    /// Session identifier secret.
    pub session_id: String,
    /// Session signature secret.
    pub session_signature: String,
    /// Upstream API base URL; defaults to the configured one.
    pub api_url: Option<String>,
}

/// Result of a successful credential submission.
#[derive(Debug, Clone)]
pub struct StoreCredentialsResult {
    /// Metadata of the new active credential.
    pub metadata: CredentialMetadata,
    /// Provisioning recovery that followed.
    pub recovery: RecoveryReport,
}

/// Credential metadata with derived age.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialStatus {
    /// Stored metadata.
    pub metadata: CredentialMetadata,
    /// Whole hours since creation.
    pub age_hours: i64,
    /// Rotation warning tier.
    pub age_warning: CredentialAgeWarning,
}

/// Application service for upstream credentials.
#[derive(Clone)]
pub struct CredentialService {
    repository: Arc<dyn CredentialRepository>,
    encryptor: Arc<dyn SecretEncryptor>,
    validator: Arc<dyn UpstreamCredentialValidator>,
    audit_repository: Arc<dyn AuditRepository>,
    state_service: ProvisioningStateService,
    default_api_url: String,
    environment_session: Option<UpstreamSession>,
    decrypted: Arc<Mutex<Option<(CredentialId, UpstreamSession)>>>,
}

impl CredentialService {
    /// Creates a credential service.
    #[must_use]
    pub fn new(
        repository: Arc<dyn CredentialRepository>,
        encryptor: Arc<dyn SecretEncryptor>,
        validator: Arc<dyn UpstreamCredentialValidator>,
        audit_repository: Arc<dyn AuditRepository>,
        state_service: ProvisioningStateService,
        default_api_url: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            encryptor,
            validator,
            audit_repository,
            state_service,
            default_api_url: default_api_url.into(),
            environment_session: None,
            decrypted: Arc::new(Mutex::new(None)),
        }
    }

    /// Adds explicit environment credentials used when stored ones are
    /// missing or cannot be decrypted.
    #[must_use]
    pub fn with_environment_session(mut self, session: UpstreamSession) -> Self {
        self.environment_session = Some(session);
        self
    }

    /// Validates, encrypts and stores new upstream credentials, then
    /// recovers provisioning.
    pub async fn store_credentials(
        &self,
        actor: &OperatorIdentity,
        input: StoreCredentialsInput,
    ) -> AppResult<StoreCredentialsResult> {
        let session = self.normalize_input(input)?;

        match self.validator.validate(&session).await? {
            CredentialValidation::Valid => {}
            CredentialValidation::Rejected { status, reason } => {
                tracing::warn!(
                    status = ?status,
                    reason = %reason,
                    operator = %actor.subject(),
                    "upstream rejected submitted credentials"
                );

                self.audit_repository
                    .append_event(
                        AuditEvent::new(
                            actor.subject(),
                            AuditAction::CredentialValidationFailed,
                            "upstream_credential",
                            "pending",
                        )
                        .with_detail(json!({
                            "status": status,
                            "reason": reason,
                            "api_url": session.api_url,
                        })),
                    )
                    .await?;

                let detail = match status {
                    Some(status) => format!("HTTP {status}"),
                    None => reason,
                };
                return Err(AppError::Validation(format!(
                    "upstream rejected the submitted credentials ({detail})"
                )));
            }
        }

        let secrets = EncryptedCredentialPair {
            session_id: self.encryptor.encrypt_secret(session.session_id.as_bytes())?,
            session_signature: self
                .encryptor
                .encrypt_secret(session.session_signature.as_bytes())?,
        };

        let now = Utc::now();
        let metadata = self
            .repository
            .replace_active_credential(
                NewCredential {
                    secrets,
                    api_url: session.api_url.clone(),
                    created_by: actor.subject().to_owned(),
                    validated_at: now,
                },
                AuditEvent::new(
                    actor.subject(),
                    AuditAction::CredentialStored,
                    "upstream_credential",
                    "active",
                )
                .with_detail(json!({ "api_url": session.api_url })),
            )
            .await?;

        tracing::info!(
            credential_id = %metadata.id,
            operator = %actor.subject(),
            "stored new upstream credentials"
        );

        let proof = CredentialValidated {
            credential_id: metadata.id,
        };
        let recovery = self.state_service.transition_to_healthy(&proof, actor).await?;

        Ok(StoreCredentialsResult { metadata, recovery })
    }

    /// Returns active credential metadata with derived age, never secrets.
    pub async fn credential_metadata(&self) -> AppResult<Option<CredentialStatus>> {
        let now = Utc::now();
        Ok(self
            .repository
            .find_active_credential()
            .await?
            .map(|credential| CredentialStatus {
                age_hours: credential.metadata.age_hours(now),
                age_warning: credential.metadata.age_warning(now),
                metadata: credential.metadata,
            }))
    }

    /// Returns usable upstream credentials.
    ///
    /// Decryption failures fall back to environment credentials; without
    /// those the result is `None` ("not configured").
    pub async fn current_credentials(&self) -> AppResult<Option<UpstreamSession>> {
        let stored = match self.repository.find_active_credential().await? {
            Some(stored) => stored,
            None => return Ok(self.environment_session.clone()),
        };

        let session = match self.cached_session(stored.metadata.id) {
            Some(session) => session,
            None => match self.decrypt_pair(&stored.secrets) {
                Ok((session_id, session_signature)) => {
                    let session = UpstreamSession {
                        api_url: stored.metadata.api_url.clone(),
                        session_id,
                        session_signature,
                    };
                    if let Ok(mut cache) = self.decrypted.lock() {
                        *cache = Some((stored.metadata.id, session.clone()));
                    }
                    session
                }
                Err(error) => {
                    tracing::error!(
                        credential_id = %stored.metadata.id,
                        error = %error,
                        "failed to decrypt stored upstream credentials"
                    );

                    if self.environment_session.is_some() {
                        tracing::warn!("using environment upstream credentials");
                    }
                    return Ok(self.environment_session.clone());
                }
            },
        };

        self.stamp_last_used(&stored.metadata).await;
        Ok(Some(session))
    }

    async fn stamp_last_used(&self, metadata: &CredentialMetadata) {
        let now = Utc::now();
        let recent = metadata
            .last_used_at
            .is_some_and(|used_at| now - used_at < Duration::seconds(LAST_USED_RESOLUTION_SECS));
        if recent {
            return;
        }

        if let Err(error) = self.repository.touch_last_used(now).await {
            tracing::warn!(error = %error, "failed to stamp credential last_used_at");
        }
    }

    fn cached_session(&self, credential_id: CredentialId) -> Option<UpstreamSession> {
        let cache = self.decrypted.lock().ok()?;
        cache
            .as_ref()
            .filter(|(cached_id, _)| *cached_id == credential_id)
            .map(|(_, session)| session.clone())
    }

    fn decrypt_pair(&self, secrets: &EncryptedCredentialPair) -> AppResult<(String, String)> {
        let session_id = self.encryptor.decrypt_secret(&secrets.session_id)?;
        let session_signature = self.encryptor.decrypt_secret(&secrets.session_signature)?;

        Ok((utf8(session_id)?, utf8(session_signature)?))
    }

    fn normalize_input(&self, input: StoreCredentialsInput) -> AppResult<UpstreamSession> {
        let session_id = input.session_id.trim().to_owned();
        let session_signature = input.session_signature.trim().to_owned();
        if session_id.is_empty() || session_signature.is_empty() {
            return Err(AppError::Validation(
                "session_id and session_signature are required".to_owned(),
            ));
        }

        let api_url = input
            .api_url
            .map(|value| value.trim().trim_end_matches('/').to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| self.default_api_url.trim_end_matches('/').to_owned());
        if !(api_url.starts_with("https://") || api_url.starts_with("http://")) {
            return Err(AppError::Validation(format!(
                "api_url '{api_url}' must be an http(s) URL"
            )));
        }

        Ok(UpstreamSession {
            api_url,
            session_id,
            session_signature,
        })
    }
}

fn utf8(bytes: Vec<u8>) -> AppResult<String> {
    String::from_utf8(bytes)
        .map_err(|error| AppError::Internal(format!("decrypted secret is not utf-8: {error}")))
}

#[async_trait]
impl UpstreamSessionSource for CredentialService {
    async fn current_session(&self) -> AppResult<Option<UpstreamSession>> {
        self.current_credentials().await
    }
}
