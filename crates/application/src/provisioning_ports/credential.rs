use async_trait::async_trait;
use chrono::{DateTime, Utc};
use grantry_core::AppResult;
use grantry_domain::{CredentialMetadata, EncryptedCredentialPair, EncryptedSecret};

use super::AuditEvent;

/// Decrypted upstream session credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct UpstreamSession {
    /// Upstream API base URL.
    pub api_url: String,
    /// Session identifier header value.
    pub session_id: String,
    /// Session signature header value.
    pub session_signature: String,
}

impl std::fmt::Debug for UpstreamSession {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("UpstreamSession")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

/// Result of checking a credential pair against the upstream API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialValidation {
    /// Upstream accepted the session.
    Valid,
    /// Upstream rejected the session or could not be reached.
    Rejected {
        /// HTTP status when a response was received.
        status: Option<u16>,
        /// Failure description, e.g. the timeout kind.
        reason: String,
    },
}

/// New active credential row.
#[derive(Debug, Clone)]
pub struct NewCredential {
    /// Encrypted secret pair.
    pub secrets: EncryptedCredentialPair,
    /// Upstream API base URL.
    pub api_url: String,
    /// Operator subject.
    pub created_by: String,
    /// Successful validation timestamp.
    pub validated_at: DateTime<Utc>,
}

/// Persisted credential with its encrypted secrets.
#[derive(Debug, Clone)]
pub struct StoredCredential {
    /// Operator-safe metadata.
    pub metadata: CredentialMetadata,
    /// Encrypted secret pair.
    pub secrets: EncryptedCredentialPair,
}

/// Repository port for upstream credentials.
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    /// Returns the active credential, if any.
    async fn find_active_credential(&self) -> AppResult<Option<StoredCredential>>;

    /// Deactivates the current credential and inserts the new active one in
    /// one transaction, together with its audit entry. The audit entry's
    /// resource id is set to the new credential id.
    async fn replace_active_credential(
        &self,
        credential: NewCredential,
        audit: AuditEvent,
    ) -> AppResult<CredentialMetadata>;

    /// Stamps `last_used_at` on the active credential.
    async fn touch_last_used(&self, used_at: DateTime<Utc>) -> AppResult<()>;
}

/// Port for authenticated encryption of individual secrets.
pub trait SecretEncryptor: Send + Sync {
    /// Encrypts one secret with a fresh random nonce.
    fn encrypt_secret(&self, plaintext: &[u8]) -> AppResult<EncryptedSecret>;

    /// Decrypts and authenticates one secret.
    fn decrypt_secret(&self, secret: &EncryptedSecret) -> AppResult<Vec<u8>>;
}

/// Port for checking credentials against the upstream API before storage.
#[async_trait]
pub trait UpstreamCredentialValidator: Send + Sync {
    /// Performs one authenticated probe request.
    async fn validate(&self, session: &UpstreamSession) -> AppResult<CredentialValidation>;
}

/// Source of the session credentials automated providers should use.
#[async_trait]
pub trait UpstreamSessionSource: Send + Sync {
    /// Returns usable credentials, or `None` when none are configured.
    async fn current_session(&self) -> AppResult<Option<UpstreamSession>>;
}
