//! Upstream session credential storage layout and age tracking.

use chrono::{DateTime, Utc};
use grantry_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::CredentialId;

/// AES-GCM nonce length in bytes.
pub const GCM_NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length in bytes.
pub const GCM_TAG_LEN: usize = 16;

/// Credential age after which operators get a first rotation warning.
pub const CREDENTIAL_AGING_AFTER_HOURS: i64 = 7 * 24;

/// Credential age after which the warning escalates.
pub const CREDENTIAL_STALE_AFTER_HOURS: i64 = 14 * 24;

/// One secret encrypted with its own nonce and authentication tag.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedSecret {
    /// Ciphertext without the authentication tag.
    pub ciphertext: Vec<u8>,
    /// Random per-secret nonce.
    pub iv: [u8; GCM_NONCE_LEN],
    /// GCM authentication tag.
    pub tag: [u8; GCM_TAG_LEN],
}

impl std::fmt::Debug for EncryptedSecret {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("EncryptedSecret")
            .field("ciphertext_len", &self.ciphertext.len())
            .finish_non_exhaustive()
    }
}

/// Both upstream session secrets, encrypted independently and persisted as
/// one logical record.
///
/// The two nonces and the two tags are stored concatenated (session id
/// first) so that the pair can be loaded and verified together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedCredentialPair {
    /// Encrypted session identifier.
    pub session_id: EncryptedSecret,
    /// Encrypted session signature.
    pub session_signature: EncryptedSecret,
}

impl EncryptedCredentialPair {
    /// Returns both nonces concatenated for storage.
    #[must_use]
    pub fn combined_iv(&self) -> Vec<u8> {
        let mut combined = Vec::with_capacity(GCM_NONCE_LEN * 2);
        combined.extend_from_slice(&self.session_id.iv);
        combined.extend_from_slice(&self.session_signature.iv);
        combined
    }

    /// Returns both authentication tags concatenated for storage.
    #[must_use]
    pub fn combined_tag(&self) -> Vec<u8> {
        let mut combined = Vec::with_capacity(GCM_TAG_LEN * 2);
        combined.extend_from_slice(&self.session_id.tag);
        combined.extend_from_slice(&self.session_signature.tag);
        combined
    }

    /// Splits stored columns back into the two encrypted secrets.
    pub fn from_stored(
        session_id_ciphertext: Vec<u8>,
        session_signature_ciphertext: Vec<u8>,
        combined_iv: &[u8],
        combined_tag: &[u8],
    ) -> AppResult<Self> {
        if combined_iv.len() != GCM_NONCE_LEN * 2 {
            return Err(AppError::Validation(format!(
                "stored credential iv must be {} bytes, got {}",
                GCM_NONCE_LEN * 2,
                combined_iv.len()
            )));
        }

        if combined_tag.len() != GCM_TAG_LEN * 2 {
            return Err(AppError::Validation(format!(
                "stored credential tag must be {} bytes, got {}",
                GCM_TAG_LEN * 2,
                combined_tag.len()
            )));
        }

        let (first_iv, second_iv) = combined_iv.split_at(GCM_NONCE_LEN);
        let (first_tag, second_tag) = combined_tag.split_at(GCM_TAG_LEN);

        Ok(Self {
            session_id: EncryptedSecret {
                ciphertext: session_id_ciphertext,
                iv: fixed_bytes(first_iv)?,
                tag: fixed_bytes(first_tag)?,
            },
            session_signature: EncryptedSecret {
                ciphertext: session_signature_ciphertext,
                iv: fixed_bytes(second_iv)?,
                tag: fixed_bytes(second_tag)?,
            },
        })
    }
}

fn fixed_bytes<const N: usize>(bytes: &[u8]) -> AppResult<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| AppError::Validation(format!("expected {N} bytes, got {}", bytes.len())))
}

/// Rotation warning tier derived from credential age.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialAgeWarning {
    /// Younger than seven days.
    Fresh,
    /// At least seven days old.
    Aging,
    /// At least fourteen days old.
    Stale,
}

impl CredentialAgeWarning {
    /// Classifies a credential age in whole hours.
    #[must_use]
    pub fn from_age_hours(age_hours: i64) -> Self {
        if age_hours >= CREDENTIAL_STALE_AFTER_HOURS {
            Self::Stale
        } else if age_hours >= CREDENTIAL_AGING_AFTER_HOURS {
            Self::Aging
        } else {
            Self::Fresh
        }
    }

    /// Returns stable transport value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Aging => "aging",
            Self::Stale => "stale",
        }
    }
}

/// Age of a credential in whole hours, floored. Never negative.
#[must_use]
pub fn credential_age_hours(created_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - created_at).num_hours().max(0)
}

/// Credential metadata safe to expose to operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialMetadata {
    /// Credential identifier.
    pub id: CredentialId,
    /// Upstream API base URL the credential was validated against.
    pub api_url: String,
    /// Whether this is the active credential.
    pub is_active: bool,
    /// Timestamp of the successful upstream validation.
    pub validated_at: Option<DateTime<Utc>>,
    /// Timestamp of the last provider use.
    pub last_used_at: Option<DateTime<Utc>>,
    /// Operator who submitted the credential.
    pub created_by: String,
    /// Submission timestamp.
    pub created_at: DateTime<Utc>,
}

impl CredentialMetadata {
    /// Returns the credential age in whole hours.
    #[must_use]
    pub fn age_hours(&self, now: DateTime<Utc>) -> i64 {
        credential_age_hours(self.created_at, now)
    }

    /// Returns the rotation warning tier.
    #[must_use]
    pub fn age_warning(&self, now: DateTime<Utc>) -> CredentialAgeWarning {
        CredentialAgeWarning::from_age_hours(self.age_hours(now))
    }
}
