//! AES-256-GCM encryptor for upstream session secrets at rest.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use grantry_application::SecretEncryptor;
use grantry_core::{AppError, AppResult};
use grantry_domain::{EncryptedSecret, GCM_NONCE_LEN, GCM_TAG_LEN};

/// AES-256-GCM encryptor. Every secret gets its own random nonce, and the
/// authentication tag is kept apart from the ciphertext.
#[derive(Clone)]
pub struct AesSecretEncryptor {
    cipher: Aes256Gcm,
}

impl AesSecretEncryptor {
    /// Creates a new encryptor from a 32-byte key.
    #[must_use]
    pub fn new(key_bytes: &[u8; 32]) -> Self {
        let cipher = Aes256Gcm::new(key_bytes.into());
        Self { cipher }
    }

    /// Creates a new encryptor from a hex-encoded 32-byte key.
    pub fn from_hex(hex_key: &str) -> AppResult<Self> {
        let decoded = hex::decode(hex_key.trim()).map_err(|error| {
            AppError::Validation(format!("invalid CREDENTIAL_ENCRYPTION_KEY hex: {error}"))
        })?;

        if decoded.len() != 32 {
            return Err(AppError::Validation(
                "CREDENTIAL_ENCRYPTION_KEY must be exactly 32 bytes (64 hex chars)".to_owned(),
            ));
        }

        let mut key = [0u8; 32];
        key.copy_from_slice(&decoded);
        Ok(Self::new(&key))
    }
}

impl SecretEncryptor for AesSecretEncryptor {
    fn encrypt_secret(&self, plaintext: &[u8]) -> AppResult<EncryptedSecret> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let mut sealed = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|error| AppError::Internal(format!("failed to encrypt secret: {error}")))?;

        // aes-gcm appends the tag to the ciphertext.
        let tag_start = sealed.len().checked_sub(GCM_TAG_LEN).ok_or_else(|| {
            AppError::Internal("sealed secret is shorter than the GCM tag".to_owned())
        })?;
        let tag_bytes = sealed.split_off(tag_start);

        let mut iv = [0u8; GCM_NONCE_LEN];
        iv.copy_from_slice(nonce.as_slice());
        let mut tag = [0u8; GCM_TAG_LEN];
        tag.copy_from_slice(&tag_bytes);

        Ok(EncryptedSecret {
            ciphertext: sealed,
            iv,
            tag,
        })
    }

    fn decrypt_secret(&self, secret: &EncryptedSecret) -> AppResult<Vec<u8>> {
        let mut sealed = Vec::with_capacity(secret.ciphertext.len() + GCM_TAG_LEN);
        sealed.extend_from_slice(&secret.ciphertext);
        sealed.extend_from_slice(&secret.tag);

        let nonce = Nonce::from(secret.iv);
        self.cipher
            .decrypt(&nonce, sealed.as_slice())
            .map_err(|error| AppError::Internal(format!("failed to decrypt secret: {error}")))
    }
}
