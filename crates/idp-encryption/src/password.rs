//! Password digests sealed by KMS under a per-user encryption context.

use crate::{
    hash, ContextlessKmsClient, CryptoError, CryptoResult, EncryptionContext,
    MultiRegionKmsClient, ScryptCost, SecureBytes, UserAccessKey,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Persisted credential digest.
///
/// `encryption_key` is only present on masked-key digests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordDigest {
    /// Base64 KMS ciphertext of the scrypt digest, or the hex hash of the
    /// content key for masked-key digests.
    pub encrypted_password: String,
    /// Hex salt.
    pub password_salt: String,
    /// Scrypt cost string.
    pub password_cost: String,
    /// Base64 masked KMS ciphertext.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_key: Option<String>,
}

impl PasswordDigest {
    /// Parses a stored digest string.
    pub fn parse(digest: &str) -> CryptoResult<Self> {
        serde_json::from_str(digest)
            .map_err(|e| CryptoError::encryption(format!("malformed password digest: {e}")))
    }

    /// Serializes for storage.
    pub fn to_json(&self) -> CryptoResult<String> {
        serde_json::to_string(self)
            .map_err(|e| CryptoError::encryption(format!("password digest serialization failed: {e}")))
    }

    /// True for masked-key digests.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.encryption_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

/// Both digests stored for one credential.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestPair {
    /// Digest sealed under the single-region key.
    #[serde(default)]
    pub single_region_digest: Option<String>,
    /// Digest sealed under the multi-region key.
    #[serde(default)]
    pub multi_region_digest: Option<String>,
}

impl DigestPair {
    /// The digest verification uses: multi-region when present.
    #[must_use]
    pub fn preferred(&self) -> Option<&str> {
        self.multi_region_digest
            .as_deref()
            .or(self.single_region_digest.as_deref())
    }
}

/// Returns true if `digest` parses and carries a non-empty `encryption_key`.
#[must_use]
pub fn is_stale_digest(digest: &str) -> bool {
    #[derive(Deserialize)]
    struct Probe {
        #[serde(default)]
        encryption_key: Option<String>,
    }

    serde_json::from_str::<Probe>(digest)
        .ok()
        .and_then(|p| p.encryption_key)
        .is_some_and(|k| !k.is_empty())
}

/// Creates and verifies credential digests.
pub struct PasswordVerifier {
    kms: Arc<MultiRegionKmsClient>,
    contextless: Arc<ContextlessKmsClient>,
    cost: ScryptCost,
    single_region_key_id: String,
    multi_region_key_id: String,
}

impl PasswordVerifier {
    /// Creates a verifier.
    #[must_use]
    pub fn new(
        kms: Arc<MultiRegionKmsClient>,
        contextless: Arc<ContextlessKmsClient>,
        cost: ScryptCost,
        single_region_key_id: impl Into<String>,
        multi_region_key_id: impl Into<String>,
    ) -> Self {
        Self {
            kms,
            contextless,
            cost,
            single_region_key_id: single_region_key_id.into(),
            multi_region_key_id: multi_region_key_id.into(),
        }
    }

    /// Hashes `password` under a fresh salt and seals the hash under both
    /// password keys. Failures propagate.
    pub async fn create_digest_pair(&self, password: &str, user_uuid: &str) -> CryptoResult<DigestPair> {
        let salt = hash::random_salt_hex();
        let digest = self.scrypt_b64(password, &salt, self.cost).await?;
        let context = EncryptionContext::password_digest(user_uuid);

        let (single, multi) = tokio::try_join!(
            self.kms
                .encrypt_single_region(&self.single_region_key_id, digest.as_bytes(), &context),
            self.kms
                .encrypt(&self.multi_region_key_id, digest.as_bytes(), &context),
        )?;

        let seal = |blob: Vec<u8>| PasswordDigest {
            encrypted_password: STANDARD.encode(blob),
            password_salt: salt.clone(),
            password_cost: self.cost.to_string(),
            encryption_key: None,
        };

        Ok(DigestPair {
            single_region_digest: Some(seal(single).to_json()?),
            multi_region_digest: Some(seal(multi).to_json()?),
        })
    }

    /// Checks `password` against the pair. Every failure is `false`.
    pub async fn verify(&self, password: &str, pair: &DigestPair, user_uuid: &str) -> bool {
        match self.try_verify(password, pair, user_uuid).await {
            Ok(matched) => matched,
            Err(e) => {
                debug!(error = %e, "password verification failed");
                false
            }
        }
    }

    /// See [`is_stale_digest`].
    #[must_use]
    pub fn is_stale_digest(&self, digest: &str) -> bool {
        is_stale_digest(digest)
    }

    async fn try_verify(&self, password: &str, pair: &DigestPair, user_uuid: &str) -> CryptoResult<bool> {
        let stored = pair
            .preferred()
            .ok_or_else(|| CryptoError::encryption("digest pair is empty"))?;
        let digest = PasswordDigest::parse(stored)?;

        if digest.is_stale() {
            return Ok(UserAccessKey::verify(password.as_bytes(), &digest, &self.contextless).await);
        }

        let cost: ScryptCost = digest.password_cost.parse()?;
        let expected = self.scrypt_b64(password, &digest.password_salt, cost).await?;

        let sealed = STANDARD
            .decode(&digest.encrypted_password)
            .map_err(|e| CryptoError::encryption(format!("encrypted_password is not base64: {e}")))?;
        let context = EncryptionContext::password_digest(user_uuid);
        let stored_digest = self.kms.decrypt(&sealed, &context).await?;

        Ok(hash::constant_time_eq(stored_digest.as_slice(), expected.as_bytes()))
    }

    async fn scrypt_b64(&self, password: &str, salt: &str, cost: ScryptCost) -> CryptoResult<String> {
        let raw = cost
            .digest_blocking(SecureBytes::from_slice(password.as_bytes()), salt.to_string())
            .await?;
        Ok(STANDARD.encode(raw.as_slice()))
    }
}
