//! Context-free encryption: `KMSx` KMS chunks or the untagged pepper-keyed
//! local envelope.

use crate::{
    chunk, CiphertextFormat, CryptoError, CryptoResult, EncryptionContext, KmsClientPool,
    LocalEnvelopeCipher, RegionalKmsClient, SecureBytes,
};
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::debug;

/// Encrypts without an encryption context through the default region only.
///
/// When KMS is disabled the plaintext is sealed locally under the pepper and
/// written untagged, which is also how pre-KMS data was stored.
pub struct ContextlessKmsClient {
    pool: Arc<KmsClientPool>,
    default_region: String,
    key_id: String,
    pepper: SecureBytes,
    use_kms: bool,
    cipher: LocalEnvelopeCipher,
}

impl ContextlessKmsClient {
    /// Creates a client. `pepper` must be a 32-byte AES key.
    #[must_use]
    pub fn new(
        pool: Arc<KmsClientPool>,
        default_region: impl Into<String>,
        key_id: impl Into<String>,
        pepper: SecureBytes,
        use_kms: bool,
    ) -> Self {
        Self {
            pool,
            default_region: default_region.into(),
            key_id: key_id.into(),
            pepper,
            use_kms,
            cipher: LocalEnvelopeCipher::new(),
        }
    }

    /// Returns true if `ciphertext` carries the `KMSx` tag.
    #[must_use]
    pub fn looks_like_kms(ciphertext: &[u8]) -> bool {
        CiphertextFormat::sniff(ciphertext).0 == CiphertextFormat::KmsContextless
    }

    /// Encrypts `plaintext` with no context.
    pub async fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        if !self.use_kms {
            return self.cipher.encrypt(plaintext, &self.pepper);
        }

        let client = self.default_client().await?;
        let context = EncryptionContext::new();
        let chunks = try_join_all(
            chunk::split(plaintext)
                .into_iter()
                .map(|c| client.encrypt(c, &self.key_id, &context)),
        )
        .await?;

        Ok(CiphertextFormat::KmsContextless.wrap(&chunk::encode_json(&chunks)?))
    }

    /// Decrypts a `KMSx` ciphertext or an untagged local envelope.
    pub async fn decrypt(&self, ciphertext: &[u8]) -> CryptoResult<SecureBytes> {
        match CiphertextFormat::sniff(ciphertext) {
            (CiphertextFormat::KmsContextless, body) => {
                let client = self.default_client().await.map_err(|e| match e {
                    CryptoError::Config(msg) => CryptoError::Encryption(msg),
                    other => other,
                })?;
                let context = EncryptionContext::new();
                let chunks = chunk::decode_json(body)?;
                let plaintexts =
                    try_join_all(chunks.iter().map(|c| client.decrypt(c, &context))).await?;

                let mut joined = SecureBytes::default();
                for part in &plaintexts {
                    joined.extend_from_slice(part.as_slice());
                }
                Ok(joined)
            }
            _ => {
                debug!("decrypting untagged ciphertext with pepper key");
                self.cipher.decrypt(ciphertext, &self.pepper)
            }
        }
    }

    async fn default_client(&self) -> CryptoResult<Arc<RegionalKmsClient>> {
        self.pool.client(&self.default_region).await?.ok_or_else(|| {
            CryptoError::Config(format!("default region {} is not configured", self.default_region))
        })
    }
}
