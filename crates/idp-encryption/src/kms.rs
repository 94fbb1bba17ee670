//! Key Management Service (KMS) providers.
//!
//! A provider is one regional KMS endpoint. Plaintexts are limited to
//! [`crate::MAX_KMS_PLAINTEXT`] bytes per call and the encryption context is
//! authenticated, so decrypt must be given the context used at encrypt time.

use crate::{local::base64_serde, EncryptionContext, SecureBytes};
use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors reported by a KMS endpoint.
#[derive(Debug, Error)]
pub enum KmsError {
    /// The service rejected the ciphertext (wrong key, context or bytes).
    #[error("invalid ciphertext: {0}")]
    InvalidCiphertext(String),

    /// The service could not be reached or failed server-side.
    #[error("KMS unavailable: {0}")]
    Unavailable(String),

    /// The call did not complete in time.
    #[error("KMS call timed out")]
    Timeout,
}

/// KMS provider trait for a single region.
#[async_trait]
pub trait KmsProvider: Send + Sync {
    /// Encrypts data directly with a master key.
    async fn encrypt(
        &self,
        key_id: &str,
        plaintext: &[u8],
        context: &EncryptionContext,
    ) -> Result<Vec<u8>, KmsError>;

    /// Decrypts data. The key is identified by the ciphertext itself.
    async fn decrypt(
        &self,
        ciphertext: &[u8],
        context: &EncryptionContext,
    ) -> Result<SecureBytes, KmsError>;
}

/// Local KMS provider for development/testing.
///
/// Holds one AES-256-GCM master key per key id and binds the encryption
/// context as AAD, mirroring what a real KMS enforces.
pub struct LocalKmsProvider {
    keys: RwLock<HashMap<String, SecureBytes>>,
}

#[derive(Serialize, Deserialize)]
struct LocalKmsBlob {
    key_id: String,
    #[serde(with = "base64_serde")]
    nonce: Vec<u8>,
    #[serde(with = "base64_serde")]
    ciphertext: Vec<u8>,
}

impl LocalKmsProvider {
    /// Creates a new local KMS provider with no keys.
    #[must_use]
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
        }
    }

    /// Adds a master key with the given material.
    ///
    /// Sharing material between providers models multi-region replica keys.
    #[must_use]
    pub fn with_key(self, key_id: impl Into<String>, material: SecureBytes) -> Self {
        self.keys.write().insert(key_id.into(), material);
        self
    }

    /// Adds a master key with fresh random material.
    #[must_use]
    pub fn with_random_key(self, key_id: impl Into<String>) -> Self {
        let mut key_bytes = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut key_bytes);
        self.with_key(key_id, SecureBytes::new(key_bytes))
    }

    fn cipher(&self, key_id: &str) -> Option<Aes256Gcm> {
        let keys = self.keys.read();
        let key = keys.get(key_id)?;
        Aes256Gcm::new_from_slice(key.as_slice()).ok()
    }
}

impl Default for LocalKmsProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KmsProvider for LocalKmsProvider {
    async fn encrypt(
        &self,
        key_id: &str,
        plaintext: &[u8],
        context: &EncryptionContext,
    ) -> Result<Vec<u8>, KmsError> {
        let cipher = self
            .cipher(key_id)
            .ok_or_else(|| KmsError::Unavailable(format!("key not found: {key_id}")))?;

        let mut nonce = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut nonce);
        let aad = context.to_aad();

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), Payload { msg: plaintext, aad: &aad })
            .map_err(|_| KmsError::Unavailable("AEAD encryption failed".to_string()))?;

        let blob = LocalKmsBlob {
            key_id: key_id.to_string(),
            nonce: nonce.to_vec(),
            ciphertext,
        };
        serde_json::to_vec(&blob).map_err(|e| KmsError::Unavailable(e.to_string()))
    }

    async fn decrypt(
        &self,
        ciphertext: &[u8],
        context: &EncryptionContext,
    ) -> Result<SecureBytes, KmsError> {
        let blob: LocalKmsBlob = serde_json::from_slice(ciphertext)
            .map_err(|e| KmsError::InvalidCiphertext(e.to_string()))?;
        if blob.nonce.len() != 12 {
            return Err(KmsError::InvalidCiphertext("bad nonce".to_string()));
        }

        let cipher = self
            .cipher(&blob.key_id)
            .ok_or_else(|| KmsError::InvalidCiphertext("unknown key".to_string()))?;
        let aad = context.to_aad();

        cipher
            .decrypt(
                Nonce::from_slice(&blob.nonce),
                Payload {
                    msg: &blob.ciphertext,
                    aad: &aad,
                },
            )
            .map(SecureBytes::new)
            .map_err(|_| KmsError::InvalidCiphertext("authentication failed".to_string()))
    }
}

#[cfg(feature = "aws-kms")]
pub mod aws {
    //! AWS KMS provider implementation.

    use super::*;
    use crate::region::KmsConnector;
    use crate::CryptoResult;
    use aws_sdk_kms::error::SdkError;
    use aws_sdk_kms::primitives::Blob;
    use aws_sdk_kms::Client as KmsClient;
    use std::sync::Arc;
    use std::time::Duration;

    /// AWS KMS provider.
    pub struct AwsKmsProvider {
        client: KmsClient,
    }

    impl AwsKmsProvider {
        /// Creates a provider for one region.
        pub async fn new(region: &str, timeout: Duration) -> Self {
            let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
                .region(aws_config::Region::new(region.to_string()))
                .timeout_config(
                    aws_config::timeout::TimeoutConfig::builder()
                        .operation_timeout(timeout)
                        .build(),
                )
                .load()
                .await;
            Self {
                client: KmsClient::new(&config),
            }
        }

        /// Creates a new AWS KMS provider with custom client.
        pub fn with_client(client: KmsClient) -> Self {
            Self { client }
        }
    }

    fn context_map(context: &EncryptionContext) -> Option<HashMap<String, String>> {
        (!context.is_empty()).then(|| context.to_map())
    }

    #[async_trait]
    impl KmsProvider for AwsKmsProvider {
        async fn encrypt(
            &self,
            key_id: &str,
            plaintext: &[u8],
            context: &EncryptionContext,
        ) -> Result<Vec<u8>, KmsError> {
            let result = self
                .client
                .encrypt()
                .key_id(key_id)
                .plaintext(Blob::new(plaintext))
                .set_encryption_context(context_map(context))
                .send()
                .await
                .map_err(|e| match e {
                    SdkError::TimeoutError(_) => KmsError::Timeout,
                    other => KmsError::Unavailable(other.to_string()),
                })?;

            let ciphertext = result
                .ciphertext_blob()
                .ok_or_else(|| KmsError::Unavailable("No ciphertext in response".to_string()))?;

            Ok(ciphertext.as_ref().to_vec())
        }

        async fn decrypt(
            &self,
            ciphertext: &[u8],
            context: &EncryptionContext,
        ) -> Result<SecureBytes, KmsError> {
            let result = self
                .client
                .decrypt()
                .ciphertext_blob(Blob::new(ciphertext))
                .set_encryption_context(context_map(context))
                .send()
                .await
                .map_err(|e| match e {
                    SdkError::TimeoutError(_) => KmsError::Timeout,
                    SdkError::ServiceError(ref service)
                        if service.err().is_invalid_ciphertext_exception() =>
                    {
                        KmsError::InvalidCiphertext(e.to_string())
                    }
                    other => KmsError::Unavailable(other.to_string()),
                })?;

            let plaintext = result
                .plaintext()
                .ok_or_else(|| KmsError::Unavailable("No plaintext in response".to_string()))?;

            Ok(SecureBytes::from_slice(plaintext.as_ref()))
        }
    }

    /// Connects one [`AwsKmsProvider`] per region.
    pub struct AwsKmsConnector {
        timeout: Duration,
    }

    impl AwsKmsConnector {
        /// Creates a connector whose clients use the given operation timeout.
        #[must_use]
        pub fn new(timeout: Duration) -> Self {
            Self { timeout }
        }
    }

    #[async_trait]
    impl KmsConnector for AwsKmsConnector {
        async fn connect(&self, region: &str) -> CryptoResult<Arc<dyn KmsProvider>> {
            Ok(Arc::new(AwsKmsProvider::new(region, self.timeout).await))
        }
    }
}
