//! Context-bound encryption of personal data.
//!
//! Writes `KMSc` when KMS is enabled and `LOCcv2` otherwise. Reads every
//! format ever written, whatever the current flag says.

use crate::{
    chunk, hash, CiphertextFormat, ContextlessKmsClient, CryptoResult, EncryptionContext,
    LocalEnvelopeCipher, MultiRegionKmsClient, SecureBytes,
};
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::debug;

/// Entry point for encrypting and decrypting PII under an encryption context.
pub struct EncryptionService {
    kms: Arc<MultiRegionKmsClient>,
    contextless: Arc<ContextlessKmsClient>,
    key_id: String,
    pepper: SecureBytes,
    use_kms: bool,
    cipher: LocalEnvelopeCipher,
}

impl EncryptionService {
    /// Creates the service. `pepper` keys the local fallback path.
    #[must_use]
    pub fn new(
        kms: Arc<MultiRegionKmsClient>,
        contextless: Arc<ContextlessKmsClient>,
        key_id: impl Into<String>,
        pepper: SecureBytes,
        use_kms: bool,
    ) -> Self {
        Self {
            kms,
            contextless,
            key_id: key_id.into(),
            pepper,
            use_kms,
            cipher: LocalEnvelopeCipher::new(),
        }
    }

    /// Encrypts `plaintext` bound to `context`.
    ///
    /// KMS failures propagate; there is no silent fallback to the local key.
    pub async fn encrypt(&self, plaintext: &[u8], context: &EncryptionContext) -> CryptoResult<Vec<u8>> {
        let chunks = chunk::split(plaintext);

        if self.use_kms {
            let sealed = try_join_all(
                chunks
                    .into_iter()
                    .map(|c| self.kms.encrypt(&self.key_id, c, context)),
            )
            .await?;
            return Ok(CiphertextFormat::Kms.wrap(&chunk::encode_json(&sealed)?));
        }

        let key = self.local_key(context)?;
        let sealed = chunks
            .into_iter()
            .map(|c| self.cipher.encrypt(c, &key))
            .collect::<CryptoResult<Vec<_>>>()?;
        Ok(CiphertextFormat::LocalV2.wrap(&chunk::encode_packed(&sealed)?))
    }

    /// Decrypts any supported format. Untagged and `KMSx` input takes the
    /// contextless path and ignores `context`.
    pub async fn decrypt(&self, ciphertext: &[u8], context: &EncryptionContext) -> CryptoResult<SecureBytes> {
        let (format, body) = CiphertextFormat::sniff(ciphertext);
        debug!(format = ?format, "decrypting ciphertext");

        match format {
            CiphertextFormat::Kms => {
                let chunks = chunk::decode_json(body)?;
                let plaintexts =
                    try_join_all(chunks.iter().map(|c| self.kms.decrypt(c, context))).await?;
                Ok(join(&plaintexts))
            }
            CiphertextFormat::Local => self.decrypt_local(&chunk::decode_json(body)?, context),
            CiphertextFormat::LocalV2 => self.decrypt_local(&chunk::decode_packed(body)?, context),
            CiphertextFormat::KmsContextless | CiphertextFormat::Legacy => {
                self.contextless.decrypt(ciphertext).await
            }
        }
    }

    fn decrypt_local(&self, chunks: &[Vec<u8>], context: &EncryptionContext) -> CryptoResult<SecureBytes> {
        let key = self.local_key(context)?;
        let plaintexts = chunks
            .iter()
            .map(|c| self.cipher.decrypt(c, &key))
            .collect::<CryptoResult<Vec<_>>>()?;
        Ok(join(&plaintexts))
    }

    /// `HMAC-SHA256(pepper, sorted keys and values of context)`.
    fn local_key(&self, context: &EncryptionContext) -> CryptoResult<SecureBytes> {
        hash::hmac_sha256(self.pepper.as_slice(), context.sorted_concat().as_bytes())
    }
}

fn join(parts: &[SecureBytes]) -> SecureBytes {
    let mut joined = SecureBytes::default();
    for part in parts {
        joined.extend_from_slice(part.as_slice());
    }
    joined
}
