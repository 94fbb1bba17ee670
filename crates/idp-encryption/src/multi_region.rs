//! Fan-out encryption across every configured KMS region, with
//! ordered-fallback decryption.

use crate::{CryptoError, CryptoResult, EncryptionContext, KmsClientPool, SecureBytes};
use base64::{engine::general_purpose::STANDARD, Engine};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Prefix every serialized [`RegionalCiphertext`] starts with.
pub const REGIONS_PREFIX: &[u8] = br#"{"regions""#;

/// Region identifier to base64 ciphertext, the multi-region wire format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegionalCiphertext {
    /// Ciphertexts keyed by region.
    pub regions: BTreeMap<String, String>,
}

/// A KMS ciphertext blob classified by shape.
#[derive(Debug)]
pub enum KmsCiphertext<'a> {
    /// `{"regions": {...}}` envelope.
    Regional(BTreeMap<String, Vec<u8>>),
    /// Untagged single-region blob.
    LegacyRaw(&'a [u8]),
}

impl<'a> KmsCiphertext<'a> {
    /// Classifies a blob purely by its leading bytes.
    pub fn sniff(ciphertext: &'a [u8]) -> CryptoResult<Self> {
        if !ciphertext.starts_with(REGIONS_PREFIX) {
            return Ok(Self::LegacyRaw(ciphertext));
        }

        let parsed: RegionalCiphertext = serde_json::from_slice(ciphertext)
            .map_err(|e| CryptoError::encryption(format!("malformed regional ciphertext: {e}")))?;

        let regions = parsed
            .regions
            .into_iter()
            .map(|(region, encoded)| {
                STANDARD
                    .decode(encoded)
                    .map(|blob| (region, blob))
                    .map_err(|e| CryptoError::encryption(format!("regional ciphertext is not base64: {e}")))
            })
            .collect::<CryptoResult<_>>()?;
        Ok(Self::Regional(regions))
    }
}

/// KMS client spanning all configured regions.
pub struct MultiRegionKmsClient {
    pool: Arc<KmsClientPool>,
    default_region: String,
    multi_region_enabled: bool,
}

impl MultiRegionKmsClient {
    /// Creates a client over `pool` with `default_region` preferred.
    #[must_use]
    pub fn new(pool: Arc<KmsClientPool>, default_region: impl Into<String>, multi_region_enabled: bool) -> Self {
        Self {
            pool,
            default_region: default_region.into(),
            multi_region_enabled,
        }
    }

    /// Encrypts under every region when multi-region mode is on, otherwise
    /// under the default region only (untagged legacy blob).
    ///
    /// Fails as a whole if any region fails.
    pub async fn encrypt(
        &self,
        key_id: &str,
        plaintext: &[u8],
        context: &EncryptionContext,
    ) -> CryptoResult<Vec<u8>> {
        if !self.multi_region_enabled {
            return self.encrypt_single_region(key_id, plaintext, context).await;
        }

        let calls = self.pool.regions().iter().map(|region| async move {
            let client = self.pool.client(region).await?.ok_or_else(|| {
                CryptoError::ExternalService(format!("no KMS client for {region}"))
            })?;
            let blob = client.encrypt(plaintext, key_id, context).await?;
            Ok::<_, CryptoError>((region.clone(), STANDARD.encode(blob)))
        });
        let regions: BTreeMap<String, String> = try_join_all(calls).await?.into_iter().collect();

        if regions.is_empty() {
            return Err(CryptoError::Config("no KMS regions configured".to_string()));
        }

        serde_json::to_vec(&RegionalCiphertext { regions })
            .map_err(|e| CryptoError::encryption(format!("regional ciphertext serialization failed: {e}")))
    }

    /// Encrypts under the default region only and returns its raw blob.
    pub async fn encrypt_single_region(
        &self,
        key_id: &str,
        plaintext: &[u8],
        context: &EncryptionContext,
    ) -> CryptoResult<Vec<u8>> {
        let client = self.pool.client(&self.default_region).await?.ok_or_else(|| {
            CryptoError::Config(format!("default region {} is not configured", self.default_region))
        })?;
        client.encrypt(plaintext, key_id, context).await
    }

    /// Decrypts either wire format, preferring the default region.
    pub async fn decrypt(
        &self,
        ciphertext: &[u8],
        context: &EncryptionContext,
    ) -> CryptoResult<SecureBytes> {
        match KmsCiphertext::sniff(ciphertext)? {
            KmsCiphertext::Regional(regions) => self.decrypt_regional(&regions, context).await,
            KmsCiphertext::LegacyRaw(blob) => {
                let client = self.pool.client(&self.default_region).await?.ok_or_else(|| {
                    CryptoError::encryption(format!(
                        "default region {} has no KMS client",
                        self.default_region
                    ))
                })?;
                client.decrypt(blob, context).await
            }
        }
    }

    /// Tries the default region first, then the rest in order. A region
    /// whose client cannot be built is skipped.
    async fn decrypt_regional(
        &self,
        regions: &BTreeMap<String, Vec<u8>>,
        context: &EncryptionContext,
    ) -> CryptoResult<SecureBytes> {
        let ordered = regions
            .get_key_value(&self.default_region)
            .into_iter()
            .chain(regions.iter().filter(|(r, _)| **r != self.default_region));

        let mut last_error = None;
        for (region, blob) in ordered {
            let client = match self.pool.client(region).await {
                Ok(Some(client)) => client,
                Ok(None) => continue,
                Err(e) => {
                    warn!(region = %region, error = %e, "KMS client unavailable, trying next region");
                    last_error = Some(e);
                    continue;
                }
            };
            if client.region() != self.default_region {
                debug!(region = %client.region(), default = %self.default_region, "decrypting via fallback region");
            }
            return client.decrypt(blob, context).await;
        }

        warn!(
            regions = ?regions.keys().collect::<Vec<_>>(),
            "no supported region found for ciphertext"
        );
        match last_error {
            Some(e) if e.is_external() => Err(e),
            _ => Err(CryptoError::encryption("no supported region found")),
        }
    }
}
