//! Single-region KMS client and the per-region client pool.

use crate::{
    CryptoError, CryptoResult, EncryptionContext, KmsError, KmsProvider, SecureBytes,
    MAX_KMS_PLAINTEXT,
};
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Thin wrapper around one regional KMS endpoint.
///
/// Enforces the plaintext ceiling, bounds each call with a timeout and
/// translates [`KmsError`] into [`CryptoError`].
pub struct RegionalKmsClient {
    region: String,
    provider: Arc<dyn KmsProvider>,
    timeout: Duration,
}

impl RegionalKmsClient {
    /// Creates a client for `region`.
    #[must_use]
    pub fn new(region: impl Into<String>, provider: Arc<dyn KmsProvider>, timeout: Duration) -> Self {
        Self {
            region: region.into(),
            provider,
            timeout,
        }
    }

    /// Region this client talks to.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Encrypts at most [`MAX_KMS_PLAINTEXT`] bytes in one round-trip.
    pub async fn encrypt(
        &self,
        plaintext: &[u8],
        key_id: &str,
        context: &EncryptionContext,
    ) -> CryptoResult<Vec<u8>> {
        if plaintext.len() > MAX_KMS_PLAINTEXT {
            return Err(CryptoError::Argument(format!(
                "KMS plaintext of {} bytes exceeds {MAX_KMS_PLAINTEXT}",
                plaintext.len()
            )));
        }

        info!(
            target: "kms",
            action = "encrypt",
            region = %self.region,
            key_id,
            context = ?context.keys().collect::<Vec<_>>()
        );

        match tokio::time::timeout(self.timeout, self.provider.encrypt(key_id, plaintext, context)).await {
            Ok(result) => result.map_err(|e| self.map_error(e)),
            Err(_) => Err(self.map_error(KmsError::Timeout)),
        }
    }

    /// Decrypts one opaque KMS blob.
    pub async fn decrypt(
        &self,
        ciphertext: &[u8],
        context: &EncryptionContext,
    ) -> CryptoResult<SecureBytes> {
        info!(
            target: "kms",
            action = "decrypt",
            region = %self.region,
            context = ?context.keys().collect::<Vec<_>>()
        );

        match tokio::time::timeout(self.timeout, self.provider.decrypt(ciphertext, context)).await {
            Ok(result) => result.map_err(|e| self.map_error(e)),
            Err(_) => Err(self.map_error(KmsError::Timeout)),
        }
    }

    fn map_error(&self, err: KmsError) -> CryptoError {
        debug!(region = %self.region, error = %err, "KMS call failed");
        match err {
            KmsError::InvalidCiphertext(msg) => {
                CryptoError::Encryption(format!("KMS rejected ciphertext in {}: {msg}", self.region))
            }
            other => CryptoError::ExternalService(format!("{}: {other}", self.region)),
        }
    }
}

impl std::fmt::Debug for RegionalKmsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionalKmsClient")
            .field("region", &self.region)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Builds a provider handle for a region. Connecting may be expensive.
#[async_trait]
pub trait KmsConnector: Send + Sync {
    /// Connects to the KMS endpoint of `region`.
    async fn connect(&self, region: &str) -> CryptoResult<Arc<dyn KmsProvider>>;
}

/// Connector over providers built up front, for local development and tests.
#[derive(Default)]
pub struct StaticKmsConnector {
    providers: HashMap<String, Arc<dyn KmsProvider>>,
}

impl StaticKmsConnector {
    /// Creates an empty connector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the provider for a region.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>, provider: Arc<dyn KmsProvider>) -> Self {
        self.providers.insert(region.into(), provider);
        self
    }
}

#[async_trait]
impl KmsConnector for StaticKmsConnector {
    async fn connect(&self, region: &str) -> CryptoResult<Arc<dyn KmsProvider>> {
        self.providers
            .get(region)
            .cloned()
            .ok_or_else(|| CryptoError::ExternalService(format!("no KMS endpoint for {region}")))
    }
}

/// Memoized regional clients, one per configured region.
///
/// Regions outside the configured list are never connected.
pub struct KmsClientPool {
    connector: Arc<dyn KmsConnector>,
    regions: Vec<String>,
    timeout: Duration,
    clients: Mutex<LruCache<String, Arc<RegionalKmsClient>>>,
}

impl KmsClientPool {
    /// Creates a pool for the given regions.
    #[must_use]
    pub fn new(connector: Arc<dyn KmsConnector>, regions: Vec<String>, timeout: Duration) -> Self {
        let capacity = NonZeroUsize::new(regions.len()).unwrap_or(NonZeroUsize::MIN);
        Self {
            connector,
            regions,
            timeout,
            clients: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Configured regions.
    #[must_use]
    pub fn regions(&self) -> &[String] {
        &self.regions
    }

    /// Returns true if `region` is configured.
    #[must_use]
    pub fn supports(&self, region: &str) -> bool {
        self.regions.iter().any(|r| r == region)
    }

    /// Returns the client for `region`, connecting on first use.
    ///
    /// `Ok(None)` means the region is not configured.
    pub async fn client(&self, region: &str) -> CryptoResult<Option<Arc<RegionalKmsClient>>> {
        if !self.supports(region) {
            return Ok(None);
        }

        if let Some(client) = self.clients.lock().get(region) {
            return Ok(Some(Arc::clone(client)));
        }

        let provider = self.connector.connect(region).await?;
        let client = Arc::new(RegionalKmsClient::new(region, provider, self.timeout));
        debug!(region, "connected KMS client");

        let mut clients = self.clients.lock();
        if let Some(existing) = clients.get(region) {
            return Ok(Some(Arc::clone(existing)));
        }
        clients.put(region.to_string(), Arc::clone(&client));
        Ok(Some(client))
    }

    /// Number of connected clients.
    #[must_use]
    pub fn connected(&self) -> usize {
        self.clients.lock().len()
    }
}
