//! Wiring of the KMS clients and services from one [`EncryptionConfig`].

use crate::{
    ContextlessKmsClient, CryptoResult, EncryptionConfig, EncryptionService, KmsClientPool,
    KmsConnector, MultiRegionKmsClient, PasswordVerifier, SecureBytes,
};
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::info;

/// Every encryption service sharing one regional client pool.
pub struct EncryptionServices {
    /// Regional client pool.
    pub pool: Arc<KmsClientPool>,
    /// Multi-region KMS client.
    pub kms: Arc<MultiRegionKmsClient>,
    /// Contextless KMS client.
    pub contextless: Arc<ContextlessKmsClient>,
    /// PII encryption.
    pub encryption: EncryptionService,
    /// Password digests.
    pub passwords: PasswordVerifier,
}

impl EncryptionServices {
    /// Builds the services over `connector` after validating `config`.
    pub fn new(config: &EncryptionConfig, connector: Arc<dyn KmsConnector>) -> CryptoResult<Self> {
        config.validate()?;
        let cost = config.scrypt_cost()?;
        let pepper = SecureBytes::from_slice(config.password_pepper.expose_secret().as_bytes());

        let pool = Arc::new(KmsClientPool::new(connector, config.regions(), config.timeout()));
        let kms = Arc::new(MultiRegionKmsClient::new(
            pool.clone(),
            config.aws_region.clone(),
            config.kms_multi_region_enabled,
        ));
        let contextless = Arc::new(ContextlessKmsClient::new(
            pool.clone(),
            config.aws_region.clone(),
            config.aws_kms_key_id.clone(),
            pepper.clone(),
            config.use_kms,
        ));
        let encryption = EncryptionService::new(
            kms.clone(),
            contextless.clone(),
            config.aws_kms_key_id.clone(),
            pepper,
            config.use_kms,
        );
        let passwords = PasswordVerifier::new(
            kms.clone(),
            contextless.clone(),
            cost,
            config.aws_kms_single_region_key_id.clone(),
            config.aws_kms_multi_region_key_id.clone(),
        );

        info!(
            use_kms = config.use_kms,
            multi_region = config.kms_multi_region_enabled,
            regions = ?pool.regions(),
            "encryption services initialized"
        );

        Ok(Self {
            pool,
            kms,
            contextless,
            encryption,
            passwords,
        })
    }

    /// Builds the services against AWS KMS.
    #[cfg(feature = "aws-kms")]
    pub fn aws(config: &EncryptionConfig) -> CryptoResult<Self> {
        let connector = crate::kms::aws::AwsKmsConnector::new(config.timeout());
        Self::new(config, Arc::new(connector))
    }
}
