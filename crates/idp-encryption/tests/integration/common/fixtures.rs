//! Test fixtures for integration tests.

use super::mocks::{MockConnector, MockKms};
use idp_encryption::{EncryptionConfig, EncryptionContext, EncryptionServices, SecureBytes};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// 32-byte test pepper.
pub const PEPPER: &str = "0123456789abcdef0123456789abcdef";

/// Default region.
pub const WEST: &str = "us-west-2";

/// Secondary region.
pub const EAST: &str = "us-east-1";

/// PII key.
pub const PII_KEY: &str = "alias/idp-pii";

/// Single-region password digest key.
pub const SINGLE_REGION_KEY: &str = "alias/idp-password-digest";

/// Multi-region password digest key.
pub const MULTI_REGION_KEY: &str = "alias/idp-password-digest-multi-region";

/// Cheap scrypt cost so tests stay fast.
pub const TEST_COST: &str = "800$8$1$";

/// Mock KMS regions sharing replica key material.
pub struct TestKms {
    regions: HashMap<String, Arc<MockKms>>,
}

impl TestKms {
    /// Creates one mock per region, all holding the same keys.
    pub fn new(regions: &[&str]) -> Self {
        let material = SecureBytes::from_slice(&[42u8; 32]);
        let keys = [PII_KEY, SINGLE_REGION_KEY, MULTI_REGION_KEY];
        Self {
            regions: regions
                .iter()
                .map(|r| (r.to_string(), Arc::new(MockKms::new(&keys, &material))))
                .collect(),
        }
    }

    /// Mock for one region.
    pub fn region(&self, region: &str) -> &Arc<MockKms> {
        &self.regions[region]
    }

    /// Connector exposing every mock region.
    pub fn connector(&self) -> Arc<MockConnector> {
        Arc::new(self.mock_connector())
    }

    /// Connector exposing every mock region but refusing to reach `region`.
    pub fn connector_refusing(&self, region: &str) -> Arc<MockConnector> {
        Arc::new(self.mock_connector().refusing(region))
    }

    fn mock_connector(&self) -> MockConnector {
        self.regions
            .iter()
            .fold(MockConnector::new(), |connector, (region, kms)| connector.with_region(region, kms.clone()))
    }
}

/// Config over `WEST` (default) and `EAST`.
pub fn test_config(use_kms: bool, multi_region: bool) -> EncryptionConfig {
    let mut config = EncryptionConfig::new(PEPPER);
    config.use_kms = use_kms;
    config.kms_multi_region_enabled = multi_region;
    config.aws_region = WEST.to_string();
    config.aws_kms_regions = vec![EAST.to_string()];
    config.scrypt_cost = TEST_COST.to_string();
    config
}

/// Services wired to `kms`.
pub fn services(kms: &TestKms, config: &EncryptionConfig) -> EncryptionServices {
    EncryptionServices::new(config, kms.connector()).expect("valid test config")
}

/// PII context for a user.
pub fn pii_context(user_uuid: &str) -> EncryptionContext {
    EncryptionContext::new()
        .with("context", "pii-encryption")
        .with("user_uuid", user_uuid)
}

/// Fresh user id.
pub fn test_user_uuid() -> String {
    Uuid::new_v4().to_string()
}

/// Deterministic plaintext of `len` bytes.
pub fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
