//! Regional client pool integration tests.

use crate::common::*;
use idp_encryption::{EncryptionServices, KmsClientPool};
use std::time::Duration;

/// Tests each region is connected once however many calls go through it.
#[tokio::test]
async fn test_clients_are_memoized() {
    let kms = TestKms::new(&[WEST, EAST]);
    let connector = kms.connector();
    let services = EncryptionServices::new(&test_config(true, true), connector.clone()).unwrap();
    let ctx = pii_context("u-1");

    for _ in 0..5 {
        let ciphertext = services.encryption.encrypt(b"memo", &ctx).await.unwrap();
        services.encryption.decrypt(&ciphertext, &ctx).await.unwrap();
    }

    assert_eq!(connector.connects(), 2);
    assert_eq!(services.pool.connected(), 2);
}

/// Tests regions outside the configuration are never connected.
#[tokio::test]
async fn test_unconfigured_region_is_not_connected() {
    let kms = TestKms::new(&[WEST, EAST]);
    let connector = kms.connector();
    let pool = KmsClientPool::new(connector.clone(), vec![WEST.to_string()], Duration::from_secs(5));

    assert!(pool.client(EAST).await.unwrap().is_none());
    assert!(pool.client(WEST).await.unwrap().is_some());
    assert_eq!(connector.connects(), 1);
}

/// Tests the default region comes first and duplicates collapse.
#[test]
fn test_pool_regions_from_config() {
    let kms = TestKms::new(&[WEST, EAST]);
    let mut config = test_config(true, true);
    config.aws_kms_regions = vec![EAST.to_string(), WEST.to_string(), EAST.to_string()];

    let services = services(&kms, &config);
    assert_eq!(services.pool.regions(), [WEST.to_string(), EAST.to_string()]);
}
