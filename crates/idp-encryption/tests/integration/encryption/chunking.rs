//! Chunking integration tests.

use crate::common::*;
use idp_encryption::{chunk, CiphertextFormat, MAX_KMS_PLAINTEXT};

fn single_region_config() -> idp_encryption::EncryptionConfig {
    let mut config = test_config(true, false);
    config.aws_kms_regions.clear();
    config
}

/// Tests no KMS call ever sees more than the ceiling.
#[tokio::test]
async fn test_kms_calls_respect_ceiling() {
    let kms = TestKms::new(&[WEST]);
    let services = services(&kms, &single_region_config());
    let ctx = pii_context("u-1");

    for len in [1, 4096, 4097, 8193, 20000] {
        let plaintext = patterned(len);
        let ciphertext = services.encryption.encrypt(&plaintext, &ctx).await.unwrap();
        assert_eq!(
            services.encryption.decrypt(&ciphertext, &ctx).await.unwrap().as_slice(),
            &plaintext[..]
        );
    }

    let calls = kms.region(WEST).calls();
    assert!(!calls.is_empty());
    for call in calls.iter().filter(|c| c.action == "encrypt") {
        assert!(call.plaintext_len.unwrap() <= MAX_KMS_PLAINTEXT);
    }
}

/// Tests the chunk count follows `floor(len / 4096) + 1`.
#[tokio::test]
async fn test_chunk_counts() {
    let kms = TestKms::new(&[WEST]);
    let services = services(&kms, &single_region_config());
    let ctx = pii_context("u-1");

    for (len, expected) in [(100, 1), (4095, 1), (4096, 2), (8192, 3), (8194, 3)] {
        let ciphertext = services.encryption.encrypt(&patterned(len), &ctx).await.unwrap();
        let (format, body) = CiphertextFormat::sniff(&ciphertext);
        assert_eq!(format, CiphertextFormat::Kms);
        assert_eq!(chunk::decode_json(body).unwrap().len(), expected, "len={len}");
    }
}

/// Tests local chunks use the same split.
#[tokio::test]
async fn test_local_chunk_counts() {
    let kms = TestKms::new(&[WEST]);
    let services = services(&kms, &test_config(false, false));
    let ctx = pii_context("u-1");

    let plaintext = patterned(8194);
    let ciphertext = services.encryption.encrypt(&plaintext, &ctx).await.unwrap();
    let (_, body) = CiphertextFormat::sniff(&ciphertext);

    assert_eq!(chunk::decode_packed(body).unwrap().len(), 3);
    assert_eq!(services.encryption.decrypt(&ciphertext, &ctx).await.unwrap().as_slice(), &plaintext[..]);
}

/// Tests empty plaintext makes zero chunks and zero KMS calls.
#[tokio::test]
async fn test_empty_plaintext() {
    let kms = TestKms::new(&[WEST]);
    let services = services(&kms, &single_region_config());
    let ctx = pii_context("u-1");

    let ciphertext = services.encryption.encrypt(b"", &ctx).await.unwrap();
    assert_eq!(ciphertext, b"KMSc[]");
    assert!(services.encryption.decrypt(&ciphertext, &ctx).await.unwrap().is_empty());
    assert_eq!(kms.region(WEST).encrypt_count(), 0);
}
