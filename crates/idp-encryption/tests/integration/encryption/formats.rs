//! Ciphertext format integration tests.

use crate::common::*;
use idp_encryption::{
    chunk, CiphertextFormat, ContextlessKmsClient, CryptoError, LocalEnvelopeCipher,
};

/// Tests KMS-mode round trip and its tag.
#[tokio::test]
async fn test_kms_round_trip() {
    let kms = TestKms::new(&[WEST, EAST]);
    let services = services(&kms, &test_config(true, true));
    let ctx = pii_context(&test_user_uuid());

    let ciphertext = services.encryption.encrypt(b"123-45-6789", &ctx).await.unwrap();
    assert_eq!(CiphertextFormat::sniff(&ciphertext).0, CiphertextFormat::Kms);

    let plaintext = services.encryption.decrypt(&ciphertext, &ctx).await.unwrap();
    assert_eq!(plaintext.as_slice(), b"123-45-6789");
}

/// Tests local-mode round trip never touches KMS.
#[tokio::test]
async fn test_local_round_trip() {
    let kms = TestKms::new(&[WEST, EAST]);
    let services = services(&kms, &test_config(false, false));
    let ctx = pii_context(&test_user_uuid());

    let ciphertext = services.encryption.encrypt(b"123-45-6789", &ctx).await.unwrap();
    assert_eq!(CiphertextFormat::sniff(&ciphertext).0, CiphertextFormat::LocalV2);

    let plaintext = services.encryption.decrypt(&ciphertext, &ctx).await.unwrap();
    assert_eq!(plaintext.as_slice(), b"123-45-6789");
    assert!(kms.region(WEST).calls().is_empty());
}

/// Tests that data written under one flag setting reads under the other.
#[tokio::test]
async fn test_tag_stability_across_flag_change() {
    let kms = TestKms::new(&[WEST, EAST]);
    let before = services(&kms, &test_config(false, false));
    let after = services(&kms, &test_config(true, true));
    let ctx = pii_context(&test_user_uuid());

    let local = before.encryption.encrypt(b"written locally", &ctx).await.unwrap();
    let remote = after.encryption.encrypt(b"written via kms", &ctx).await.unwrap();

    assert_eq!(after.encryption.decrypt(&local, &ctx).await.unwrap().as_slice(), b"written locally");
    assert_eq!(before.encryption.decrypt(&remote, &ctx).await.unwrap().as_slice(), b"written via kms");
}

/// Tests legacy untagged and `KMSx` input go through the contextless path.
#[tokio::test]
async fn test_contextless_formats_decrypt() {
    let kms = TestKms::new(&[WEST, EAST]);
    let services = services(&kms, &test_config(true, true));
    let ctx = pii_context(&test_user_uuid());

    let kmsx = services.contextless.encrypt(b"contextless").await.unwrap();
    assert!(ContextlessKmsClient::looks_like_kms(&kmsx));
    assert_eq!(services.encryption.decrypt(&kmsx, &ctx).await.unwrap().as_slice(), b"contextless");

    let pepper = idp_encryption::SecureBytes::from_slice(PEPPER.as_bytes());
    let legacy = LocalEnvelopeCipher::new().encrypt(b"pre-tagging", &pepper).unwrap();
    assert_eq!(CiphertextFormat::sniff(&legacy).0, CiphertextFormat::Legacy);
    assert_eq!(services.encryption.decrypt(&legacy, &ctx).await.unwrap().as_slice(), b"pre-tagging");
}

/// Tests the JSON-bodied local format is still readable.
#[tokio::test]
async fn test_json_local_format_decrypts() {
    let kms = TestKms::new(&[WEST]);
    let services = services(&kms, &test_config(false, false));
    let ctx = pii_context("u-1");

    let key = idp_encryption::hash::hmac_sha256(PEPPER.as_bytes(), ctx.sorted_concat().as_bytes()).unwrap();
    let cipher = LocalEnvelopeCipher::new();
    let chunks = vec![
        cipher.encrypt(b"first ", &key).unwrap(),
        cipher.encrypt(b"second", &key).unwrap(),
    ];
    let ciphertext = CiphertextFormat::Local.wrap(&chunk::encode_json(&chunks).unwrap());

    assert_eq!(services.encryption.decrypt(&ciphertext, &ctx).await.unwrap().as_slice(), b"first second");
}

/// Tests `LOCcv2` bodies packed as MessagePack `str` chunks decrypt.
#[tokio::test]
async fn test_msgpack_str_local_format_decrypts() {
    let kms = TestKms::new(&[WEST]);
    let services = services(&kms, &test_config(false, false));
    let ctx = pii_context("u-1");

    let key = idp_encryption::hash::hmac_sha256(PEPPER.as_bytes(), ctx.sorted_concat().as_bytes()).unwrap();
    let envelope = LocalEnvelopeCipher::new().encrypt(b"packed by ruby", &key).unwrap();
    assert!(envelope.len() < 256);

    let mut ciphertext = b"LOCcv2".to_vec();
    ciphertext.extend_from_slice(&[0x91, 0xd9, envelope.len() as u8]);
    ciphertext.extend_from_slice(&envelope);

    assert_eq!(services.encryption.decrypt(&ciphertext, &ctx).await.unwrap().as_slice(), b"packed by ruby");
}

/// Tests new `LOCcv2` bodies are MessagePack arrays of `bin` chunks.
#[tokio::test]
async fn test_local_format_writes_msgpack_bin() {
    let kms = TestKms::new(&[WEST]);
    let services = services(&kms, &test_config(false, false));

    let ciphertext = services.encryption.encrypt(b"abc", &pii_context("u-1")).await.unwrap();
    let (_, body) = CiphertextFormat::sniff(&ciphertext);

    assert_eq!(body[0], 0x91);
    assert_eq!(body[1], 0xc4);
    assert_eq!(body[2] as usize, body.len() - 3);
}

/// Tests a different context cannot decrypt.
#[tokio::test]
async fn test_wrong_context_fails() {
    let kms = TestKms::new(&[WEST, EAST]);

    for use_kms in [true, false] {
        let services = services(&kms, &test_config(use_kms, use_kms));
        let ciphertext = services.encryption.encrypt(b"secret", &pii_context("u-1")).await.unwrap();

        let result = services.encryption.decrypt(&ciphertext, &pii_context("u-2")).await;
        assert!(matches!(result, Err(CryptoError::Encryption(_))), "use_kms={use_kms}");
    }
}

/// Tests that a flipped byte anywhere in a local chunk is rejected.
#[tokio::test]
async fn test_tamper_detection() {
    let kms = TestKms::new(&[WEST]);
    let services = services(&kms, &test_config(false, false));
    let ctx = pii_context("u-1");

    let ciphertext = services.encryption.encrypt(b"tamper me", &ctx).await.unwrap();
    let (_, body) = CiphertextFormat::sniff(&ciphertext);
    let chunks = chunk::decode_packed(body).unwrap();
    let mut envelope: idp_encryption::LocalEnvelope = serde_json::from_slice(&chunks[0]).unwrap();

    envelope.ciphertext[0] ^= 0x80;
    let tampered_chunk = serde_json::to_vec(&envelope).unwrap();
    let tampered = CiphertextFormat::LocalV2.wrap(&chunk::encode_packed(&[tampered_chunk]).unwrap());

    let result = services.encryption.decrypt(&tampered, &ctx).await;
    assert!(matches!(result, Err(CryptoError::Encryption(_))));
}

/// Tests malformed bodies surface as encryption errors.
#[tokio::test]
async fn test_malformed_ciphertexts() {
    let kms = TestKms::new(&[WEST]);
    let services = services(&kms, &test_config(true, false));
    let ctx = pii_context("u-1");

    for bad in [
        &b"KMSc not json"[..],
        &b"KMSc[\"!!\"]"[..],
        &b"KMSx[\"AAAA\"]"[..],
        &b"LOCc[\"AAAA\"]"[..],
        &b"LOCcv2"[..],
        &b"random bytes"[..],
    ] {
        let result = services.encryption.decrypt(bad, &ctx).await;
        assert!(matches!(result, Err(CryptoError::Encryption(_))), "{bad:?}");
    }
}

/// Tests KMS outages propagate from encrypt instead of falling back.
#[tokio::test]
async fn test_encrypt_propagates_kms_outage() {
    let kms = TestKms::new(&[WEST, EAST]);
    let services = services(&kms, &test_config(true, true));
    kms.region(EAST).set_failure(Some(MockFailure::Unavailable));

    let result = services.encryption.encrypt(b"data", &pii_context("u-1")).await;
    assert!(matches!(result, Err(CryptoError::ExternalService(_))));
}

/// Tests context field names reach KMS intact.
#[tokio::test]
async fn test_context_reaches_kms() {
    let kms = TestKms::new(&[WEST]);
    let mut config = test_config(true, false);
    config.aws_kms_regions.clear();
    let services = services(&kms, &config);
    let ctx = pii_context("u-9");

    services.encryption.encrypt(b"data", &ctx).await.unwrap();

    let calls = kms.region(WEST).calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].key_id.as_deref(), Some(PII_KEY));
    assert_eq!(calls[0].context, ctx);
}
