//! AES-256-GCM envelope keyed by a locally derived key.

use crate::{CryptoError, CryptoResult, SecureBytes};
use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Additional authenticated data bound into every local envelope.
pub const LOCAL_AAD: &[u8] = b"PII";

const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

/// Serialized form of a local envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalEnvelope {
    /// Nonce/IV.
    #[serde(with = "base64_serde")]
    pub iv: Vec<u8>,
    /// Ciphertext without the tag.
    #[serde(with = "base64_serde")]
    pub ciphertext: Vec<u8>,
    /// GCM authentication tag.
    #[serde(with = "base64_serde")]
    pub tag: Vec<u8>,
}

/// AES-256-GCM cipher producing JSON `{"iv", "ciphertext", "tag"}` envelopes.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalEnvelopeCipher;

impl LocalEnvelopeCipher {
    /// Creates a new cipher.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Encrypts with a fresh random IV and returns the JSON envelope.
    pub fn encrypt(&self, plaintext: &[u8], key: &SecureBytes) -> CryptoResult<Vec<u8>> {
        let cipher = Self::cipher(key)?;

        let mut iv = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut iv);

        let mut sealed = cipher
            .encrypt(
                Nonce::from_slice(&iv),
                Payload {
                    msg: plaintext,
                    aad: LOCAL_AAD,
                },
            )
            .map_err(|_| CryptoError::encryption("AEAD encryption failed"))?;
        let tag = sealed.split_off(sealed.len() - TAG_SIZE);

        let envelope = LocalEnvelope {
            iv: iv.to_vec(),
            ciphertext: sealed,
            tag,
        };
        serde_json::to_vec(&envelope)
            .map_err(|e| CryptoError::encryption(format!("envelope serialization failed: {e}")))
    }

    /// Decrypts a JSON envelope. Every failure is an [`CryptoError::Encryption`].
    pub fn decrypt(&self, envelope: &[u8], key: &SecureBytes) -> CryptoResult<SecureBytes> {
        let envelope: LocalEnvelope = serde_json::from_slice(envelope)
            .map_err(|e| CryptoError::encryption(format!("unable to parse local envelope: {e}")))?;

        if envelope.iv.len() != NONCE_SIZE || envelope.tag.len() != TAG_SIZE {
            return Err(CryptoError::encryption("local envelope has malformed iv or tag"));
        }

        let cipher = Self::cipher(key)?;
        let mut sealed = envelope.ciphertext;
        sealed.extend_from_slice(&envelope.tag);

        let plaintext = cipher.decrypt(
            Nonce::from_slice(&envelope.iv),
            Payload {
                msg: &sealed,
                aad: LOCAL_AAD,
            },
        )?;
        Ok(SecureBytes::new(plaintext))
    }

    fn cipher(key: &SecureBytes) -> CryptoResult<Aes256Gcm> {
        if key.len() != KEY_SIZE {
            return Err(CryptoError::Argument(format!(
                "expected {KEY_SIZE} byte key, got {}",
                key.len()
            )));
        }
        Aes256Gcm::new_from_slice(key.as_slice())
            .map_err(|e| CryptoError::Argument(format!("invalid key: {e}")))
    }
}

/// Base64 serialization helpers.
pub(crate) mod base64_serde {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}
