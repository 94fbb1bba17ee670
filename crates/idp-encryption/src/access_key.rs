//! Masked-key credential scheme.
//!
//! A password hash `Z1 || Z2` masks a KMS-encrypted random secret `R`. The
//! content encryption key `SHA256(Z2 || R)` can only be recovered by someone
//! who knows the password *and* can reach KMS, so a leaked digest alone is
//! not enough for an offline guess to be confirmed.
//!
//! New credentials use [`crate::PasswordVerifier`]; this scheme is kept so
//! existing digests carrying `encryption_key` keep verifying.

use crate::{
    hash, ContextlessKmsClient, CryptoError, CryptoResult, PasswordDigest, ScryptCost,
    SecureBytes,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use tracing::debug;

const HALF: usize = 16;
const RANDOM_LEN: usize = 32;
const NORMALIZED_SALT_LEN: usize = 64;

/// Password-derived halves of one access key attempt.
pub struct UserAccessKey {
    cost: ScryptCost,
    salt: String,
    z1: SecureBytes,
    z2: SecureBytes,
}

impl UserAccessKey {
    /// Hashes `password` and splits the digest into the mask and key halves.
    ///
    /// Salts that are not 64 hex characters are normalized to
    /// `hex(SHA256(salt))` first.
    pub async fn derive(password: &[u8], salt: &str, cost: ScryptCost) -> CryptoResult<Self> {
        let salt = normalize_salt(salt);
        let digest = cost
            .digest_blocking(SecureBytes::from_slice(password), salt.clone())
            .await?;

        let (z1, z2) = digest.as_slice().split_at(HALF);
        Ok(Self {
            cost,
            salt,
            z1: SecureBytes::from_slice(z1),
            z2: SecureBytes::from_slice(z2),
        })
    }

    /// Generates a fresh secret, seals it through KMS and returns the
    /// persistable digest along with the content encryption key.
    pub async fn build(
        &self,
        kms: &ContextlessKmsClient,
    ) -> CryptoResult<(PasswordDigest, SecureBytes)> {
        let random_r = SecureBytes::new(hash::random_bytes(RANDOM_LEN));
        let cipher_r = kms.encrypt(random_r.as_slice()).await?;

        let masked = xor_padded(&cipher_r, self.z1.as_slice());
        let cek = self.content_key(&random_r);

        let digest = PasswordDigest {
            encrypted_password: hash::sha256_hex(cek.as_slice()),
            password_salt: self.salt.clone(),
            password_cost: self.cost.to_string(),
            encryption_key: Some(STANDARD.encode(masked)),
        };
        Ok((digest, cek))
    }

    /// Unmasks the stored `encryption_key` and recovers the content
    /// encryption key through KMS.
    ///
    /// A wrong password usually makes KMS reject the unmasked blob; when it
    /// does not, the recovered key simply will not match.
    pub async fn unlock(
        &self,
        kms: &ContextlessKmsClient,
        encryption_key: &str,
    ) -> CryptoResult<SecureBytes> {
        let masked = STANDARD
            .decode(encryption_key)
            .map_err(|e| CryptoError::encryption(format!("encryption_key is not base64: {e}")))?;

        let cipher_r = xor_padded(&masked, self.z1.as_slice());
        let random_r = kms.decrypt(&cipher_r).await?;
        Ok(self.content_key(&random_r))
    }

    /// Checks `password` against a masked-key digest. Never fails.
    pub async fn verify(password: &[u8], digest: &PasswordDigest, kms: &ContextlessKmsClient) -> bool {
        match Self::try_verify(password, digest, kms).await {
            Ok(matched) => matched,
            Err(e) => {
                debug!(error = %e, "access key verification failed");
                false
            }
        }
    }

    async fn try_verify(
        password: &[u8],
        digest: &PasswordDigest,
        kms: &ContextlessKmsClient,
    ) -> CryptoResult<bool> {
        let encryption_key = digest
            .encryption_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| CryptoError::encryption("digest has no encryption_key"))?;
        let cost: ScryptCost = digest.password_cost.parse()?;

        let key = Self::derive(password, &digest.password_salt, cost).await?;
        let cek = key.unlock(kms, encryption_key).await?;

        Ok(hash::constant_time_eq(
            hash::sha256_hex(cek.as_slice()).as_bytes(),
            digest.encrypted_password.as_bytes(),
        ))
    }

    fn content_key(&self, random_r: &SecureBytes) -> SecureBytes {
        let mut input = self.z2.clone();
        input.extend_from_slice(random_r.as_slice());
        SecureBytes::new(hash::sha256(input.as_slice()))
    }
}

impl std::fmt::Debug for UserAccessKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserAccessKey")
            .field("cost", &self.cost)
            .field("salt", &self.salt)
            .finish_non_exhaustive()
    }
}

fn normalize_salt(salt: &str) -> String {
    if salt.len() == NORMALIZED_SALT_LEN {
        salt.to_string()
    } else {
        hash::sha256_hex(salt.as_bytes())
    }
}

/// XORs `data` with `mask` zero-padded (or truncated) to `data.len()`.
fn xor_padded(data: &[u8], mask: &[u8]) -> Vec<u8> {
    data.iter()
        .enumerate()
        .map(|(i, b)| b ^ mask.get(i).copied().unwrap_or(0))
        .collect()
}
