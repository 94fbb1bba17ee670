//! Scrypt cost strings (`"N$r$p$"`, hex fields) and password hashing.

use crate::{hash, CryptoError, CryptoResult, SecureBytes};
use std::fmt;
use std::str::FromStr;

/// Length of every scrypt digest produced here.
pub const DIGEST_LEN: usize = 32;

/// Parsed scrypt parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScryptCost {
    log_n: u8,
    r: u32,
    p: u32,
}

impl ScryptCost {
    /// Creates a cost with `N = 2^log_n`.
    pub fn new(log_n: u8, r: u32, p: u32) -> CryptoResult<Self> {
        scrypt::Params::new(log_n, r, p, DIGEST_LEN)
            .map_err(|e| CryptoError::Config(format!("invalid scrypt cost: {e}")))?;
        Ok(Self { log_n, r, p })
    }

    /// The CPU/memory cost `N`.
    #[must_use]
    pub fn n(&self) -> u64 {
        1u64 << self.log_n
    }

    /// Hashes `password` with the scrypt salt derived from `salt`.
    ///
    /// The KDF salt is `SHA256(salt)`; the cost travels separately.
    pub fn digest(&self, password: &[u8], salt: &str) -> CryptoResult<SecureBytes> {
        let params = scrypt::Params::new(self.log_n, self.r, self.p, DIGEST_LEN)
            .map_err(|e| CryptoError::Config(format!("invalid scrypt cost: {e}")))?;
        let scrypt_salt = hash::sha256(salt.as_bytes());

        let mut output = vec![0u8; DIGEST_LEN];
        scrypt::scrypt(password, &scrypt_salt, &params, &mut output)
            .map_err(|e| CryptoError::Argument(format!("scrypt output: {e}")))?;
        Ok(SecureBytes::new(output))
    }

    /// Runs [`Self::digest`] on the blocking thread pool.
    pub async fn digest_blocking(&self, password: SecureBytes, salt: String) -> CryptoResult<SecureBytes> {
        let cost = *self;
        tokio::task::spawn_blocking(move || cost.digest(password.as_slice(), &salt))
            .await
            .map_err(|e| CryptoError::encryption(format!("scrypt worker failed: {e}")))?
    }
}

impl FromStr for ScryptCost {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CryptoError::Config(format!("invalid scrypt cost string: {s:?}"));

        let fields: Vec<&str> = s.strip_suffix('$').ok_or_else(invalid)?.split('$').collect();
        let [n, r, p] = fields.as_slice() else {
            return Err(invalid());
        };

        let n = u64::from_str_radix(n, 16).map_err(|_| invalid())?;
        let r = u32::from_str_radix(r, 16).map_err(|_| invalid())?;
        let p = u32::from_str_radix(p, 16).map_err(|_| invalid())?;
        if n < 2 || !n.is_power_of_two() {
            return Err(invalid());
        }

        Self::new(n.trailing_zeros() as u8, r, p)
    }
}

impl fmt::Display for ScryptCost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}${:x}${:x}$", self.n(), self.r, self.p)
    }
}
