//! Cryptographic error types.

use thiserror::Error;

/// Cryptographic errors.
///
/// Decrypt paths collapse every parse, decode and authentication failure
/// into [`CryptoError::Encryption`] so callers never see lower-level errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Malformed or corrupt ciphertext, tag mismatch, unsupported region.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Internal precondition violation.
    #[error("invalid argument: {0}")]
    Argument(String),

    /// KMS unreachable, timed out or failed server-side.
    #[error("external service error: {0}")]
    ExternalService(String),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl CryptoError {
    /// Builds an [`CryptoError::Encryption`] from anything printable.
    pub fn encryption(msg: impl Into<String>) -> Self {
        Self::Encryption(msg.into())
    }

    /// Returns true for errors caused by the external KMS being unavailable.
    #[must_use]
    pub fn is_external(&self) -> bool {
        matches!(self, Self::ExternalService(_))
    }
}

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

impl From<aes_gcm::Error> for CryptoError {
    fn from(_: aes_gcm::Error) -> Self {
        Self::Encryption("authentication failed".to_string())
    }
}

impl From<config::ConfigError> for CryptoError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
