//! # IDP Encryption
//!
//! Envelope encryption for personal data and password credentials:
//! - KMS encryption with an encryption context, chunked under the 4096-byte
//!   per-call ceiling
//! - Multi-region KMS ciphertexts with default-region-first decryption
//! - Local AES-256-GCM fallback keyed from a server pepper
//! - Every historical ciphertext format, recognized by its leading tag
//! - Scrypt password digests sealed by KMS, plus the masked-key scheme
//!
//! ```no_run
//! use idp_encryption::{EncryptionConfig, EncryptionContext, EncryptionServices};
//! # use idp_encryption::{LocalKmsProvider, StaticKmsConnector};
//! # use std::sync::Arc;
//! # async fn example() -> idp_encryption::CryptoResult<()> {
//! let config = EncryptionConfig::load()?;
//! # let connector = Arc::new(StaticKmsConnector::new()
//! #     .with_region("us-west-2", Arc::new(LocalKmsProvider::new().with_random_key("alias/idp-pii"))));
//! let services = EncryptionServices::new(&config, connector)?;
//!
//! let ctx = EncryptionContext::new()
//!     .with("context", "pii-encryption")
//!     .with("user_uuid", "u-1");
//! let ciphertext = services.encryption.encrypt(b"123-45-6789", &ctx).await?;
//! let plaintext = services.encryption.decrypt(&ciphertext, &ctx).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod access_key;
pub mod chunk;
pub mod config;
pub mod context;
pub mod contextless;
pub mod error;
pub mod facade;
pub mod format;
pub mod hash;
pub mod key;
pub mod kms;
pub mod local;
pub mod multi_region;
pub mod password;
pub mod region;
pub mod scrypt_cost;
pub mod service;

pub use access_key::UserAccessKey;
pub use chunk::MAX_KMS_PLAINTEXT;
pub use config::EncryptionConfig;
pub use context::EncryptionContext;
pub use contextless::ContextlessKmsClient;
pub use error::{CryptoError, CryptoResult};
pub use facade::EncryptionService;
pub use format::CiphertextFormat;
pub use key::SecureBytes;
pub use kms::{KmsError, KmsProvider, LocalKmsProvider};
pub use local::{LocalEnvelope, LocalEnvelopeCipher};
pub use multi_region::{KmsCiphertext, MultiRegionKmsClient, RegionalCiphertext};
pub use password::{is_stale_digest, DigestPair, PasswordDigest, PasswordVerifier};
pub use region::{KmsClientPool, KmsConnector, RegionalKmsClient, StaticKmsConnector};
pub use scrypt_cost::ScryptCost;
pub use service::EncryptionServices;
