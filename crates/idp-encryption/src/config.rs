//! Encryption configuration.

use crate::{CryptoError, CryptoResult, ScryptCost};
use config::{Config, Environment, File};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

/// Length the pepper must have; it doubles as an AES-256 key.
pub const PEPPER_LEN: usize = 32;

/// Encryption configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EncryptionConfig {
    /// Encrypt new data through KMS instead of the local pepper-derived keys.
    #[serde(default)]
    pub use_kms: bool,

    /// Seal KMS ciphertexts under every configured region.
    #[serde(default)]
    pub kms_multi_region_enabled: bool,

    /// Server-side secret keying the local fallback path.
    pub password_pepper: SecretString,

    /// Scrypt cost for new password digests.
    #[serde(default = "default_scrypt_cost")]
    pub scrypt_cost: String,

    /// Default KMS region.
    #[serde(default = "default_aws_region")]
    pub aws_region: String,

    /// Additional KMS regions.
    #[serde(default)]
    pub aws_kms_regions: Vec<String>,

    /// KMS key for personal data.
    #[serde(default = "default_kms_key_id")]
    pub aws_kms_key_id: String,

    /// KMS key for single-region password digests.
    #[serde(default = "default_single_region_key_id")]
    pub aws_kms_single_region_key_id: String,

    /// KMS key for multi-region password digests.
    #[serde(default = "default_multi_region_key_id")]
    pub aws_kms_multi_region_key_id: String,

    /// Per-call KMS timeout in seconds.
    #[serde(default = "default_http_timeout")]
    pub aws_http_timeout_seconds: u64,
}

fn default_scrypt_cost() -> String {
    "4000$8$4$".to_string()
}

fn default_aws_region() -> String {
    "us-west-2".to_string()
}

fn default_kms_key_id() -> String {
    "alias/idp-pii".to_string()
}

fn default_single_region_key_id() -> String {
    "alias/idp-password-digest".to_string()
}

fn default_multi_region_key_id() -> String {
    "alias/idp-password-digest-multi-region".to_string()
}

fn default_http_timeout() -> u64 {
    5
}

impl EncryptionConfig {
    /// Creates a configuration with defaults and the given pepper.
    #[must_use]
    pub fn new(password_pepper: impl Into<String>) -> Self {
        Self {
            use_kms: false,
            kms_multi_region_enabled: false,
            password_pepper: SecretString::new(password_pepper.into()),
            scrypt_cost: default_scrypt_cost(),
            aws_region: default_aws_region(),
            aws_kms_regions: Vec::new(),
            aws_kms_key_id: default_kms_key_id(),
            aws_kms_single_region_key_id: default_single_region_key_id(),
            aws_kms_multi_region_key_id: default_multi_region_key_id(),
            aws_http_timeout_seconds: default_http_timeout(),
        }
    }

    /// Loads configuration from files and `IDP__`-prefixed environment
    /// variables, e.g. `IDP__AWS_KMS_REGIONS=us-west-2,us-east-1`.
    pub fn load() -> CryptoResult<Self> {
        let config = Config::builder()
            .add_source(File::with_name("config/encryption").required(false))
            .add_source(File::with_name("config/encryption.local").required(false))
            .add_source(
                Environment::with_prefix("IDP")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("aws_kms_regions"),
            )
            .build()?;

        let encryption_config: EncryptionConfig = config.try_deserialize()?;
        encryption_config.validate()?;

        Ok(encryption_config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> CryptoResult<()> {
        let pepper_len = self.password_pepper.expose_secret().len();
        if pepper_len != PEPPER_LEN {
            return Err(CryptoError::Config(format!(
                "password_pepper must be {PEPPER_LEN} bytes, got {pepper_len}"
            )));
        }

        self.scrypt_cost()?;

        if self.aws_region.is_empty() {
            return Err(CryptoError::Config("aws_region is empty".to_string()));
        }

        if self.kms_multi_region_enabled && self.aws_kms_regions.is_empty() {
            return Err(CryptoError::Config(
                "kms_multi_region_enabled requires aws_kms_regions".to_string(),
            ));
        }

        if self.aws_http_timeout_seconds == 0 {
            return Err(CryptoError::Config("aws_http_timeout_seconds must be positive".to_string()));
        }

        if !self.use_kms {
            tracing::warn!("KMS disabled; new data is encrypted with pepper-derived local keys");
        }

        Ok(())
    }

    /// Parsed scrypt cost.
    pub fn scrypt_cost(&self) -> CryptoResult<ScryptCost> {
        self.scrypt_cost.parse()
    }

    /// Per-call KMS timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.aws_http_timeout_seconds)
    }

    /// Default region first, then the extra regions, without duplicates.
    #[must_use]
    pub fn regions(&self) -> Vec<String> {
        let mut regions = vec![self.aws_region.clone()];
        for region in &self.aws_kms_regions {
            if !regions.contains(region) {
                regions.push(region.clone());
            }
        }
        regions
    }
}
