//! Encryption context bound into every KMS call and local key derivation.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Ordered key/value metadata bound into encryption.
///
/// Decryption must be given a byte-identical context or it fails.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionContext {
    /// Context fields.
    pub fields: BTreeMap<String, String>,
}

impl EncryptionContext {
    /// Creates a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field to the context.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Context used for password digests.
    #[must_use]
    pub fn password_digest(user_uuid: &str) -> Self {
        Self::new()
            .with("context", "password-digest")
            .with("user_uuid", user_uuid)
    }

    /// Returns true when no fields are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field names, for logging. Values are never logged.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Converts the context to bytes for AAD.
    #[must_use]
    pub fn to_aad(&self) -> Vec<u8> {
        let mut aad = Vec::new();
        for (key, value) in &self.fields {
            aad.extend_from_slice(key.as_bytes());
            aad.push(0);
            aad.extend_from_slice(value.as_bytes());
            aad.push(0);
        }
        aad
    }

    /// Keys and values pooled together, sorted, and concatenated.
    ///
    /// This is the HMAC message for the local fallback key.
    #[must_use]
    pub fn sorted_concat(&self) -> String {
        let mut parts: Vec<&str> = self
            .fields
            .keys()
            .chain(self.fields.values())
            .map(String::as_str)
            .collect();
        parts.sort_unstable();
        parts.concat()
    }

    /// The context as the map shape KMS APIs take.
    #[must_use]
    pub fn to_map(&self) -> HashMap<String, String> {
        self.fields.clone().into_iter().collect()
    }
}
