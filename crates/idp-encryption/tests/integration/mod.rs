//! Integration tests for IDP Encryption.
//!
//! This module contains integration tests covering:
//! - Ciphertext formats and chunking
//! - Multi-region KMS encryption and fallback
//! - Password digests and the masked-key scheme

pub mod common;
pub mod kms;
pub mod password;
