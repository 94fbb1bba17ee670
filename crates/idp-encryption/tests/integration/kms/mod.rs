//! KMS client integration tests.

pub mod pool;
