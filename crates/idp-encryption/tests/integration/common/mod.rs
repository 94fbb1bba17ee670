//! Common test utilities and fixtures.

pub mod fixtures;

pub use fixtures::*;
pub use mocks::*;
