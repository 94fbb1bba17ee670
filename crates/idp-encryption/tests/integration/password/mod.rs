//! Password digest integration tests.
