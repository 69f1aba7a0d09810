//! Shared storage integration tests.
//!
//! Tests the Store interface against all implementations.
//! Each implementation module imports these test functions and runs them.

pub mod store_tests;
