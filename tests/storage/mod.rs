//! Shared storage integration tests.
//!
//! Tests the ItemStore contract and the ProfileStore built on top of it
//! against every backend. Each backend module imports these test functions
//! and runs them.

pub mod item_store_tests;
pub mod profile_store_tests;
