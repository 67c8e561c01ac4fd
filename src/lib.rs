//! Personalization profile store.
//!
//! Profiles, their scored category segments and raw JSON blobs live in a
//! single DynamoDB table, one partition per profile. This crate provides the
//! canonical model, the single-table access layer and the REST API in front
//! of it.

pub mod config;
pub mod handlers;
pub mod model;
pub mod storage;
pub mod utils;
pub mod validation;

pub use model::{Category, Profile, Segment};
pub use storage::{ItemStore, ProfileStore, StorageError};
