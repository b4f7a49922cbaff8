//! Persistent stores — sled-backed registry and append-only result tables.
//!
//! Values are JSON-serialized; keys are chosen per tree (big-endian ids for
//! targets, usernames for vault entries, content hashes for classified rows)
//! so that lookups and dedup checks are single reads.

pub mod registry;
pub mod results;

pub use registry::{Registry, TargetRepository, VaultRepository};
pub use results::ResultStore;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
