//! Plunk Core - content-addressed objects for reconstructed history
//!
//! This crate provides the foundational storage layer:
//! - SHA-1 hashing (git loose-object compatible)
//! - Blob, tree and commit objects with deterministic identities
//! - Bloom filter for write deduplication
//! - Durable object store (sled embedded DB)

pub mod hash;
pub mod blob;
pub mod tree;
pub mod commit;
pub mod bloom;
pub mod store;

// Re-export main types for convenience
pub use hash::Sha1Hash;
pub use blob::Blob;
pub use tree::{Tree, Entry};
pub use commit::{Commit, CommitHeader};
pub use bloom::BloomFilter;
pub use store::{ObjectStore, RawObject, StagedObjects, StoreStats};

/// Common result type used throughout plunk-core
pub type Result<T> = anyhow::Result<T>;
