//! History reconstruction for legacy snippets
//!
//! This crate provides:
//! - Change deltas decoded from the legacy revision format
//! - Exact-match patch application
//! - Replay of revisions into a linear commit chain
//! - Package reference and readme extraction from reconstructed trees

pub mod delta;
pub mod error;
pub mod packages;
pub mod patch;
pub mod replay;
pub mod snapshot;

// Re-exports
pub use delta::{replay_order, ChangeDelta, RawChange, Revision};
pub use error::HistoryError;
pub use packages::{find_readme, pad_version, scan, PackageRef};
pub use patch::PatchError;
pub use replay::{Reconstruction, Reconstructor, RecordInput, INITIAL_MESSAGE};
pub use snapshot::{FileEntry, Snapshot};

/// Result type for history operations
pub type Result<T> = anyhow::Result<T>;
