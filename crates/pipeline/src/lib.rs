//! Streaming migration of legacy records into a search index
//!
//! This crate provides:
//! - Legacy record and output document types
//! - The per-record transform (history reconstruction plus metadata)
//! - Source and sink seams with in-memory implementations
//! - Batching, checkpointing and progress reporting

pub mod checkpoint;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod record;
pub mod sink;
pub mod source;
pub mod transform;

// Re-exports
pub use checkpoint::CheckpointFile;
pub use error::PipelineError;
pub use pipeline::{Pipeline, PipelineConfig, RunSummary};
pub use progress::{Progress, ProgressUpdate};
pub use record::{LegacyFile, LegacyRecord, LegacyRevision, MigratedRecord, PUBLIC_COLLECTION};
pub use sink::{IndexSink, MemorySink};
pub use source::{MemorySource, RecordSource};
pub use transform::transform;

/// Result type for pipeline plumbing
pub type Result<T> = anyhow::Result<T>;
