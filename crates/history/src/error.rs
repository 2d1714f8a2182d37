//! Errors surfaced by history reconstruction

use crate::patch::PatchError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    /// A patch did not apply exactly; the record cannot be reconstructed
    #[error("record {record_id}: revision {revision}: cannot patch {path}: {source}")]
    Patch {
        record_id: String,
        /// Index of the revision in stored (newest-first) order
        revision: usize,
        path: String,
        #[source]
        source: PatchError,
    },

    #[error("record {record_id}: object store failure")]
    Store {
        record_id: String,
        #[source]
        source: anyhow::Error,
    },
}

impl HistoryError {
    pub fn record_id(&self) -> &str {
        match self {
            Self::Patch { record_id, .. } | Self::Store { record_id, .. } => record_id,
        }
    }
}
