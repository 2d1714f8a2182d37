//! Run-aborting failures

use plunk_history::HistoryError;
use thiserror::Error;

/// Why a run stopped early
///
/// Every variant carries the id of the last record pulled from the source,
/// which is what an operator needs to find the offending input.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to read from source (last record: {})", display_id(.last_record))]
    Source {
        last_record: Option<String>,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to transform record {record_id}")]
    Transform {
        record_id: String,
        #[source]
        source: HistoryError,
    },

    #[error("failed to write batch to index (last record: {})", display_id(.last_record))]
    Sink {
        last_record: Option<String>,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to write checkpoint (last record: {})", display_id(.last_record))]
    Checkpoint {
        last_record: Option<String>,
        #[source]
        source: anyhow::Error,
    },
}

impl PipelineError {
    /// Id of the last record pulled before the failure
    pub fn last_record(&self) -> Option<&str> {
        match self {
            Self::Transform { record_id, .. } => Some(record_id),
            Self::Source { last_record, .. }
            | Self::Sink { last_record, .. }
            | Self::Checkpoint { last_record, .. } => last_record.as_deref(),
        }
    }
}

fn display_id(id: &Option<String>) -> &str {
    id.as_deref().unwrap_or("none")
}
