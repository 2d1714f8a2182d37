//! Where legacy records come from

use crate::record::LegacyRecord;
use anyhow::Result;
use std::collections::VecDeque;

/// A lazy, pull-based cursor over legacy records
///
/// Implementations yield records already filtered by the resume watermark
/// and sorted by `updated_at` ascending. Nothing is read ahead of a pull
/// beyond what the implementation pages in from its backend.
pub trait RecordSource: Send {
    /// Number of records the cursor will yield
    fn count(&mut self) -> Result<u64>;

    /// Next record, or `None` once exhausted
    fn next_record(&mut self) -> Result<Option<LegacyRecord>>;
}

/// Source backed by an in-memory list
#[derive(Debug, Default)]
pub struct MemorySource {
    records: VecDeque<LegacyRecord>,
}

impl MemorySource {
    /// Records at or after `since`, in `updated_at` order
    pub fn new(mut records: Vec<LegacyRecord>, since: Option<chrono::DateTime<chrono::Utc>>) -> Self {
        if let Some(since) = since {
            records.retain(|r| r.updated_at >= since);
        }
        records.sort_by_key(|r| r.updated_at);
        Self {
            records: records.into(),
        }
    }
}

impl RecordSource for MemorySource {
    fn count(&mut self) -> Result<u64> {
        Ok(self.records.len() as u64)
    }

    fn next_record(&mut self) -> Result<Option<LegacyRecord>> {
        Ok(self.records.pop_front())
    }
}
