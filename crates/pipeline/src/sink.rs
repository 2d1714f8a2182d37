//! Where migrated documents go

use crate::record::MigratedRecord;
use anyhow::Result;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Destination index; writes are idempotent upserts keyed by record id
pub trait IndexSink {
    /// Write a batch in one request
    fn bulk_index(&mut self, records: &[MigratedRecord]) -> Result<()>;

    /// Write a single record
    fn index(&mut self, record: &MigratedRecord) -> Result<()> {
        self.bulk_index(std::slice::from_ref(record))
    }
}

/// In-memory index, cloneable so a caller can inspect what a run wrote
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    documents: Arc<Mutex<BTreeMap<String, MigratedRecord>>>,
    requests: Arc<Mutex<Vec<usize>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored document by id
    pub fn get(&self, id: &str) -> Option<MigratedRecord> {
        self.documents.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.documents.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.lock().is_empty()
    }

    /// Size of every bulk request received, in order
    pub fn request_sizes(&self) -> Vec<usize> {
        self.requests.lock().clone()
    }
}

impl IndexSink for MemorySink {
    fn bulk_index(&mut self, records: &[MigratedRecord]) -> Result<()> {
        let mut documents = self.documents.lock();
        for record in records {
            documents.insert(record.id.clone(), record.clone());
        }
        self.requests.lock().push(records.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn document(id: &str, title: &str) -> MigratedRecord {
        let now = Utc::now();
        MigratedRecord {
            id: id.into(),
            fork_of: None,
            title: Some(title.into()),
            readme: String::new(),
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            viewed_at: now,
            deleted_at: None,
            user_id: None,
            session_id: None,
            packages: Vec::new(),
            commit_sha: String::new(),
            tree_sha: String::new(),
            forks_count: 0,
            revisions_count: 1,
            comments_count: 0,
            views_count: 0,
            likes_count: 0,
            favorites_count: 0,
            collections: Vec::new(),
            queued: Vec::new(),
        }
    }

    #[test]
    fn test_index_upserts_by_id() -> Result<()> {
        let mut sink = MemorySink::new();
        let view = sink.clone();

        sink.index(&document("a", "first"))?;
        sink.bulk_index(&[document("a", "second"), document("b", "other")])?;

        assert_eq!(view.len(), 2);
        assert_eq!(view.get("a").and_then(|d| d.title), Some("second".to_string()));
        assert_eq!(view.request_sizes(), vec![1, 2]);
        Ok(())
    }
}
