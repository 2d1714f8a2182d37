//! Crash and resume behavior of the migration pipeline

use chrono::{DateTime, TimeZone, Utc};
use plunk_core::{BloomFilter, ObjectStore};
use plunk_history::{RawChange, Reconstructor};
use plunk_pipeline::{
    CheckpointFile, IndexSink, LegacyFile, LegacyRecord, LegacyRevision, MemorySink,
    MemorySource, MigratedRecord, Pipeline, PipelineConfig, PipelineError,
};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn ts(n: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1_400_000_000_000 + n * 1000).unwrap()
}

fn record(n: i64) -> LegacyRecord {
    LegacyRecord {
        id: format!("rec{:03}", n),
        user: Some("alice".into()),
        description: Some(format!("Record {}", n)),
        tags: vec!["demo".into()],
        created_at: ts(n),
        updated_at: ts(n),
        private: n % 2 == 0,
        fork_of: None,
        forks: Vec::new(),
        views: n as u64,
        thumbs: 0,
        files: vec![LegacyFile {
            filename: "index.html".into(),
            content: format!("<h1>{}</h1>", n),
        }],
        history: Vec::new(),
    }
}

fn open_pipeline(dir: &Path, config: PipelineConfig) -> anyhow::Result<Pipeline> {
    let store = ObjectStore::open(&dir.join("objects"), BloomFilter::default())?;
    Ok(Pipeline::new(
        config,
        Reconstructor::new(Arc::new(store)),
        CheckpointFile::new(dir.join("progress.txt")),
    ))
}

/// Sink that fails on one bulk request
struct FlakySink {
    inner: MemorySink,
    calls: usize,
    fail_on: usize,
}

impl IndexSink for FlakySink {
    fn bulk_index(&mut self, records: &[MigratedRecord]) -> anyhow::Result<()> {
        self.calls += 1;
        if self.calls == self.fail_on {
            anyhow::bail!("index unavailable");
        }
        self.inner.bulk_index(records)
    }
}

#[test]
fn test_restart_resumes_from_checkpoint_without_loss() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let config = PipelineConfig {
        batch_size: 4,
        checkpoint_every: 2,
    };
    let all: Vec<_> = (0..50).map(record).collect();
    let sink = MemorySink::new();

    // First run dies on the fourth batch; the checkpoint was written after the second
    {
        let pipeline = open_pipeline(temp_dir.path(), config)?;
        let mut flaky = FlakySink {
            inner: sink.clone(),
            calls: 0,
            fail_on: 4,
        };
        let err = pipeline
            .run(MemorySource::new(all.clone(), None), &mut flaky)
            .unwrap_err();

        assert!(matches!(err, PipelineError::Sink { .. }));
        assert_eq!(err.last_record(), Some("rec015"));
        assert_eq!(sink.len(), 12);
        assert_eq!(pipeline.resume_point()?, Some(ts(7)));
    }

    // Restart re-queries from the watermark
    let pipeline = open_pipeline(temp_dir.path(), config)?;
    let resume = pipeline.resume_point()?;
    let source = MemorySource::new(all.clone(), resume);
    let mut resumed_sink = sink.clone();
    let summary = pipeline.run(source, &mut resumed_sink)?;

    assert_eq!(summary.processed, 43);
    assert_eq!(sink.len(), 50);
    for record in &all {
        assert!(sink.get(&record.id).is_some(), "lost {}", record.id);
    }
    assert_eq!(pipeline.resume_point()?, Some(ts(49)));
    Ok(())
}

#[test]
fn test_failed_record_stops_run_and_reports_id() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let pipeline = open_pipeline(
        temp_dir.path(),
        PipelineConfig {
            batch_size: 2,
            checkpoint_every: 1,
        },
    )?;

    let mut records: Vec<_> = (0..6).map(record).collect();
    records[3].history = vec![LegacyRevision {
        changes: vec![RawChange {
            from: Some("index.html".into()),
            to: Some("index.html".into()),
            payload: Some("@@ -1,5 +1,5 @@\n-nope!\n+yes!!\n".into()),
        }],
    }];

    let mut sink = MemorySink::new();
    let err = pipeline
        .run(MemorySource::new(records, None), &mut sink)
        .unwrap_err();

    assert_eq!(err.last_record(), Some("rec003"));
    assert!(matches!(err, PipelineError::Transform { .. }));
    // Only the first batch completed, so the watermark stops at its newest record
    assert_eq!(sink.len(), 2);
    assert_eq!(pipeline.resume_point()?, Some(ts(1)));
    Ok(())
}

#[test]
fn test_documents_are_idempotent_by_id() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let pipeline = open_pipeline(temp_dir.path(), PipelineConfig::default())?;
    let records: Vec<_> = (0..3).map(record).collect();
    let mut sink = MemorySink::new();

    pipeline.run(MemorySource::new(records.clone(), None), &mut sink)?;
    let first = sink.get("rec001");
    pipeline.run(MemorySource::new(records, None), &mut sink)?;

    assert_eq!(sink.len(), 3);
    assert_eq!(sink.get("rec001"), first);
    Ok(())
}
