//! Streaming migration run
//!
//! ```text
//! source ──(bounded channel)──> transform ──> batch ──> sink
//!                                                   └─> watermark ──> checkpoint
//! ```
//!
//! The source runs on its own thread and blocks once the channel holds one
//! batch worth of records, so memory stays flat no matter how large the
//! legacy store is. Everything after the channel runs on the calling thread.

use crate::checkpoint::CheckpointFile;
use crate::error::PipelineError;
use crate::progress::Progress;
use crate::record::{LegacyRecord, MigratedRecord};
use crate::sink::IndexSink;
use crate::source::RecordSource;
use crate::transform::transform;
use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender};
use plunk_history::Reconstructor;
use std::time::Duration;

/// Tuning for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Records per bulk write
    pub batch_size: usize,
    /// Batches between checkpoint writes
    pub checkpoint_every: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 16,
            checkpoint_every: 10,
        }
    }
}

/// Outcome of a completed run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub processed: u64,
    pub batches: u64,
    /// Watermark persisted at the end of the run
    pub watermark: Option<DateTime<Utc>>,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
struct RunState {
    processed: u64,
    batches: u64,
    watermark: Option<DateTime<Utc>>,
    last_record: Option<String>,
}

/// Drives records from a source through reconstruction into a sink
pub struct Pipeline {
    config: PipelineConfig,
    reconstructor: Reconstructor,
    checkpoint: CheckpointFile,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        reconstructor: Reconstructor,
        checkpoint: CheckpointFile,
    ) -> Self {
        Self {
            config,
            reconstructor,
            checkpoint,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Watermark a source should resume from
    pub fn resume_point(&self) -> anyhow::Result<Option<DateTime<Utc>>> {
        self.checkpoint.load()
    }

    /// Records between checkpoint writes
    pub fn checkpoint_interval(&self) -> u64 {
        (self.config.batch_size.max(1) * self.config.checkpoint_every.max(1)) as u64
    }

    /// Run until the source is exhausted or something fails
    ///
    /// On failure the checkpoint is left at its last periodic value.
    pub fn run<S, K>(&self, mut source: S, sink: &mut K) -> Result<RunSummary, PipelineError>
    where
        S: RecordSource,
        K: IndexSink,
    {
        let resume = self
            .resume_point()
            .map_err(|source| PipelineError::Checkpoint {
                last_record: None,
                source,
            })?;
        let total = source.count().map_err(|source| PipelineError::Source {
            last_record: None,
            source,
        })?;

        tracing::info!(
            total,
            resume_from = resume.map(|w| w.to_rfc3339()).as_deref().unwrap_or("start"),
            batch_size = self.config.batch_size,
            "Indexing records"
        );

        let batch_size = self.config.batch_size.max(1);
        let progress = Progress::new(total);
        let (tx, rx) = crossbeam_channel::bounded(batch_size);

        let state = std::thread::scope(|scope| {
            scope.spawn(move || produce(&mut source, tx));
            self.consume(rx, sink, &progress, resume)
        })?;

        if let Some(watermark) = state.watermark {
            self.checkpoint
                .save(watermark)
                .map_err(|source| PipelineError::Checkpoint {
                    last_record: state.last_record.clone(),
                    source,
                })?;
        }
        progress.finish(state.processed);

        Ok(RunSummary {
            processed: state.processed,
            batches: state.batches,
            watermark: state.watermark,
            elapsed: progress.elapsed(),
        })
    }

    fn consume<K: IndexSink>(
        &self,
        rx: Receiver<anyhow::Result<LegacyRecord>>,
        sink: &mut K,
        progress: &Progress,
        resume: Option<DateTime<Utc>>,
    ) -> Result<RunState, PipelineError> {
        let batch_size = self.config.batch_size.max(1);
        let mut state = RunState {
            watermark: resume,
            ..RunState::default()
        };
        let mut batch = Vec::with_capacity(batch_size);

        for item in rx {
            let record = item.map_err(|source| PipelineError::Source {
                last_record: state.last_record.clone(),
                source,
            })?;
            state.last_record = Some(record.id.clone());

            let migrated = transform(&self.reconstructor, &record).map_err(|source| {
                PipelineError::Transform {
                    record_id: record.id.clone(),
                    source,
                }
            })?;
            batch.push(migrated);

            if batch.len() >= batch_size {
                self.write_batch(&mut batch, sink, &mut state, progress)?;
            }
        }

        if !batch.is_empty() {
            self.write_batch(&mut batch, sink, &mut state, progress)?;
        }
        Ok(state)
    }

    fn write_batch<K: IndexSink>(
        &self,
        batch: &mut Vec<MigratedRecord>,
        sink: &mut K,
        state: &mut RunState,
        progress: &Progress,
    ) -> Result<(), PipelineError> {
        sink.bulk_index(batch).map_err(|source| PipelineError::Sink {
            last_record: state.last_record.clone(),
            source,
        })?;

        state.processed += batch.len() as u64;
        state.batches += 1;

        if let Some(batch_max) = batch.iter().map(|r| r.updated_at).max() {
            state.watermark = Some(match state.watermark {
                Some(current) => current.max(batch_max),
                None => batch_max,
            });
            progress.report(&progress.update(
                state.processed,
                state.last_record.as_deref(),
                batch_max,
            ));
        }
        batch.clear();

        if state.processed % self.checkpoint_interval() == 0 {
            if let Some(watermark) = state.watermark {
                self.checkpoint
                    .save(watermark)
                    .map_err(|source| PipelineError::Checkpoint {
                        last_record: state.last_record.clone(),
                        source,
                    })?;
            }
        }
        Ok(())
    }
}

/// Pull records until the source is exhausted, fails, or the consumer hangs up
fn produce<S: RecordSource>(source: &mut S, tx: Sender<anyhow::Result<LegacyRecord>>) {
    loop {
        let item = match source.next_record() {
            Ok(Some(record)) => Ok(record),
            Ok(None) => break,
            Err(e) => Err(e),
        };
        let failed = item.is_err();
        if tx.send(item).is_err() || failed {
            break;
        }
    }
    tracing::debug!("Source drained");
}
