//! Run the migration

use crate::config::MigrateConfig;
use crate::elastic::ElasticSink;
use crate::mongo::MongoSource;
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use plunk_core::ObjectStore;
use plunk_history::Reconstructor;
use plunk_pipeline::{CheckpointFile, Pipeline, RunSummary};
use std::sync::Arc;
use std::time::Duration;

/// Filter fill ratio past which false skips stop being rare
const SATURATION_WARNING: f64 = 0.5;

/// Overrides for a single run
#[derive(Debug, Clone, Default, clap::Args)]
pub struct RunArgs {
    /// Legacy store connection string (overrides config and MONGO_URL)
    #[arg(long)]
    pub mongo_url: Option<String>,

    /// Index server base URL
    #[arg(long)]
    pub es_url: Option<String>,

    /// Stop after this many records
    #[arg(long)]
    pub limit: Option<u64>,

    /// Records per bulk write
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Exit as soon as the run completes
    #[arg(long)]
    pub no_wait: bool,
}

impl RunArgs {
    /// Fold command-line overrides into the loaded config
    pub fn apply(&self, config: &mut MigrateConfig) {
        if let Some(url) = &self.mongo_url {
            config.source.url = url.clone();
        }
        if let Some(url) = &self.es_url {
            config.destination.url = url.clone();
        }
        if let Some(limit) = self.limit {
            config.source.limit = Some(limit);
        }
        if let Some(batch_size) = self.batch_size {
            config.pipeline.batch_size = batch_size;
        }
        if self.no_wait {
            config.pipeline.exit_grace_secs = 0;
        }
    }
}

pub fn run(mut config: MigrateConfig, args: &RunArgs) -> Result<()> {
    args.apply(&mut config);
    let pipeline_config = config.pipeline_config();

    let store = Arc::new(
        ObjectStore::open(&config.objects.path, config.bloom_filter())
            .context("Failed to open object store")?,
    );
    let pipeline = Pipeline::new(
        pipeline_config,
        Reconstructor::new(Arc::clone(&store)),
        CheckpointFile::new(&config.pipeline.progress_file),
    );

    println!("{} Checking index {}", "→".dimmed(), config.destination.index.cyan());
    let mut sink = ElasticSink::new(&config.destination)?;
    if sink.ensure_index()? {
        println!("  {} Index created", "✓".green());
    }

    let since = pipeline
        .resume_point()
        .context("Failed to read checkpoint")?;
    if let Some(since) = since {
        println!(
            "{} Resuming from {}",
            "→".dimmed(),
            since.to_rfc3339().yellow()
        );
    }

    let batch_size = u32::try_from(pipeline_config.batch_size).unwrap_or(u32::MAX);
    let source = MongoSource::connect(&config.source, since, batch_size)?;
    let summary = pipeline.run(source, &mut sink)?;
    print_summary(&summary, &store);

    let grace = config.pipeline.exit_grace_secs;
    if grace > 0 {
        tracing::info!("Exiting in {}s", grace);
        std::thread::sleep(Duration::from_secs(grace));
    }
    Ok(())
}

fn print_summary(summary: &RunSummary, store: &ObjectStore) {
    let secs = summary.elapsed.as_secs_f64();
    let rate = if secs > 0.0 {
        summary.processed as f64 / secs
    } else {
        0.0
    };

    println!(
        "{} Import completed: {} records in {} batches, {:.1}s ({:.2}/s)",
        "✓".green(),
        summary.processed.to_string().yellow(),
        summary.batches,
        secs,
        rate
    );
    if let Some(watermark) = summary.watermark {
        println!("  {} Watermark {}", "→".dimmed(), watermark.to_rfc3339());
    }

    let stats = store.stats();
    let fill = store.filter_fill_ratio();
    println!(
        "  {} Objects: {} written, {} skipped, filter {:.1}% full",
        "→".dimmed(),
        stats.written,
        stats.skipped,
        fill * 100.0
    );
    tracing::info!(
        written = stats.written,
        skipped = stats.skipped,
        flushes = stats.flushes,
        filter_fill = fill,
        "Object store totals"
    );
    if fill > SATURATION_WARNING {
        tracing::warn!(
            "Dedup filter is {:.0}% full; raise [objects].bloom_bits for the next run",
            fill * 100.0
        );
    }
}
