//! Run progress reporting

use chrono::{DateTime, SecondsFormat, Utc};
use indicatif::{HumanCount, ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};

const BAR_TEMPLATE: &str =
    "{spinner:.green} Parsed: {human_pos:.cyan} / {human_len} = {percent}%  {per_sec}  {msg:.dim}";

/// Progress of a run after a batch
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub processed: u64,
    pub total: u64,
    /// Records per second since the run started
    pub rate: f64,
    pub last_record: Option<String>,
    /// Newest `updated_at` in the batch just written
    pub batch_updated_at: DateTime<Utc>,
}

impl ProgressUpdate {
    /// Percent complete; a run with nothing to do is complete
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            100.0 * self.processed as f64 / self.total as f64
        }
    }

    /// Last record id and batch timestamp
    pub fn message(&self) -> String {
        format!(
            "{}  {}",
            self.last_record.as_deref().unwrap_or("-"),
            self.batch_updated_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        )
    }

    /// Plain single-line rendering
    pub fn line(&self) -> String {
        format!(
            "Parsed: {} / {} = {:.2}%  {:.2}/s  {}",
            HumanCount(self.processed),
            HumanCount(self.total),
            self.percent(),
            self.rate,
            self.message(),
        )
    }
}

/// Progress bar on a terminal, plain lines otherwise
pub struct Progress {
    bar: ProgressBar,
    started: Instant,
}

impl Progress {
    pub fn new(total: u64) -> Self {
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::with_template(BAR_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Self {
            bar,
            started: Instant::now(),
        }
    }

    pub fn total(&self) -> u64 {
        self.bar.length().unwrap_or(0)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Records per second for `processed` records so far
    pub fn rate(&self, processed: u64) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs > 0.0 {
            processed as f64 / secs
        } else {
            0.0
        }
    }

    /// Build the update for the batch just written
    pub fn update(
        &self,
        processed: u64,
        last_record: Option<&str>,
        batch_updated_at: DateTime<Utc>,
    ) -> ProgressUpdate {
        ProgressUpdate {
            processed,
            total: self.total(),
            rate: self.rate(processed),
            last_record: last_record.map(String::from),
            batch_updated_at,
        }
    }

    /// Emit one update
    pub fn report(&self, update: &ProgressUpdate) {
        tracing::debug!(
            processed = update.processed,
            total = update.total,
            rate = update.rate,
            last_record = update.last_record.as_deref().unwrap_or(""),
            "Batch written"
        );

        self.bar.set_position(update.processed);
        self.bar.set_message(update.message());
        if self.bar.is_hidden() {
            eprintln!("{}", update.line());
        }
    }

    /// Close the bar and log the run totals
    pub fn finish(&self, processed: u64) {
        self.bar.finish();
        tracing::info!(
            processed = %HumanCount(processed),
            elapsed_ms = self.elapsed().as_millis() as u64,
            rate = format!("{:.2}", self.rate(processed)).as_str(),
            "Import completed"
        );
    }
}
