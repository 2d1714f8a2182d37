//! MongoDB cursor over legacy records
//!
//! The driver is async; the source owns a current-thread runtime and blocks
//! on it one cursor step at a time, so it can live on the pipeline's
//! producer thread.

use crate::config::SourceConfig;
use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::FindOptions;
use mongodb::{Client, Cursor};
use plunk_history::RawChange;
use plunk_pipeline::record::parse_leading_int;
use plunk_pipeline::{LegacyFile, LegacyRecord, LegacyRevision, RecordSource};

/// Database used when neither the config nor the URL names one
pub const DEFAULT_DATABASE: &str = "plunker";

pub struct MongoSource {
    runtime: tokio::runtime::Runtime,
    cursor: Cursor<Document>,
    count: u64,
}

impl MongoSource {
    /// Open an ascending `updated_at` cursor starting at `since`
    pub fn connect(
        config: &SourceConfig,
        since: Option<DateTime<Utc>>,
        batch_size: u32,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to start runtime for the source")?;

        let (cursor, count) = runtime.block_on(async {
            let client = Client::with_uri_str(&config.url)
                .await
                .context("Failed to connect to the legacy store")?;
            let database = match &config.database {
                Some(name) => client.database(name),
                None => client
                    .default_database()
                    .unwrap_or_else(|| client.database(DEFAULT_DATABASE)),
            };
            let collection = database.collection::<Document>(&config.collection);

            let filter = watermark_filter(since);
            let count = collection
                .count_documents(filter.clone(), None)
                .await
                .context("Failed to count legacy records")?;

            let options = FindOptions::builder()
                .sort(doc! { "updated_at": 1 })
                .batch_size(batch_size)
                .limit(config.limit.map(|l| l as i64))
                .build();
            let cursor = collection
                .find(filter, options)
                .await
                .context("Failed to query legacy records")?;

            Ok::<_, anyhow::Error>((cursor, count))
        })?;

        let count = config.limit.map_or(count, |limit| count.min(limit));
        tracing::info!(
            collection = %config.collection,
            count,
            since = since.map(|s| s.to_rfc3339()).as_deref().unwrap_or("start"),
            "Opened legacy cursor"
        );

        Ok(Self {
            runtime,
            cursor,
            count,
        })
    }
}

impl RecordSource for MongoSource {
    fn count(&mut self) -> Result<u64> {
        Ok(self.count)
    }

    fn next_record(&mut self) -> Result<Option<LegacyRecord>> {
        let Self {
            runtime, cursor, ..
        } = self;

        let has_next = runtime
            .block_on(cursor.advance())
            .context("Failed to read from the legacy cursor")?;
        if !has_next {
            return Ok(None);
        }

        let document: Document = cursor
            .deserialize_current()
            .context("Failed to decode legacy document")?;
        record_from_document(&document).map(Some)
    }
}

/// Filter selecting records at or after the watermark
pub fn watermark_filter(since: Option<DateTime<Utc>>) -> Document {
    match since {
        Some(since) => doc! {
            "updated_at": { "$gte": mongodb::bson::DateTime::from_millis(since.timestamp_millis()) }
        },
        None => doc! {},
    }
}

/// Convert a stored document into a legacy record
pub fn record_from_document(document: &Document) -> Result<LegacyRecord> {
    let id = document
        .get("_id")
        .and_then(identifier)
        .ok_or_else(|| anyhow::anyhow!("Legacy document has no usable _id"))?;

    // The resume watermark depends on updated_at; created_at is informational
    let updated_at = document
        .get("updated_at")
        .and_then(datetime)
        .ok_or_else(|| anyhow::anyhow!("Record {} has no valid updated_at", id))?;
    let created_at = document
        .get("created_at")
        .and_then(datetime)
        .unwrap_or(updated_at);

    Ok(LegacyRecord {
        id: id.clone(),
        user: document.get("user").and_then(identifier),
        description: document.get("description").and_then(text),
        tags: strings(document.get("tags")),
        created_at,
        updated_at,
        private: matches!(document.get("private"), Some(Bson::Boolean(true))),
        fork_of: document.get("fork_of").and_then(identifier),
        forks: array(document.get("forks"))
            .iter()
            .filter_map(identifier)
            .collect(),
        views: document.get("views").map(count).unwrap_or(0),
        thumbs: document.get("thumbs").map(count).unwrap_or(0),
        files: array(document.get("files"))
            .iter()
            .filter_map(|f| f.as_document())
            .filter_map(file)
            .collect(),
        history: array(document.get("history"))
            .iter()
            .map(|rev| LegacyRevision {
                changes: rev
                    .as_document()
                    .map(|rev| array(rev.get("changes")))
                    .unwrap_or_default()
                    .iter()
                    .filter_map(|c| c.as_document())
                    .map(change)
                    .collect(),
            })
            .collect(),
    })
}

fn identifier(value: &Bson) -> Option<String> {
    match value {
        Bson::String(s) => Some(s.clone()),
        Bson::ObjectId(oid) => Some(oid.to_hex()),
        _ => None,
    }
}

fn text(value: &Bson) -> Option<String> {
    match value {
        Bson::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn datetime(value: &Bson) -> Option<DateTime<Utc>> {
    match value {
        Bson::DateTime(dt) => Utc.timestamp_millis_opt(dt.timestamp_millis()).single(),
        Bson::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}

fn count(value: &Bson) -> u64 {
    match value {
        Bson::Int32(n) => u64::try_from(*n).unwrap_or(0),
        Bson::Int64(n) => u64::try_from(*n).unwrap_or(0),
        Bson::Double(f) if f.is_finite() && *f > 0.0 => *f as u64,
        Bson::String(s) => parse_leading_int(s),
        _ => 0,
    }
}

fn array(value: Option<&Bson>) -> Vec<Bson> {
    match value {
        Some(Bson::Array(items)) => items.clone(),
        _ => Vec::new(),
    }
}

fn strings(value: Option<&Bson>) -> Vec<String> {
    array(value).iter().filter_map(text).collect()
}

fn file(document: &Document) -> Option<LegacyFile> {
    Some(LegacyFile {
        filename: document.get("filename").and_then(text)?,
        content: document.get("content").and_then(text).unwrap_or_default(),
    })
}

fn change(document: &Document) -> RawChange {
    RawChange {
        from: document.get("fn").and_then(text),
        to: document.get("pn").and_then(text),
        payload: document.get("pl").and_then(text),
    }
}
