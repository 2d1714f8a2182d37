//! Elasticsearch index sink

use crate::config::DestinationConfig;
use anyhow::{Context, Result};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use plunk_pipeline::{IndexSink, MigratedRecord};
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;

pub struct ElasticSink {
    client: Client,
    base_url: String,
    index: String,
}

impl ElasticSink {
    pub fn new(config: &DestinationConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            index: config.index.clone(),
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index
    }

    /// Create the index with its mapping unless it already exists
    ///
    /// Returns `true` when the index was created.
    pub fn ensure_index(&self) -> Result<bool> {
        let url = format!("{}/{}", self.base_url, self.index);

        let exists = self
            .client
            .head(&url)
            .send()
            .with_context(|| format!("Failed to reach index server at {}", self.base_url))?;
        match exists.status() {
            StatusCode::OK => {
                tracing::info!(index = %self.index, "Index exists");
                return Ok(false);
            }
            StatusCode::NOT_FOUND => {}
            status => anyhow::bail!("Unexpected status {} checking index {}", status, self.index),
        }

        let response = self
            .client
            .put(&url)
            .json(&index_definition())
            .send()
            .with_context(|| format!("Failed to create index {}", self.index))?;
        ensure_success(response, "create index")?;

        tracing::info!(index = %self.index, "Index created");
        Ok(true)
    }
}

impl IndexSink for ElasticSink {
    fn bulk_index(&mut self, records: &[MigratedRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let body = bulk_body(&self.index, records)?;
        let response = self
            .client
            .post(format!("{}/_bulk", self.base_url))
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .context("Bulk request failed")?;

        let result: Value = ensure_success(response, "bulk index")?
            .json()
            .context("Invalid bulk response")?;
        check_bulk_response(&result)
    }

    fn index(&mut self, record: &MigratedRecord) -> Result<()> {
        let url = format!(
            "{}/{}/_doc/{}",
            self.base_url,
            self.index,
            utf8_percent_encode(&record.id, NON_ALPHANUMERIC)
        );
        let response = self
            .client
            .put(url)
            .json(record)
            .send()
            .with_context(|| format!("Failed to index record {}", record.id))?;
        ensure_success(response, "index record")?;
        Ok(())
    }
}

/// Index settings and mapping
///
/// Identifiers are exact-match keywords; tags and package fields use a
/// lowercased keyword analyzer.
pub fn index_definition() -> Value {
    let keyword = json!({ "type": "keyword" });
    let analyzed = json!({ "type": "text", "analyzer": "analyzer_keyword" });

    json!({
        "settings": {
            "index": {
                "analysis": {
                    "analyzer": {
                        "analyzer_keyword": {
                            "tokenizer": "keyword",
                            "filter": ["lowercase"]
                        }
                    }
                }
            }
        },
        "mappings": {
            "properties": {
                "id": keyword,
                "user_id": keyword,
                "fork_of": keyword,
                "session_id": keyword,
                "commit_sha": keyword,
                "tree_sha": keyword,
                "collections": keyword,
                "queued": keyword,
                "tags": analyzed,
                "packages": {
                    "properties": {
                        "name": analyzed,
                        "semver": analyzed,
                        "semverRange": analyzed
                    }
                }
            }
        }
    })
}

/// Newline-delimited (action, document) pairs for `_bulk`
pub fn bulk_body(index: &str, records: &[MigratedRecord]) -> Result<String> {
    let mut body = String::new();
    for record in records {
        let action = json!({ "index": { "_index": index, "_id": record.id } });
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(record)?);
        body.push('\n');
    }
    Ok(body)
}

/// Fail if any item in a bulk response was rejected
pub fn check_bulk_response(response: &Value) -> Result<()> {
    if !response["errors"].as_bool().unwrap_or(false) {
        return Ok(());
    }

    let items = response["items"].as_array().map(Vec::as_slice).unwrap_or(&[]);
    let failed: Vec<_> = items
        .iter()
        .filter_map(|item| item.as_object()?.values().next())
        .filter(|result| !result["error"].is_null())
        .collect();

    let first = failed
        .first()
        .map(|result| {
            format!(
                "{}: {}",
                result["_id"].as_str().unwrap_or("?"),
                result["error"]["reason"]
                    .as_str()
                    .unwrap_or_else(|| result["error"]["type"].as_str().unwrap_or("unknown"))
            )
        })
        .unwrap_or_else(|| "unknown".to_string());

    anyhow::bail!(
        "Bulk write rejected {} of {} documents (first: {})",
        failed.len(),
        items.len(),
        first
    )
}

fn ensure_success(response: Response, action: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    anyhow::bail!("Failed to {}: HTTP {}: {}", action, status, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(id: &str) -> MigratedRecord {
        let ts = Utc.with_ymd_and_hms(2014, 1, 2, 3, 4, 5).unwrap();
        MigratedRecord {
            id: id.to_string(),
            fork_of: None,
            title: Some("Demo".into()),
            readme: String::new(),
            tags: vec!["demo".into()],
            created_at: ts,
            updated_at: ts,
            viewed_at: ts,
            deleted_at: None,
            user_id: None,
            session_id: None,
            packages: Vec::new(),
            commit_sha: "0".repeat(40),
            tree_sha: "1".repeat(40),
            forks_count: 0,
            revisions_count: 1,
            comments_count: 0,
            views_count: 0,
            likes_count: 0,
            favorites_count: 0,
            collections: vec!["plunker/public".into()],
            queued: Vec::new(),
        }
    }

    #[test]
    fn test_bulk_body_pairs() -> Result<()> {
        let body = bulk_body("plunker", &[record("a"), record("b")])?;
        let lines: Vec<Value> = body
            .lines()
            .map(serde_json::from_str)
            .collect::<std::result::Result<_, _>>()?;

        assert!(body.ends_with('\n'));
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0]["index"]["_index"], "plunker");
        assert_eq!(lines[0]["index"]["_id"], "a");
        assert_eq!(lines[1]["id"], "a");
        assert_eq!(lines[2]["index"]["_id"], "b");
        assert_eq!(lines[3]["revisions_count"], 1);
        Ok(())
    }

    #[test]
    fn test_bulk_response_without_errors() -> Result<()> {
        check_bulk_response(&json!({ "took": 3, "errors": false, "items": [] }))
    }

    #[test]
    fn test_bulk_response_with_rejections() {
        let response = json!({
            "errors": true,
            "items": [
                { "index": { "_id": "a", "status": 201 } },
                { "index": { "_id": "b", "status": 400,
                    "error": { "type": "mapper_parsing_exception", "reason": "failed to parse [tags]" } } }
            ]
        });

        let err = check_bulk_response(&response).unwrap_err().to_string();
        assert!(err.contains("1 of 2"), "{}", err);
        assert!(err.contains("b: failed to parse [tags]"), "{}", err);
    }

    #[test]
    fn test_mapping_marks_identifiers_exact() {
        let definition = index_definition();
        let properties = &definition["mappings"]["properties"];

        for field in ["id", "user_id", "fork_of", "session_id", "commit_sha", "tree_sha", "collections", "queued"] {
            assert_eq!(properties[field]["type"], "keyword", "{}", field);
        }
        assert_eq!(properties["tags"]["analyzer"], "analyzer_keyword");
        assert_eq!(
            properties["packages"]["properties"]["semverRange"]["analyzer"],
            "analyzer_keyword"
        );
    }
}
