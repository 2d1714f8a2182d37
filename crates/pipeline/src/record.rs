//! Legacy input records and migrated output documents

use chrono::{DateTime, Utc};
use plunk_history::{PackageRef, RawChange};
use serde::{Deserialize, Deserializer, Serialize};

/// Collection every public record is listed in
pub const PUBLIC_COLLECTION: &str = "plunker/public";

/// A file as stored on a legacy record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyFile {
    pub filename: String,
    #[serde(default)]
    pub content: String,
}

/// A stored revision: the changes that undo the next newer state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyRevision {
    #[serde(default)]
    pub changes: Vec<RawChange>,
}

/// A record read from the legacy store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyRecord {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub fork_of: Option<String>,
    /// Ids of records forked from this one
    #[serde(default)]
    pub forks: Vec<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub views: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub thumbs: u64,
    #[serde(default)]
    pub files: Vec<LegacyFile>,
    /// Newest first
    #[serde(default)]
    pub history: Vec<LegacyRevision>,
}

/// The document written to the search index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigratedRecord {
    pub id: String,
    pub fork_of: Option<String>,
    pub title: Option<String>,
    pub readme: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub viewed_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub packages: Vec<PackageRef>,
    pub commit_sha: String,
    pub tree_sha: String,
    pub forks_count: u64,
    pub revisions_count: u64,
    pub comments_count: u64,
    pub views_count: u64,
    pub likes_count: u64,
    pub favorites_count: u64,
    pub collections: Vec<String>,
    pub queued: Vec<String>,
}

/// Counters were stored as numbers or numeric strings; anything else is zero
fn lenient_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Count {
        Int(u64),
        Float(f64),
        Text(String),
        Other(serde_json::Value),
    }

    Ok(match Count::deserialize(deserializer)? {
        Count::Int(n) => n,
        Count::Float(f) if f.is_finite() && f > 0.0 => f as u64,
        Count::Text(s) => parse_leading_int(&s),
        Count::Float(_) | Count::Other(_) => 0,
    })
}

/// Leading decimal digits of a string, zero if there are none
pub fn parse_leading_int(text: &str) -> u64 {
    let digits: String = text
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORD: &str = r#"{
        "_id": "abc123",
        "user": "alice",
        "description": "Hello",
        "tags": ["demo", "angular", "demo"],
        "created_at": "2013-05-01T10:00:00Z",
        "updated_at": "2014-01-02T03:04:05.678Z",
        "private": false,
        "forks": ["f1", "f2"],
        "views": "42",
        "thumbs": 3,
        "files": [{"filename": "index.html", "content": "<h1>hi</h1>"}],
        "history": [{"changes": [{"fn": "index.html", "pn": "index.html"}]}]
    }"#;

    #[test]
    fn test_legacy_record_parses() -> anyhow::Result<()> {
        let record: LegacyRecord = serde_json::from_str(RECORD)?;
        assert_eq!(record.id, "abc123");
        assert_eq!(record.views, 42);
        assert_eq!(record.thumbs, 3);
        assert_eq!(record.forks.len(), 2);
        assert_eq!(record.files[0].filename, "index.html");
        assert_eq!(record.history[0].changes[0].from.as_deref(), Some("index.html"));
        assert_eq!(record.updated_at.timestamp_millis(), 1_388_631_845_678);
        Ok(())
    }

    #[test]
    fn test_missing_optional_fields_default() -> anyhow::Result<()> {
        let record: LegacyRecord = serde_json::from_str(
            r#"{"id": "x", "created_at": "2013-01-01T00:00:00Z", "updated_at": "2013-01-01T00:00:00Z"}"#,
        )?;
        assert_eq!(record.user, None);
        assert!(record.files.is_empty());
        assert!(record.history.is_empty());
        assert_eq!(record.views, 0);
        assert!(!record.private);
        Ok(())
    }

    #[test]
    fn test_lenient_counts() -> anyhow::Result<()> {
        for (raw, expected) in [("\"17 views\"", 17), ("\"n/a\"", 0), ("null", 0), ("2.9", 2), ("-4", 0)] {
            let json = format!(
                r#"{{"id": "x", "created_at": "2013-01-01T00:00:00Z", "updated_at": "2013-01-01T00:00:00Z", "views": {}}}"#,
                raw
            );
            let record: LegacyRecord = serde_json::from_str(&json)?;
            assert_eq!(record.views, expected, "views = {}", raw);
        }
        Ok(())
    }
}
