//! Configuration for plunk-migrate
//!
//! Stored at `~/.config/plunk-migrate/config.toml` (Linux/macOS) or
//! `%APPDATA%\plunk-migrate\config.toml` (Windows), or passed with `--config`.
//! Every key is optional; a missing file means defaults throughout.
//!
//! `MONGO_URL`, when set, overrides `[source].url`.

use anyhow::{Context, Result};
use plunk_pipeline::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming the legacy store
pub const MONGO_URL_ENV: &str = "MONGO_URL";

/// Full migration configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrateConfig {
    /// Legacy record store
    pub source: SourceConfig,

    /// Search index receiving migrated records
    pub destination: DestinationConfig,

    /// Object store for reconstructed history
    pub objects: ObjectsConfig,

    /// Batching and checkpointing
    pub pipeline: PipelineSection,
}

/// Legacy store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Connection string (default: mongodb://localhost:27017/plunker)
    pub url: String,

    /// Database name; taken from the connection string when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    /// Collection holding the records (default: plunks)
    pub collection: String,

    /// Stop after this many records
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "mongodb://localhost:27017/plunker".to_string(),
            database: None,
            collection: "plunks".to_string(),
            limit: None,
        }
    }
}

/// Search index configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DestinationConfig {
    /// Base URL of the index server (default: http://localhost:9200)
    pub url: String,

    /// Index name (default: plunker)
    pub index: String,

    /// Request timeout in seconds (default: 120)
    pub timeout_secs: u64,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            index: "plunker".to_string(),
            timeout_secs: 120,
        }
    }
}

/// Object store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectsConfig {
    /// Store directory (default: ./objects)
    pub path: PathBuf,

    /// Dedup filter size in bits (default: 1048576)
    pub bloom_bits: usize,

    /// Dedup filter probes per object (default: 32)
    pub bloom_hashes: u32,
}

impl Default for ObjectsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./objects"),
            bloom_bits: plunk_core::bloom::DEFAULT_BITS,
            bloom_hashes: plunk_core::bloom::DEFAULT_HASHES,
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// Records per bulk write (default: 16)
    pub batch_size: usize,

    /// Batches between checkpoint writes (default: 10)
    pub checkpoint_every: usize,

    /// Watermark file (default: progress.txt)
    pub progress_file: PathBuf,

    /// Pause before exiting after a successful run (default: 300)
    pub exit_grace_secs: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            batch_size: 16,
            checkpoint_every: 10,
            progress_file: PathBuf::from("progress.txt"),
            exit_grace_secs: 300,
        }
    }
}

impl MigrateConfig {
    /// Apply overrides from the environment
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any variable lookup
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(MONGO_URL_ENV).filter(|u| !u.is_empty()) {
            tracing::debug!("Using {} for the source connection", MONGO_URL_ENV);
            self.source.url = url;
        }
    }

    /// Batching settings for the pipeline
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            batch_size: self.pipeline.batch_size.max(1),
            checkpoint_every: self.pipeline.checkpoint_every.max(1),
        }
    }

    /// Dedup filter sized per `[objects]`
    pub fn bloom_filter(&self) -> plunk_core::BloomFilter {
        plunk_core::BloomFilter::new(self.objects.bloom_bits, self.objects.bloom_hashes)
    }
}

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        dirs::home_dir().map(|h| h.join(".config/plunk-migrate"))
    }

    #[cfg(not(target_os = "macos"))]
    {
        dirs::config_dir().map(|c| c.join("plunk-migrate"))
    }
}

/// Get the default config file path
pub fn config_file_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration
///
/// An explicit path must exist. Without one, the default location is used
/// if present, otherwise defaults. Environment overrides are not applied.
pub fn load(explicit: Option<&Path>) -> Result<MigrateConfig> {
    let config_path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match config_file_path() {
            Some(p) if p.exists() => p,
            _ => {
                tracing::debug!("No config file found, using defaults");
                return Ok(MigrateConfig::default());
            }
        },
    };

    let content = fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read config at {}", config_path.display()))?;
    let config = parse(&content)
        .with_context(|| format!("Failed to parse config at {}", config_path.display()))?;

    tracing::debug!("Loaded config from {}", config_path.display());
    Ok(config)
}

/// Parse configuration text
pub fn parse(content: &str) -> Result<MigrateConfig> {
    Ok(toml::from_str(content)?)
}

/// Generate example config content for display
pub fn example_config() -> String {
    let mut content = String::from("# plunk-migrate configuration\n");
    content.push_str("# Location: ~/.config/plunk-migrate/config.toml\n");
    content.push_str("#\n");
    content.push_str("# MONGO_URL overrides [source].url when set.\n\n");
    content.push_str(&toml::to_string_pretty(&MigrateConfig::default()).unwrap_or_default());
    content
}
