//! Resume watermark persistence
//!
//! The checkpoint is a single file holding the `updated_at` watermark as
//! decimal milliseconds since the Unix epoch. It is replaced atomically:
//! written to a uniquely named temp file, fsynced, then renamed over the
//! target.

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// File-backed watermark
#[derive(Debug, Clone)]
pub struct CheckpointFile {
    path: PathBuf,
}

impl CheckpointFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the watermark; a missing, empty or zero file means none
    pub fn load(&self) -> Result<Option<DateTime<Utc>>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read checkpoint {}", self.path.display())
                })
            }
        };

        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        let millis: i64 = text
            .parse()
            .with_context(|| format!("Invalid checkpoint value {:?}", text))?;
        if millis <= 0 {
            return Ok(None);
        }

        Utc.timestamp_millis_opt(millis)
            .single()
            .map(Some)
            .ok_or_else(|| anyhow::anyhow!("Checkpoint value out of range: {}", millis))
    }

    /// Durably overwrite the watermark
    pub fn save(&self, watermark: DateTime<Utc>) -> Result<()> {
        let data = watermark.timestamp_millis().to_string();
        atomic_write(&self.path, data.as_bytes())
            .with_context(|| format!("Failed to write checkpoint {}", self.path.display()))?;

        tracing::debug!(
            path = %self.path.display(),
            watermark = %watermark.to_rfc3339(),
            "Checkpoint saved"
        );
        Ok(())
    }
}

/// Write `data` to `target` via a temp file in the same directory
pub fn atomic_write(target: &Path, data: &[u8]) -> Result<()> {
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    let temp_path = parent.join(format!(".{}.tmp", uuid::Uuid::new_v4()));
    let mut temp_file = fs::File::create(&temp_path)?;
    temp_file.write_all(data)?;
    temp_file.sync_all()?;
    drop(temp_file);

    if let Err(e) = fs::rename(&temp_path, target) {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }

    if let Ok(dir) = fs::File::open(&parent) {
        let _ = dir.sync_all();
    }

    Ok(())
}
