//! Durable object store with Bloom-filter deduplication
//!
//! Objects are kept in a sled database keyed by their raw 20-byte identity.
//! Values are git loose objects (`"<kind> <len>\0<body>"`, zlib-compressed).
//!
//! Each record stages its writes in its own [`StagedObjects`] buffer, which
//! [`ObjectStore::flush`] applies as one atomic batch. Before staging, the
//! identity is checked against a shared Bloom filter; a positive answer skips
//! the write. Identities are marked seen only once their batch is durable, so
//! a dropped buffer never leaves the filter claiming an object that was not
//! written. A false positive skips a write that was never made; the filter is
//! sized at run start so that stays rare. Identity is derived from content,
//! so a skip never changes the bytes stored under any key.

use crate::bloom::BloomFilter;
use crate::commit::Commit;
use crate::hash::{git, Sha1Hash};
use anyhow::{Context, Result};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// An object read back from the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawObject {
    /// Object kind: `blob`, `tree` or `commit`
    pub kind: String,
    /// Uncompressed body
    pub body: Vec<u8>,
}

/// Writes staged for one record
///
/// Dropping it without [`ObjectStore::flush`] discards the writes and leaves
/// the filter untouched.
#[derive(Default)]
pub struct StagedObjects {
    batch: sled::Batch,
    ids: Vec<Sha1Hash>,
    staged: HashSet<Sha1Hash>,
}

impl StagedObjects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identities staged so far, in staging order
    pub fn ids(&self) -> &[Sha1Hash] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn contains(&self, id: &Sha1Hash) -> bool {
        self.staged.contains(id)
    }

    fn insert(&mut self, id: Sha1Hash, encoded: Vec<u8>) {
        self.batch.insert(id.as_bytes().as_slice(), encoded);
        self.staged.insert(id);
        self.ids.push(id);
    }
}

/// Counters for the lifetime of one store handle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Objects applied to durable storage
    pub written: u64,
    /// Objects skipped because the filter had seen them
    pub skipped: u64,
    /// Batches applied
    pub flushes: u64,
}

/// Object store shared by every reconstruction in a run
///
/// One handle is created at run start and passed around behind an `Arc`.
/// The filter sits behind a mutex; lookups and marks are linearized across
/// callers.
pub struct ObjectStore {
    path: PathBuf,
    db: sled::Db,
    seen: Mutex<BloomFilter>,
    written: AtomicU64,
    skipped: AtomicU64,
    flushes: AtomicU64,
}

impl ObjectStore {
    /// Open or create a store at `path` with the given filter
    pub fn open(path: &Path, filter: BloomFilter) -> Result<Self> {
        let db = sled::open(path)
            .with_context(|| format!("Failed to open object store at {}", path.display()))?;

        tracing::debug!(
            path = %path.display(),
            filter_bits = filter.num_bits(),
            "Opened object store"
        );

        Ok(Self {
            path: path.to_path_buf(),
            db,
            seen: Mutex::new(filter),
            written: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
        })
    }

    /// Open a store with the default filter size
    pub fn open_default(path: &Path) -> Result<Self> {
        Self::open(path, BloomFilter::default())
    }

    /// Check whether an identity may already be stored (false positives possible)
    pub fn has(&self, id: &Sha1Hash) -> bool {
        self.seen.lock().contains(id)
    }

    /// Stage an object into `staged` unless the filter or the buffer has it
    ///
    /// Returns `true` when the object was staged.
    pub fn put(
        &self,
        staged: &mut StagedObjects,
        id: Sha1Hash,
        kind: &str,
        body: &[u8],
    ) -> Result<bool> {
        if staged.contains(&id) || self.has(&id) {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return Ok(false);
        }

        staged.insert(id, encode_object(kind, body)?);
        Ok(true)
    }

    /// Stage every object a commit introduces
    pub fn save_commit(&self, staged: &mut StagedObjects, commit: &Commit) -> Result<usize> {
        let mut count = 0;
        for (id, kind, body) in commit.objects() {
            if self.put(staged, id, kind, &body)? {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Apply one record's writes atomically, sync them, then mark them seen
    ///
    /// Returns the number of objects written.
    pub fn flush(&self, staged: StagedObjects) -> Result<usize> {
        let StagedObjects { batch, ids, .. } = staged;
        self.db
            .apply_batch(batch)
            .context("Failed to apply object batch")?;
        self.db.flush().context("Failed to flush object store")?;

        {
            let mut seen = self.seen.lock();
            for id in &ids {
                seen.add(id);
            }
        }

        self.written.fetch_add(ids.len() as u64, Ordering::Relaxed);
        self.flushes.fetch_add(1, Ordering::Relaxed);
        Ok(ids.len())
    }

    /// Read an object back, verifying that its content matches its identity
    pub fn get(&self, id: &Sha1Hash) -> Result<Option<RawObject>> {
        let value = match self.db.get(id.as_bytes())? {
            Some(v) => v,
            None => return Ok(None),
        };

        let object = decode_object(&value)?;
        let computed = git::hash_object(&object.kind, &object.body);
        if computed != *id {
            anyhow::bail!("Object hash mismatch: expected {}, got {}", id, computed);
        }

        Ok(Some(object))
    }

    /// Check durable storage directly, bypassing the filter
    pub fn contains_durable(&self, id: &Sha1Hash) -> Result<bool> {
        Ok(self.db.contains_key(id.as_bytes())?)
    }

    /// Number of objects in durable storage
    pub fn len(&self) -> usize {
        self.db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }

    /// Counters since the store was opened
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            written: self.written.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
        }
    }

    /// Fraction of filter bits set
    pub fn filter_fill_ratio(&self) -> f64 {
        self.seen.lock().fill_ratio()
    }

    /// Store location on disk
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Encode an object as a zlib-compressed git loose object
pub fn encode_object(kind: &str, body: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&git::header(kind, body.len()))?;
    encoder.write_all(body)?;
    Ok(encoder.finish()?)
}

/// Decode a zlib-compressed git loose object
pub fn decode_object(bytes: &[u8]) -> Result<RawObject> {
    let mut raw = Vec::new();
    ZlibDecoder::new(bytes)
        .read_to_end(&mut raw)
        .context("Failed to inflate object")?;

    let nul = raw
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| anyhow::anyhow!("Invalid object: missing header terminator"))?;
    let header = std::str::from_utf8(&raw[..nul])?;
    let (kind, len) = header
        .split_once(' ')
        .ok_or_else(|| anyhow::anyhow!("Invalid object header: {:?}", header))?;
    let len: usize = len
        .parse()
        .with_context(|| format!("Invalid object length in header {:?}", header))?;

    let body = raw[nul + 1..].to_vec();
    if body.len() != len {
        anyhow::bail!(
            "Object length mismatch: header says {} bytes, got {}",
            len,
            body.len()
        );
    }

    Ok(RawObject {
        kind: kind.to_string(),
        body,
    })
}
