//! SHA-1 hashing primitives for content-addressed objects

use anyhow::Result;
use sha1::{Digest, Sha1};

/// A SHA-1 object identity (20 bytes)
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Sha1Hash([u8; 20]);

impl Sha1Hash {
    /// Create a new Sha1Hash from bytes
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Get the hash as a byte slice
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Convert to lowercase hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        if hex_str.len() != 40 {
            anyhow::bail!(
                "Invalid hex length: expected 40 characters, got {}",
                hex_str.len()
            );
        }

        let mut bytes = [0u8; 20];
        hex::decode_to_slice(hex_str, &mut bytes)
            .map_err(|e| anyhow::anyhow!("Invalid hex string {:?}: {}", hex_str, e))?;
        Ok(Self(bytes))
    }
}

impl std::fmt::Debug for Sha1Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sha1Hash({})", self.to_hex())
    }
}

impl std::fmt::Display for Sha1Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Incremental hasher for building hashes across multiple chunks
pub struct IncrementalHasher {
    inner: Sha1,
}

impl IncrementalHasher {
    /// Create a new incremental hasher
    pub fn new() -> Self {
        Self { inner: Sha1::new() }
    }

    /// Update the hash with more data
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Finalize and return the hash
    pub fn finalize(self) -> Sha1Hash {
        Sha1Hash::from_bytes(self.inner.finalize().into())
    }
}

impl Default for IncrementalHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Git loose-object hashing: `sha1("<kind> <len>\0" + body)`
pub mod git {
    use super::{IncrementalHasher, Sha1Hash};

    /// Object header as written in front of the body
    pub fn header(kind: &str, len: usize) -> Vec<u8> {
        format!("{} {}\0", kind, len).into_bytes()
    }

    /// Hash an object body of the given kind
    pub fn hash_object(kind: &str, body: &[u8]) -> Sha1Hash {
        let mut hasher = IncrementalHasher::new();
        hasher.update(&header(kind, body.len()));
        hasher.update(body);
        hasher.finalize()
    }

    /// Hash file content the way `git hash-object` does
    pub fn hash_blob(content: &[u8]) -> Sha1Hash {
        hash_object("blob", content)
    }
}
