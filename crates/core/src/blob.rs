//! Blob objects: the content of a single file

use crate::hash::{git, Sha1Hash};

/// A blob holds one file's contents, identified by the git hash of that content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    /// Content hash (git blob hash)
    id: Sha1Hash,
    /// Raw file content
    content: Vec<u8>,
}

impl Blob {
    pub const KIND: &'static str = "blob";

    /// Create a blob from file content (`blobOf`)
    pub fn from_content(content: impl Into<Vec<u8>>) -> Self {
        let content = content.into();
        let id = git::hash_blob(&content);
        Self { id, content }
    }

    /// Object identity
    pub fn id(&self) -> Sha1Hash {
        self.id
    }

    /// Raw content
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Content as text, replacing invalid UTF-8
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }

    /// Object body (for blobs, the content itself)
    pub fn body(&self) -> &[u8] {
        &self.content
    }

    /// Size of the content in bytes
    pub fn size(&self) -> usize {
        self.content.len()
    }
}
