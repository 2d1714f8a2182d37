//! Mutable file set used while replaying history

use crate::patch::{self, PatchError};
use plunk_core::{Blob, Tree};
use std::collections::BTreeMap;

/// A single file: its path and text content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: String,
    pub content: String,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Path -> content map for one point in a record's history
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    files: BTreeMap<String, String>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a record's final file set; later duplicates win
    pub fn from_files<'a>(files: impl IntoIterator<Item = &'a FileEntry>) -> Self {
        Self {
            files: files
                .into_iter()
                .map(|f| (f.path.clone(), f.content.clone()))
                .collect(),
        }
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Iterate files in path order
    pub fn files(&self) -> impl Iterator<Item = FileEntry> + '_ {
        self.files
            .iter()
            .map(|(path, content)| FileEntry::new(path.as_str(), content.as_str()))
    }

    /// Insert (or replace) a file
    pub fn create(&mut self, path: impl Into<String>, content: impl Into<String>) {
        self.files.insert(path.into(), content.into());
    }

    /// Remove a file; missing paths are ignored
    pub fn remove(&mut self, path: &str) -> bool {
        self.files.remove(path).is_some()
    }

    /// Move a file's content to a new key; missing paths are ignored
    pub fn rename(&mut self, from: &str, to: &str) -> bool {
        match self.files.remove(from) {
            Some(content) => {
                self.files.insert(to.to_string(), content);
                true
            }
            None => false,
        }
    }

    /// Apply patch text to a file in place; missing paths are ignored
    pub fn patch(&mut self, path: &str, patch_text: &str) -> Result<bool, PatchError> {
        let Some(content) = self.files.get_mut(path) else {
            return Ok(false);
        };
        *content = patch::apply(patch_text, content)?;
        Ok(true)
    }

    /// Content-addressed tree of the current files
    pub fn to_tree(&self) -> Tree {
        Tree::from_blobs(
            self.files
                .iter()
                .map(|(path, content)| (path.as_str(), Blob::from_content(content.as_bytes()))),
        )
    }
}
