//! Tree representation for snapshot contents
//!
//! Paths are kept flat for lookups. For hashing, paths containing `/` are
//! nested into subtrees the way git lays them out, so identities match
//! `git write-tree` for the same files.

use crate::blob::Blob;
use crate::hash::{git, Sha1Hash};
use anyhow::Result;
use std::collections::BTreeMap;

/// Mode written for every file; legacy files carry no permission bits
pub const FILE_MODE: u32 = 0o100644;

/// Mode written for nested directories
pub const DIR_MODE: u32 = 0o40000;

/// Entry in a tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Unix permission bits (mode)
    pub mode: u32,
    /// Blob holding this entry's content
    pub blob: Blob,
}

impl Entry {
    /// Create a regular file entry
    pub fn file(blob: Blob) -> Self {
        Self {
            mode: FILE_MODE,
            blob,
        }
    }
}

/// A tree represents the complete file set at a point in time
///
/// Entries live in a `BTreeMap` so that serialization is always in path order;
/// two trees built from the same files in any order hash identically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    id: Sha1Hash,
    body: Vec<u8>,
    entries: BTreeMap<String, Entry>,
    /// Directory trees below the root, innermost first
    subtrees: Vec<(Sha1Hash, Vec<u8>)>,
}

impl Tree {
    pub const KIND: &'static str = "tree";

    /// Build a tree from path -> blob pairs (`treeOf`)
    pub fn from_blobs<I, P>(blobs: I) -> Self
    where
        I: IntoIterator<Item = (P, Blob)>,
        P: Into<String>,
    {
        let entries = blobs
            .into_iter()
            .map(|(path, blob)| (path.into(), Entry::file(blob)))
            .collect();
        Self::from_entries(entries)
    }

    /// Build a tree straight from path -> content pairs
    pub fn from_files<I, P, C>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<Vec<u8>>,
    {
        Self::from_blobs(
            files
                .into_iter()
                .map(|(path, content)| (path, Blob::from_content(content))),
        )
    }

    /// Build a tree from already-formed entries
    pub fn from_entries(entries: BTreeMap<String, Entry>) -> Self {
        let split: Vec<(Vec<&str>, &Entry)> = entries
            .iter()
            .map(|(path, entry)| (components(path), entry))
            .collect();
        let level: Vec<(&[&str], &Entry)> = split
            .iter()
            .map(|(parts, entry)| (parts.as_slice(), *entry))
            .collect();

        let mut subtrees = Vec::new();
        let body = serialize_level(&level, &mut subtrees);
        let id = git::hash_object(Self::KIND, &body);
        Self {
            id,
            body,
            entries,
            subtrees,
        }
    }

    /// Object identity
    pub fn id(&self) -> Sha1Hash {
        self.id
    }

    /// Get an entry by path
    pub fn get(&self, path: &str) -> Option<&Entry> {
        self.entries.get(path)
    }

    /// Get the number of entries in the tree
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the tree is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in path order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.entries.iter().map(|(path, entry)| (path.as_str(), entry))
    }

    /// Iterate files (path and blob) in path order
    pub fn files(&self) -> impl Iterator<Item = (&str, &Blob)> {
        self.entries
            .iter()
            .map(|(path, entry)| (path.as_str(), &entry.blob))
    }

    /// Nested directory trees as (id, body), innermost first
    pub fn subtrees(&self) -> impl Iterator<Item = (Sha1Hash, &[u8])> {
        self.subtrees.iter().map(|(id, body)| (*id, body.as_slice()))
    }

    /// Serialize the root tree body (git tree format)
    ///
    /// Format, per entry in git order:
    /// - `<octal mode> <name>\0`
    /// - 20 raw bytes of the blob or subtree id
    pub fn serialize(&self) -> Vec<u8> {
        self.body.clone()
    }
}

/// Non-empty path segments; a path with none is kept whole
fn components(path: &str) -> Vec<&str> {
    let parts: Vec<&str> = path.split('/').filter(|part| !part.is_empty()).collect();
    if parts.is_empty() {
        vec![path]
    } else {
        parts
    }
}

struct LevelEntry<'a> {
    name: &'a str,
    mode: u32,
    id: Sha1Hash,
}

impl LevelEntry<'_> {
    /// git orders directories as if their name ended in `/`
    fn sort_key(&self) -> Vec<u8> {
        let mut key = self.name.as_bytes().to_vec();
        if self.mode == DIR_MODE {
            key.push(b'/');
        }
        key
    }
}

fn serialize_level(files: &[(&[&str], &Entry)], subtrees: &mut Vec<(Sha1Hash, Vec<u8>)>) -> Vec<u8> {
    let mut level = Vec::new();
    let mut dirs: BTreeMap<&str, Vec<(&[&str], &Entry)>> = BTreeMap::new();

    for &(parts, entry) in files {
        match parts {
            [name] => level.push(LevelEntry {
                name: *name,
                mode: entry.mode,
                id: entry.blob.id(),
            }),
            [dir, rest @ ..] => dirs.entry(*dir).or_default().push((rest, entry)),
            [] => {}
        }
    }

    for (name, children) in dirs {
        let body = serialize_level(&children, subtrees);
        let id = git::hash_object(Tree::KIND, &body);
        subtrees.push((id, body));
        level.push(LevelEntry {
            name,
            mode: DIR_MODE,
            id,
        });
    }
    level.sort_by_key(|entry| entry.sort_key());

    let mut bytes = Vec::new();
    for entry in level {
        bytes.extend_from_slice(format!("{:o} {}\0", entry.mode, entry.name).as_bytes());
        bytes.extend_from_slice(entry.id.as_bytes());
    }
    bytes
}

/// Parse a serialized tree body back into (mode, path, blob id) triples
pub fn parse_body(bytes: &[u8]) -> Result<Vec<(u32, String, Sha1Hash)>> {
    let mut entries = Vec::new();
    let mut offset = 0;

    while offset < bytes.len() {
        let space = bytes[offset..]
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| anyhow::anyhow!("Invalid tree data: missing mode separator"))?;
        let mode_str = std::str::from_utf8(&bytes[offset..offset + space])?;
        let mode = u32::from_str_radix(mode_str, 8)
            .map_err(|e| anyhow::anyhow!("Invalid tree mode {:?}: {}", mode_str, e))?;
        offset += space + 1;

        let nul = bytes[offset..]
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| anyhow::anyhow!("Invalid tree data: unterminated path"))?;
        let path = std::str::from_utf8(&bytes[offset..offset + nul])?.to_string();
        offset += nul + 1;

        if offset + 20 > bytes.len() {
            anyhow::bail!("Invalid tree data: truncated object id for {}", path);
        }
        let mut id = [0u8; 20];
        id.copy_from_slice(&bytes[offset..offset + 20]);
        offset += 20;

        entries.push((mode, path, Sha1Hash::from_bytes(id)));
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_get() {
        let tree = Tree::from_files([("index.html", "<h1>hi</h1>")]);
        assert_eq!(tree.len(), 1);
        let entry = tree.get("index.html").unwrap();
        assert_eq!(entry.mode, FILE_MODE);
        assert_eq!(entry.blob.content(), b"<h1>hi</h1>");
        assert!(tree.get("missing.js").is_none());
    }

    #[test]
    fn test_tree_hash_order_independent() {
        let tree1 = Tree::from_files([("a.txt", "content1"), ("b.txt", "content2")]);
        let tree2 = Tree::from_files([("b.txt", "content2"), ("a.txt", "content1")]);

        assert_eq!(tree1.id(), tree2.id());
        assert_eq!(tree1.serialize(), tree2.serialize());
    }

    #[test]
    fn test_tree_hash_different_content() {
        let tree1 = Tree::from_files([("file.txt", "content1")]);
        let tree2 = Tree::from_files([("file.txt", "content2")]);
        assert_ne!(tree1.id(), tree2.id());
    }

    #[test]
    fn test_tree_hash_depends_on_path() {
        let tree1 = Tree::from_files([("old.js", "same")]);
        let tree2 = Tree::from_files([("new.js", "same")]);
        assert_ne!(tree1.id(), tree2.id());
    }

    #[test]
    fn test_empty_tree_matches_git() {
        // `git hash-object -t tree /dev/null`
        let tree = Tree::from_files(Vec::<(String, String)>::new());
        assert!(tree.is_empty());
        assert_eq!(tree.id().to_hex(), "4b825dc642cb6eb9a060e54bf8d69288fbee4904");
    }

    #[test]
    fn test_tree_body_parses_back() -> Result<()> {
        let tree = Tree::from_files([("app.js", "one"), ("README.md", "two")]);
        let parsed = parse_body(&tree.serialize())?;

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].1, "README.md");
        assert_eq!(parsed[0].2, tree.get("README.md").unwrap().blob.id());
        assert_eq!(parsed[1].0, FILE_MODE);
        assert_eq!(parsed[1].1, "app.js");
        assert_eq!(tree.subtrees().count(), 0);
        Ok(())
    }

    #[test]
    fn test_slashed_paths_nest_into_subtrees() -> Result<()> {
        let tree = Tree::from_files([
            ("src/lib/util.js", "util"),
            ("src/main.js", "main"),
            ("src.js", "flat"),
        ]);

        // Lookups stay flat
        assert_eq!(tree.get("src/main.js").unwrap().blob.content(), b"main");
        assert_eq!(tree.len(), 3);

        let root = parse_body(&tree.serialize())?;
        let names: Vec<_> = root.iter().map(|(_, name, _)| name.as_str()).collect();
        // "src.js" sorts before the "src/" directory
        assert_eq!(names, vec!["src.js", "src"]);
        assert_eq!(root[1].0, DIR_MODE);

        let subtrees: Vec<_> = tree.subtrees().collect();
        assert_eq!(subtrees.len(), 2);
        let (src_id, src_body) = subtrees[1];
        assert_eq!(src_id, root[1].2);
        let src = parse_body(src_body)?;
        assert_eq!(src[0].0, DIR_MODE);
        assert_eq!(src[0].1, "lib");
        assert_eq!(src[0].2, subtrees[0].0);
        assert_eq!(src[1].1, "main.js");
        Ok(())
    }

    #[test]
    fn test_leading_slash_is_ignored() {
        let rooted = Tree::from_files([("/index.html", "x")]);
        let plain = Tree::from_files([("index.html", "x")]);
        assert_eq!(rooted.id(), plain.id());
    }

    #[test]
    fn test_parse_body_rejects_truncated_id() {
        let mut body = b"100644 a.txt\0".to_vec();
        body.extend_from_slice(&[1u8; 7]);
        assert!(parse_body(&body).is_err());
    }

    #[test]
    fn test_files_in_path_order() {
        let tree = Tree::from_files([("z.css", "z"), ("a.js", "a"), ("m.html", "m")]);
        let paths: Vec<_> = tree.files().map(|(path, _)| path).collect();
        assert_eq!(paths, vec!["a.js", "m.html", "z.css"]);
    }
}
