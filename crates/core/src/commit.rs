//! Commit objects: a tree plus lineage

use crate::blob::Blob;
use crate::hash::{git, Sha1Hash};
use crate::tree::Tree;
use anyhow::Result;

/// A commit links a tree to its parent commit
///
/// The body carries no timestamps, so identity is a pure function of
/// tree, message, author and parents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    id: Sha1Hash,
    tree: Tree,
    message: String,
    author: String,
    parents: Vec<Sha1Hash>,
}

/// Fields of a commit body read back from storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitHeader {
    pub tree: Sha1Hash,
    pub parents: Vec<Sha1Hash>,
    pub author: String,
    pub message: String,
}

impl Commit {
    pub const KIND: &'static str = "commit";

    /// Create a commit (`commitOf`)
    pub fn new(
        tree: Tree,
        message: impl Into<String>,
        author: impl Into<String>,
        parents: Vec<Sha1Hash>,
    ) -> Self {
        let message = message.into();
        let author = author.into();
        let body = serialize_body(tree.id(), &message, &author, &parents);
        let id = git::hash_object(Self::KIND, &body);
        Self {
            id,
            tree,
            message,
            author,
            parents,
        }
    }

    /// Object identity
    pub fn id(&self) -> Sha1Hash {
        self.id
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn parents(&self) -> &[Sha1Hash] {
        &self.parents
    }

    /// Serialize the commit body
    pub fn serialize(&self) -> Vec<u8> {
        serialize_body(self.tree.id(), &self.message, &self.author, &self.parents)
    }

    /// Every object this commit introduces: blobs, subtrees, its tree and itself
    pub fn objects(&self) -> Vec<(Sha1Hash, &'static str, Vec<u8>)> {
        let mut objects: Vec<(Sha1Hash, &'static str, Vec<u8>)> = self
            .tree
            .files()
            .map(|(_, blob)| (blob.id(), Blob::KIND, blob.body().to_vec()))
            .collect();
        objects.extend(
            self.tree
                .subtrees()
                .map(|(id, body)| (id, Tree::KIND, body.to_vec())),
        );
        objects.push((self.tree.id(), Tree::KIND, self.tree.serialize()));
        objects.push((self.id, Self::KIND, self.serialize()));
        objects
    }
}

fn serialize_body(tree: Sha1Hash, message: &str, author: &str, parents: &[Sha1Hash]) -> Vec<u8> {
    let mut body = format!("tree {}\n", tree);
    for parent in parents {
        body.push_str(&format!("parent {}\n", parent));
    }
    body.push_str(&format!("author {}\ncommitter {}\n\n{}\n", author, author, message));
    body.into_bytes()
}

/// Parse a serialized commit body
pub fn parse_body(bytes: &[u8]) -> Result<CommitHeader> {
    let text = std::str::from_utf8(bytes)?;
    let (headers, message) = text
        .split_once("\n\n")
        .ok_or_else(|| anyhow::anyhow!("Invalid commit data: missing message separator"))?;

    let mut tree = None;
    let mut parents = Vec::new();
    let mut author = None;

    for line in headers.lines() {
        match line.split_once(' ') {
            Some(("tree", hex)) => tree = Some(Sha1Hash::from_hex(hex)?),
            Some(("parent", hex)) => parents.push(Sha1Hash::from_hex(hex)?),
            Some(("author", name)) => author = Some(name.to_string()),
            Some(("committer", _)) => {}
            _ => anyhow::bail!("Invalid commit header line: {:?}", line),
        }
    }

    Ok(CommitHeader {
        tree: tree.ok_or_else(|| anyhow::anyhow!("Invalid commit data: missing tree"))?,
        parents,
        author: author.ok_or_else(|| anyhow::anyhow!("Invalid commit data: missing author"))?,
        message: message.strip_suffix('\n').unwrap_or(message).to_string(),
    })
}
