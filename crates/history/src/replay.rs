//! History reconstruction
//!
//! Turns a legacy record (its final files plus delta-encoded revisions) into
//! a linear chain of content-addressed commits in the object store.
//!
//! Replay walks revisions oldest-first. For each revision, the current file
//! set is committed *before* the revision's deltas are applied, and a commit
//! is only emitted when the tree differs from the previous commit's tree.

use crate::delta::{replay_order, ChangeDelta, Revision};
use crate::error::HistoryError;
use crate::snapshot::{FileEntry, Snapshot};
use plunk_core::{Commit, ObjectStore, StagedObjects, Tree};
use std::sync::Arc;

/// Message of the first commit in every chain
pub const INITIAL_MESSAGE: &str = "Initial commit";

/// Everything the engine needs from one record
#[derive(Debug, Clone, Copy)]
pub struct RecordInput<'a> {
    pub id: &'a str,
    pub author: &'a str,
    /// Final file set
    pub files: &'a [FileEntry],
    /// Revisions, newest first
    pub history: &'a [Revision],
}

/// Result of reconstructing one record
#[derive(Debug, Clone)]
pub struct Reconstruction {
    /// Last emitted commit
    pub commit: Commit,
    /// Number of commits emitted
    pub revision_count: usize,
    /// File set after every revision's deltas were applied
    pub snapshot: Snapshot,
}

/// Rebuilds commit chains and persists their objects
///
/// Holds no per-record state; one instance serves a whole run.
#[derive(Clone)]
pub struct Reconstructor {
    store: Arc<ObjectStore>,
}

impl Reconstructor {
    pub fn new(store: Arc<ObjectStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<ObjectStore> {
        &self.store
    }

    /// Reconstruct a record's history and flush its objects
    ///
    /// Objects are staged in a buffer owned by this call. On failure the
    /// buffer is dropped, so nothing of this record reaches durable storage
    /// and other records sharing the store are unaffected.
    pub fn reconstruct(&self, input: &RecordInput<'_>) -> Result<Reconstruction, HistoryError> {
        let (reconstruction, staged) = self.replay(input)?;
        self.store
            .flush(staged)
            .map_err(|source| HistoryError::Store {
                record_id: input.id.to_string(),
                source,
            })?;
        Ok(reconstruction)
    }

    fn replay(
        &self,
        input: &RecordInput<'_>,
    ) -> Result<(Reconstruction, StagedObjects), HistoryError> {
        let mut snapshot = Snapshot::from_files(input.files);
        let mut chain = Chain::new(input, &self.store);

        if input.history.is_empty() {
            chain.commit(snapshot.to_tree())?;
        }

        for (index, revision) in replay_order(input.history) {
            chain.commit_if_changed(snapshot.to_tree())?;
            apply_revision(&mut snapshot, revision).map_err(|(path, source)| {
                HistoryError::Patch {
                    record_id: input.id.to_string(),
                    revision: index,
                    path,
                    source,
                }
            })?;
        }

        let (commit, revision_count, staged) = chain.finish()?;
        tracing::debug!(
            record = input.id,
            revisions = revision_count,
            commit = %commit.id(),
            "Reconstructed history"
        );

        Ok((
            Reconstruction {
                commit,
                revision_count,
                snapshot,
            },
            staged,
        ))
    }
}

/// Commits emitted so far for one record
struct Chain<'a> {
    input: &'a RecordInput<'a>,
    store: &'a ObjectStore,
    staged: StagedObjects,
    last: Option<Commit>,
    count: usize,
}

impl<'a> Chain<'a> {
    fn new(input: &'a RecordInput<'a>, store: &'a ObjectStore) -> Self {
        Self {
            input,
            store,
            staged: StagedObjects::new(),
            last: None,
            count: 0,
        }
    }

    fn commit_if_changed(&mut self, tree: Tree) -> Result<(), HistoryError> {
        match &self.last {
            Some(last) if last.tree().id() == tree.id() => Ok(()),
            _ => self.commit(tree),
        }
    }

    fn commit(&mut self, tree: Tree) -> Result<(), HistoryError> {
        let message = if self.count == 0 {
            INITIAL_MESSAGE.to_string()
        } else {
            format!("Revision {}", self.count)
        };
        let parents = self.last.iter().map(Commit::id).collect();
        let commit = Commit::new(tree, message, self.input.author, parents);

        self.store
            .save_commit(&mut self.staged, &commit)
            .map_err(|source| HistoryError::Store {
                record_id: self.input.id.to_string(),
                source,
            })?;

        self.last = Some(commit);
        self.count += 1;
        Ok(())
    }

    fn finish(self) -> Result<(Commit, usize, StagedObjects), HistoryError> {
        match self.last {
            Some(commit) => Ok((commit, self.count, self.staged)),
            None => Err(HistoryError::Store {
                record_id: self.input.id.to_string(),
                source: anyhow::anyhow!("no commit was emitted"),
            }),
        }
    }
}

fn apply_revision(
    snapshot: &mut Snapshot,
    revision: &Revision,
) -> Result<(), (String, crate::patch::PatchError)> {
    for change in &revision.changes {
        match change {
            ChangeDelta::Create { path, content } => snapshot.create(path.as_str(), content.as_str()),
            ChangeDelta::Delete { path } => {
                snapshot.remove(path);
            }
            ChangeDelta::Rename { from, to } => {
                snapshot.rename(from, to);
            }
            ChangeDelta::Modify { path, patch } => {
                snapshot.patch(path, patch).map_err(|e| (path.clone(), e))?;
            }
            ChangeDelta::RenameAndModify { from, to, patch } => {
                snapshot.patch(from, patch).map_err(|e| (from.clone(), e))?;
                snapshot.rename(from, to);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::PatchError;
    use plunk_core::BloomFilter;

    fn reconstructor(dir: &std::path::Path) -> anyhow::Result<Reconstructor> {
        let store = ObjectStore::open(&dir.join("objects"), BloomFilter::new(1 << 16, 8))?;
        Ok(Reconstructor::new(Arc::new(store)))
    }

    fn input<'a>(files: &'a [FileEntry], history: &'a [Revision]) -> RecordInput<'a> {
        RecordInput {
            id: "abc123",
            author: "alice",
            files,
            history,
        }
    }

    #[test]
    fn test_no_history_emits_single_root_commit() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let engine = reconstructor(temp_dir.path())?;
        let files = [FileEntry::new("index.html", "<h1>hi</h1>")];

        let result = engine.reconstruct(&input(&files, &[]))?;

        assert_eq!(result.revision_count, 1);
        assert_eq!(result.commit.message(), INITIAL_MESSAGE);
        assert!(result.commit.parents().is_empty());
        assert!(engine.store().contains_durable(&result.commit.id())?);
        Ok(())
    }

    #[test]
    fn test_revisions_form_linear_chain() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let engine = reconstructor(temp_dir.path())?;
        let files = [FileEntry::new("a.js", "v3")];
        let history = [
            Revision::new(vec![ChangeDelta::Modify {
                path: "a.js".into(),
                patch: "@@ -1,2 +1,2 @@\n v\n-2\n+1\n".into(),
            }]),
            Revision::new(vec![ChangeDelta::Modify {
                path: "a.js".into(),
                patch: "@@ -1,2 +1,2 @@\n v\n-3\n+2\n".into(),
            }]),
        ];

        let result = engine.reconstruct(&input(&files, &history))?;

        assert_eq!(result.revision_count, 2);
        assert_eq!(result.commit.message(), "Revision 1");
        assert_eq!(result.snapshot.get("a.js"), Some("v1"));

        let parent = result.commit.parents()[0];
        let stored = engine.store().get(&parent)?.unwrap();
        let header = plunk_core::commit::parse_body(&stored.body)?;
        assert_eq!(header.message, INITIAL_MESSAGE);
        assert!(header.parents.is_empty());
        Ok(())
    }

    #[test]
    fn test_unchanged_steps_collapse() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let engine = reconstructor(temp_dir.path())?;
        let files = [FileEntry::new("a.js", "same")];
        // Renaming a missing file leaves the snapshot untouched
        let history = [
            Revision::new(vec![ChangeDelta::Rename {
                from: "ghost.js".into(),
                to: "b.js".into(),
            }]),
            Revision::new(vec![ChangeDelta::Delete {
                path: "ghost.js".into(),
            }]),
        ];

        let result = engine.reconstruct(&input(&files, &history))?;
        assert_eq!(result.revision_count, 1);
        assert_eq!(result.commit.message(), INITIAL_MESSAGE);
        Ok(())
    }

    #[test]
    fn test_failed_patch_reports_record_and_revision() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let engine = reconstructor(temp_dir.path())?;
        let files = [FileEntry::new("a.js", "unexpected")];
        let history = [Revision::new(vec![ChangeDelta::Modify {
            path: "a.js".into(),
            patch: "@@ -1,2 +1,2 @@\n v\n-3\n+2\n".into(),
        }])];

        let err = engine.reconstruct(&input(&files, &history)).unwrap_err();
        match &err {
            HistoryError::Patch {
                record_id,
                revision,
                path,
                source,
            } => {
                assert_eq!(record_id, "abc123");
                assert_eq!(*revision, 0);
                assert_eq!(path, "a.js");
                assert!(matches!(source, PatchError::HunkMismatch { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }

        // The commit staged before the failure never reached storage
        let tree = Tree::from_files([("a.js", "unexpected")]);
        assert!(!engine.store().contains_durable(&tree.id())?);
        Ok(())
    }

    #[test]
    fn test_failed_record_does_not_hide_shared_content() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let engine = reconstructor(temp_dir.path())?;
        let files = [FileEntry::new("a.js", "unexpected")];
        let broken = [Revision::new(vec![ChangeDelta::Modify {
            path: "a.js".into(),
            patch: "@@ -1,2 +1,2 @@\n v\n-3\n+2\n".into(),
        }])];

        assert!(engine.reconstruct(&input(&files, &broken)).is_err());
        let result = engine.reconstruct(&RecordInput {
            id: "def456",
            ..input(&files, &[])
        })?;

        for (id, _, _) in result.commit.objects() {
            assert!(engine.store().contains_durable(&id)?, "missing {}", id);
        }
        Ok(())
    }

    #[test]
    fn test_concurrent_records_are_isolated() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let engine = reconstructor(temp_dir.path())?;

        let good_files = [FileEntry::new("good.js", "fine")];
        let bad_files = [FileEntry::new("bad.js", "unexpected")];
        let bad_history = [Revision::new(vec![ChangeDelta::Modify {
            path: "bad.js".into(),
            patch: "@@ -1,2 +1,2 @@\n v\n-3\n+2\n".into(),
        }])];

        let (good, bad) = std::thread::scope(|scope| {
            let good = scope.spawn(|| engine.reconstruct(&input(&good_files, &[])));
            let bad = scope.spawn(|| engine.reconstruct(&input(&bad_files, &bad_history)));
            (good.join(), bad.join())
        });

        let good = good.expect("worker panicked")?;
        assert!(bad.expect("worker panicked").is_err());
        for (id, _, _) in good.commit.objects() {
            assert!(engine.store().contains_durable(&id)?);
        }
        assert!(!engine
            .store()
            .contains_durable(&Tree::from_files([("bad.js", "unexpected")]).id())?);
        Ok(())
    }

    #[test]
    fn test_rename_and_modify_patches_old_path() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let engine = reconstructor(temp_dir.path())?;
        let files = [FileEntry::new("new.js", "v2")];
        let history = [Revision::new(vec![ChangeDelta::RenameAndModify {
            from: "new.js".into(),
            to: "old.js".into(),
            patch: "@@ -1,2 +1,2 @@\n v\n-2\n+1\n".into(),
        }])];

        let result = engine.reconstruct(&input(&files, &history))?;
        assert_eq!(result.snapshot.get("old.js"), Some("v1"));
        assert!(!result.snapshot.contains("new.js"));
        Ok(())
    }
}
