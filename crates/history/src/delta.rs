//! Change deltas and revisions
//!
//! Legacy revisions store each change as three optional fields: `fn` (the
//! path before the change), `pn` (the path after) and `pl` (a patch or, for
//! new files, the initial content). The meaning is decided once here and
//! carried as a [`ChangeDelta`] from then on.

use serde::{Deserialize, Serialize};

/// A change as stored in the legacy history
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawChange {
    #[serde(rename = "fn", default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(rename = "pn", default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(rename = "pl", default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

/// One atomic edit within a revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeDelta {
    /// Insert a new file with the given content
    Create { path: String, content: String },
    /// Remove a file
    Delete { path: String },
    /// Move a file, keeping its content
    Rename { from: String, to: String },
    /// Patch a file in place
    Modify { path: String, patch: String },
    /// Patch a file, then move it
    RenameAndModify {
        from: String,
        to: String,
        patch: String,
    },
}

impl ChangeDelta {
    /// Classify a raw change; `None` for changes that do nothing
    ///
    /// An empty payload counts as absent, the way the legacy writer treated it.
    pub fn from_raw(raw: RawChange) -> Option<Self> {
        let payload = raw.payload.filter(|p| !p.is_empty());

        match (raw.from, raw.to) {
            (None, Some(path)) => Some(Self::Create {
                path,
                content: payload.unwrap_or_default(),
            }),
            (Some(path), None) => Some(Self::Delete { path }),
            (Some(from), Some(to)) => match payload {
                Some(patch) if from == to => Some(Self::Modify { path: from, patch }),
                Some(patch) => Some(Self::RenameAndModify { from, to, patch }),
                None if from != to => Some(Self::Rename { from, to }),
                None => None,
            },
            (None, None) => None,
        }
    }

    /// Path this delta reads or removes
    pub fn source_path(&self) -> &str {
        match self {
            Self::Create { path, .. } | Self::Delete { path } | Self::Modify { path, .. } => path,
            Self::Rename { from, .. } | Self::RenameAndModify { from, .. } => from,
        }
    }
}

/// One historical revision: the deltas that lead from it to its successor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Revision {
    pub changes: Vec<ChangeDelta>,
}

impl Revision {
    pub fn new(changes: Vec<ChangeDelta>) -> Self {
        Self { changes }
    }

    /// Build a revision from stored changes, dropping no-ops
    pub fn from_raw(changes: impl IntoIterator<Item = RawChange>) -> Self {
        Self {
            changes: changes.into_iter().filter_map(ChangeDelta::from_raw).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Order in which stored revisions are replayed
///
/// History is stored newest-first; replay walks it oldest-first.
pub fn replay_order(history: &[Revision]) -> impl Iterator<Item = (usize, &Revision)> {
    history.iter().enumerate().rev()
}
