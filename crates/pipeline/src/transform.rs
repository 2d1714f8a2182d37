//! Legacy record -> migrated document

use crate::record::{LegacyRecord, MigratedRecord, PUBLIC_COLLECTION};
use plunk_history::{
    find_readme, scan, FileEntry, HistoryError, Reconstructor, RecordInput, Revision,
};

/// Author recorded on commits of records without an owner
pub const ANONYMOUS_AUTHOR: &str = "anonymous";

/// Rebuild a record's history and project it into an index document
pub fn transform(
    reconstructor: &Reconstructor,
    record: &LegacyRecord,
) -> Result<MigratedRecord, HistoryError> {
    let files: Vec<FileEntry> = record
        .files
        .iter()
        .map(|f| FileEntry::new(f.filename.as_str(), f.content.as_str()))
        .collect();
    let history: Vec<Revision> = record
        .history
        .iter()
        .map(|rev| Revision::from_raw(rev.changes.iter().cloned()))
        .collect();

    let reconstruction = reconstructor.reconstruct(&RecordInput {
        id: &record.id,
        author: record.user.as_deref().unwrap_or(ANONYMOUS_AUTHOR),
        files: &files,
        history: &history,
    })?;

    let tree = reconstruction.commit.tree();
    let collections = if record.private {
        Vec::new()
    } else {
        vec![PUBLIC_COLLECTION.to_string()]
    };

    Ok(MigratedRecord {
        id: record.id.clone(),
        fork_of: record.fork_of.clone(),
        title: record.description.clone(),
        readme: find_readme(tree).unwrap_or_default(),
        tags: unique(&record.tags),
        created_at: record.created_at,
        updated_at: record.updated_at,
        viewed_at: record.updated_at,
        deleted_at: None,
        user_id: record.user.clone(),
        session_id: None,
        packages: scan(tree),
        commit_sha: reconstruction.commit.id().to_hex(),
        tree_sha: tree.id().to_hex(),
        forks_count: record.forks.len() as u64,
        revisions_count: reconstruction.revision_count as u64,
        comments_count: 0,
        views_count: record.views,
        likes_count: record.thumbs,
        favorites_count: 0,
        collections,
        queued: Vec::new(),
    })
}

/// First occurrence of each tag, in order
fn unique(tags: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tags.iter()
        .filter(|tag| seen.insert(tag.as_str()))
        .cloned()
        .collect()
}
