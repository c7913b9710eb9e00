//! Key-level diff between two resource snapshots.

use crate::resource::{ResourceCodec, ResourceEntry, ResourceMap};
use crate::store::manifest::BackupRecord;
use crate::utils::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeType {
    Added,
    Deleted,
    Modified,
    Unchanged,
    CommentChanged,
}

/// One classified key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub key: String,
    pub change_type: ChangeType,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub old_comment: Option<String>,
    pub new_comment: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffStatistics {
    pub added: usize,
    pub deleted: usize,
    pub modified: usize,
    pub comment_changed: usize,
    /// Counted even when unchanged keys are left out of the change list
    pub unchanged: usize,
    /// Everything except unchanged
    pub total_changes: usize,
}

impl DiffStatistics {
    fn record(&mut self, change_type: ChangeType) {
        match change_type {
            ChangeType::Added => self.added += 1,
            ChangeType::Deleted => self.deleted += 1,
            ChangeType::Modified => self.modified += 1,
            ChangeType::CommentChanged => self.comment_changed += 1,
            ChangeType::Unchanged => self.unchanged += 1,
        }
        if change_type != ChangeType::Unchanged {
            self.total_changes += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResult {
    /// Version on the "old" side
    pub old_version: Option<u32>,
    /// Version on the "new" side; `None` for the live file
    pub new_version: Option<u32>,
    pub changes: Vec<Change>,
    pub statistics: DiffStatistics,
}

impl DiffResult {
    pub fn has_changes(&self) -> bool {
        self.statistics.total_changes > 0
    }

    /// e.g. `v3 -> current: 2 added, 1 deleted, 0 modified, 1 comment changed`
    pub fn summary(&self) -> String {
        let side = |v: Option<u32>| v.map(|v| format!("v{v}")).unwrap_or_else(|| "current".into());
        let s = &self.statistics;
        format!(
            "{} -> {}: {} added, {} deleted, {} modified, {} comment changed",
            side(self.old_version),
            side(self.new_version),
            s.added,
            s.deleted,
            s.modified,
            s.comment_changed
        )
    }
}

/// Classify every key of `old` and `new`.
///
/// Keys come out in `old`'s order, followed by keys only present in `new`
/// in `new`'s order.
pub fn diff_maps(old: &ResourceMap, new: &ResourceMap, include_unchanged: bool) -> (Vec<Change>, DiffStatistics) {
    let mut changes = Vec::new();
    let mut stats = DiffStatistics::default();

    for before in old.iter() {
        let change = match new.get(&before.key) {
            None => Change {
                key: before.key.clone(),
                change_type: ChangeType::Deleted,
                old_value: Some(before.value.clone()),
                new_value: None,
                old_comment: before.comment.clone(),
                new_comment: None,
            },
            Some(after) => both_sides(before, after),
        };

        stats.record(change.change_type);
        if include_unchanged || change.change_type != ChangeType::Unchanged {
            changes.push(change);
        }
    }

    for after in new.iter().filter(|e| !old.contains_key(&e.key)) {
        stats.record(ChangeType::Added);
        changes.push(Change {
            key: after.key.clone(),
            change_type: ChangeType::Added,
            old_value: None,
            new_value: Some(after.value.clone()),
            old_comment: None,
            new_comment: after.comment.clone(),
        });
    }

    (changes, stats)
}

fn both_sides(before: &ResourceEntry, after: &ResourceEntry) -> Change {
    let change_type = if before.value != after.value {
        ChangeType::Modified
    } else if before.comment != after.comment {
        ChangeType::CommentChanged
    } else {
        ChangeType::Unchanged
    };

    Change {
        key: before.key.clone(),
        change_type,
        old_value: Some(before.value.clone()),
        new_value: Some(after.value.clone()),
        old_comment: before.comment.clone(),
        new_comment: after.comment.clone(),
    }
}

/// Loads resource files through a codec and diffs them.
#[derive(Clone)]
pub struct DiffEngine {
    codec: Arc<dyn ResourceCodec>,
}

impl DiffEngine {
    pub fn new(codec: Arc<dyn ResourceCodec>) -> Self {
        Self { codec }
    }

    /// Diff two stored versions, `version_a` being the old side.
    pub async fn compare(
        &self,
        version_a: &BackupRecord,
        version_b: &BackupRecord,
        file_a: &Path,
        file_b: &Path,
        include_unchanged: bool,
    ) -> Result<DiffResult> {
        let old = self.load(file_a).await?;
        let new = self.load(file_b).await?;
        let (changes, statistics) = diff_maps(&old, &new, include_unchanged);

        Ok(DiffResult {
            old_version: Some(version_a.version),
            new_version: Some(version_b.version),
            changes,
            statistics,
        })
    }

    /// Diff a stored version (old side) against the live file (new side).
    pub async fn compare_with_current(
        &self,
        backup: &BackupRecord,
        backup_file: &Path,
        current_file: &Path,
        include_unchanged: bool,
    ) -> Result<DiffResult> {
        let old = self.load(backup_file).await?;
        let new = self.load(current_file).await?;
        let (changes, statistics) = diff_maps(&old, &new, include_unchanged);

        Ok(DiffResult {
            old_version: Some(backup.version),
            new_version: None,
            changes,
            statistics,
        })
    }

    async fn load(&self, path: &Path) -> Result<ResourceMap> {
        let codec = self.codec.clone();
        let path: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || codec.parse(&path)).await?
    }
}
