//! Full and partial restore of a live resource file from a stored version.

use crate::diff::{DiffEngine, DiffResult};
use crate::fs::atomic::{commit_temp, replace_preserving_metadata, temp_path_for};
use crate::fs::metadata::FileMetadata;
use crate::resource::{ResourceCodec, ResourceMap};
use crate::store::manifest::BackupRecord;
use crate::store::BackupStore;
use crate::utils::{BackupError, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Operation label of the snapshot taken right before a restore.
pub const PRE_RESTORE_OPERATION: &str = "pre-restore";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreResult {
    pub file_name: String,
    pub restored_version: u32,
    /// Snapshot of the target taken before it was overwritten
    pub pre_restore_backup: Option<BackupRecord>,
    /// Keys copied from the backup (partial restores only)
    pub restored_keys: Vec<String>,
    /// Requested keys the backup does not contain (partial restores only)
    pub missing_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub message: Option<String>,
}

pub struct RestoreEngine {
    store: Arc<BackupStore>,
    codec: Arc<dyn ResourceCodec>,
    diff: DiffEngine,
}

impl RestoreEngine {
    pub fn new(store: Arc<BackupStore>) -> Self {
        let codec = store.codec();
        Self {
            diff: DiffEngine::new(codec.clone()),
            store,
            codec,
        }
    }

    /// Overwrite `target` with the exact bytes of `version`.
    pub async fn restore(
        &self,
        file_name: &str,
        version: u32,
        target: &Path,
        create_backup_before_restore: bool,
    ) -> Result<RestoreResult> {
        // Read first: the pre-restore backup may rotate `version` away
        let (record, content) = self.store.read_backup(file_name, version).await?;

        let pre_restore_backup = if create_backup_before_restore {
            self.pre_restore_backup(target).await?
        } else {
            None
        };

        replace_preserving_metadata(target, &content).await?;

        info!(
            file = %file_name,
            version = record.version,
            target = %target.display(),
            "Restored backup"
        );

        Ok(RestoreResult {
            file_name: file_name.to_string(),
            restored_version: record.version,
            pre_restore_backup,
            restored_keys: Vec::new(),
            missing_keys: Vec::new(),
        })
    }

    /// Copy only `keys` from `version` into `target`; every other entry of
    /// `target` is left as it is.
    pub async fn restore_keys<I, S>(
        &self,
        file_name: &str,
        version: u32,
        keys: I,
        target: &Path,
        create_backup_before_restore: bool,
    ) -> Result<RestoreResult>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: BTreeSet<String> = keys.into_iter().map(Into::into).collect();
        let (record, backup) = self.store.load_backup_map(file_name, version).await?;

        let pre_restore_backup = if create_backup_before_restore {
            self.pre_restore_backup(target).await?
        } else {
            None
        };

        let mut current = self.parse(target).await?;
        let (restored_keys, missing_keys) = merge_keys(&mut current, &backup, &keys);

        self.write_map(current, target).await?;

        info!(
            file = %file_name,
            version = record.version,
            restored = restored_keys.len(),
            missing = missing_keys.len(),
            "Restored keys from backup"
        );

        Ok(RestoreResult {
            file_name: file_name.to_string(),
            restored_version: record.version,
            pre_restore_backup,
            restored_keys,
            missing_keys,
        })
    }

    /// What a full restore of `version` would change in `current`. Read-only.
    pub async fn preview_restore(&self, file_name: &str, version: u32, current: &Path) -> Result<DiffResult> {
        let record = self
            .store
            .get_backup(file_name, version)
            .await?
            .ok_or_else(|| BackupError::version_not_found(file_name, version))?;
        let backup_file = self.store.backup_file_path(file_name, version)?;

        self.diff
            .compare_with_current(&record, &backup_file, current, false)
            .await
    }

    /// Whether `version` exists. Does not inspect `file_path`.
    pub async fn validate_restore(&self, file_name: &str, version: u32, file_path: &Path) -> Result<ValidationResult> {
        debug!("Validating restore of {} v{} onto {}", file_name, version, file_path.display());

        match self.store.get_backup(file_name, version).await {
            Ok(Some(_)) => Ok(ValidationResult {
                is_valid: true,
                message: None,
            }),
            Ok(None) => Ok(ValidationResult {
                is_valid: false,
                message: Some(format!("Backup version {version} not found for {file_name}")),
            }),
            Err(e @ BackupError::InvalidFileName(_)) => Ok(ValidationResult {
                is_valid: false,
                message: Some(e.to_string()),
            }),
            Err(e) if e.is_not_found() => Ok(ValidationResult {
                is_valid: false,
                message: Some(e.to_string()),
            }),
            Err(e) => Err(e),
        }
    }

    async fn pre_restore_backup(&self, target: &Path) -> Result<Option<BackupRecord>> {
        if !tokio::fs::try_exists(target).await? {
            debug!("No pre-restore backup: {} does not exist", target.display());
            return Ok(None);
        }
        let record = self.store.create_backup(target, PRE_RESTORE_OPERATION).await?;
        Ok(Some(record))
    }

    async fn parse(&self, path: &Path) -> Result<ResourceMap> {
        let codec = self.codec.clone();
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || codec.parse(&path)).await?
    }

    /// Serialize into a temp file beside `target`, then rename it into place.
    async fn write_map(&self, map: ResourceMap, target: &Path) -> Result<()> {
        let tmp = temp_path_for(target)?;
        let metadata = FileMetadata::from_path(target).ok();

        let codec = self.codec.clone();
        let tmp_path = tmp.clone();
        let serialized = tokio::task::spawn_blocking(move || codec.serialize(&map, &tmp_path)).await?;
        if let Err(e) = serialized {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }

        commit_temp(&tmp, target, metadata.as_ref()).await?;
        Ok(())
    }
}

/// Overwrite each of `keys` in `current` with the backup's entry.
/// Returns (restored, missing-from-backup).
fn merge_keys(current: &mut ResourceMap, backup: &ResourceMap, keys: &BTreeSet<String>) -> (Vec<String>, Vec<String>) {
    let mut restored = Vec::new();
    let mut missing = Vec::new();

    for key in keys {
        match backup.get(key) {
            Some(entry) => {
                current.insert(entry.clone());
                restored.push(key.clone());
            }
            None => missing.push(key.clone()),
        }
    }

    (restored, missing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{JsonResourceCodec, ResourceEntry};
    use crate::rotation::RotationPolicy;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct Fixture {
        _work: TempDir,
        _backups: TempDir,
        target: PathBuf,
        store: Arc<BackupStore>,
        engine: RestoreEngine,
    }

    fn fixture(initial: &str) -> Fixture {
        fixture_with_policy(initial, RotationPolicy::default())
    }

    fn fixture_with_policy(initial: &str, policy: RotationPolicy) -> Fixture {
        let work = TempDir::new().unwrap();
        let backups = TempDir::new().unwrap();
        let target = work.path().join("Strings.json");
        fs::write(&target, initial).unwrap();

        let store = Arc::new(BackupStore::new(
            backups.path(),
            policy,
            Arc::new(JsonResourceCodec::new()),
        ));
        let engine = RestoreEngine::new(store.clone());
        Fixture {
            _work: work,
            _backups: backups,
            target,
            store,
            engine,
        }
    }

    fn read_map(path: &Path) -> ResourceMap {
        JsonResourceCodec::new().parse(path).unwrap()
    }

    #[tokio::test]
    async fn test_full_restore_is_byte_identical() {
        let original = "{\n  \"Key1\": \"Value1\",\n  \"Key2\": {\"value\": \"Value2\", \"comment\": \"c\"}\n}\n";
        let f = fixture(original);
        f.store.create_backup(&f.target, "edit").await.unwrap();

        fs::write(&f.target, r#"{"Key1": "Changed"}"#).unwrap();

        let result = f.engine.restore("Strings.json", 1, &f.target, false).await.unwrap();

        assert_eq!(result.restored_version, 1);
        assert!(result.pre_restore_backup.is_none());
        assert_eq!(fs::read_to_string(&f.target).unwrap(), original);
    }

    #[tokio::test]
    async fn test_restore_takes_pre_restore_backup() {
        let f = fixture(r#"{"Key1": "Value1"}"#);
        f.store.create_backup(&f.target, "edit").await.unwrap();
        fs::write(&f.target, r#"{"Key1": "Edited"}"#).unwrap();

        let result = f.engine.restore("Strings.json", 1, &f.target, true).await.unwrap();

        let pre = result.pre_restore_backup.unwrap();
        assert_eq!(pre.version, 2);
        assert_eq!(pre.operation, PRE_RESTORE_OPERATION);
        let saved = fs::read_to_string(f.store.backup_file_path("Strings.json", 2).unwrap()).unwrap();
        assert_eq!(saved, r#"{"Key1": "Edited"}"#);
        assert_eq!(fs::read_to_string(&f.target).unwrap(), r#"{"Key1": "Value1"}"#);
    }

    #[tokio::test]
    async fn test_restore_survives_rotation_of_its_own_version() {
        let f = fixture_with_policy(r#"{"A": "v1"}"#, RotationPolicy::cap_only(1));
        f.store.create_backup(&f.target, "edit").await.unwrap();
        fs::write(&f.target, r#"{"A": "edited"}"#).unwrap();

        // The pre-restore backup pushes version 1 out of a one-slot history
        f.engine.restore("Strings.json", 1, &f.target, true).await.unwrap();

        assert_eq!(fs::read_to_string(&f.target).unwrap(), r#"{"A": "v1"}"#);
        let versions: Vec<_> = f
            .store
            .list_backups("Strings.json")
            .await
            .unwrap()
            .iter()
            .map(|r| r.version)
            .collect();
        assert_eq!(versions, vec![2]);
    }

    #[tokio::test]
    async fn test_restore_unknown_version_is_not_found() {
        let f = fixture(r#"{"A": "1"}"#);
        f.store.create_backup(&f.target, "edit").await.unwrap();

        let err = f.engine.restore("Strings.json", 42, &f.target, true).await.unwrap_err();
        assert!(matches!(err, BackupError::VersionNotFound { version: 42, .. }));
        // Nothing was snapshotted for the failed attempt
        assert_eq!(f.store.list_backups("Strings.json").await.unwrap().len(), 1);

        let err = f
            .engine
            .restore_keys("Strings.json", 42, ["A"], &f.target, false)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_restore_refuses_tampered_payload() {
        let f = fixture(r#"{"A": "1"}"#);
        f.store.create_backup(&f.target, "edit").await.unwrap();
        fs::write(f.store.backup_file_path("Strings.json", 1).unwrap(), r#"{"A": "evil"}"#).unwrap();
        fs::write(&f.target, r#"{"A": "live"}"#).unwrap();

        let err = f.engine.restore("Strings.json", 1, &f.target, false).await.unwrap_err();

        assert!(matches!(err, BackupError::IntegrityMismatch { .. }));
        assert_eq!(fs::read_to_string(&f.target).unwrap(), r#"{"A": "live"}"#);
    }

    #[tokio::test]
    async fn test_restore_keys_only_touches_selected_keys() {
        let f = fixture(r#"{"Key1": "Old1", "Key2": {"value": "Old2", "comment": "was"}, "Key3": "Old3"}"#);
        f.store.create_backup(&f.target, "edit").await.unwrap();

        fs::write(
            &f.target,
            r#"{"Key1": "New1", "Key2": "New2", "Key3": "New3", "Key4": "OnlyLive"}"#,
        )
        .unwrap();

        let result = f
            .engine
            .restore_keys("Strings.json", 1, ["Key2", "Key4"], &f.target, false)
            .await
            .unwrap();

        assert_eq!(result.restored_keys, vec!["Key2"]);
        assert_eq!(result.missing_keys, vec!["Key4"]);

        let restored = read_map(&f.target);
        assert_eq!(restored.keys().collect::<Vec<_>>(), vec!["Key1", "Key2", "Key3", "Key4"]);
        assert_eq!(restored.get("Key1").unwrap().value, "New1");
        assert_eq!(
            restored.get("Key2").unwrap(),
            &ResourceEntry::new("Key2", "Old2").with_comment("was")
        );
        assert_eq!(restored.get("Key3").unwrap().value, "New3");
        assert_eq!(restored.get("Key4").unwrap().value, "OnlyLive");
    }

    #[tokio::test]
    async fn test_restore_keys_adds_key_missing_from_live_file() {
        let f = fixture(r#"{"Key1": "Value1", "Key2": "Value2"}"#);
        f.store.create_backup(&f.target, "edit").await.unwrap();
        fs::write(&f.target, r#"{"Key1": "Value1"}"#).unwrap();

        let result = f
            .engine
            .restore_keys("Strings.json", 1, vec!["Key2".to_string()], &f.target, true)
            .await
            .unwrap();

        assert_eq!(result.pre_restore_backup.map(|r| r.version), Some(2));
        let restored = read_map(&f.target);
        assert_eq!(restored.get("Key2").unwrap().value, "Value2");
        assert_eq!(restored.len(), 2);
    }

    #[tokio::test]
    async fn test_preview_does_not_mutate() {
        let f = fixture(r#"{"Key1": "Value1"}"#);
        f.store.create_backup(&f.target, "edit").await.unwrap();
        let live = r#"{"Key1": "Value1", "Key2": "Value2"}"#;
        fs::write(&f.target, live).unwrap();
        let before = f.store.list_backups("Strings.json").await.unwrap();

        let preview = f.engine.preview_restore("Strings.json", 1, &f.target).await.unwrap();

        assert_eq!(preview.old_version, Some(1));
        assert_eq!(preview.new_version, None);
        assert_eq!(preview.statistics.added, 1);
        assert_eq!(fs::read_to_string(&f.target).unwrap(), live);
        assert_eq!(f.store.list_backups("Strings.json").await.unwrap(), before);

        let err = f.engine.preview_restore("Strings.json", 9, &f.target).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_validate_restore() {
        let f = fixture(r#"{"A": "1"}"#);
        f.store.create_backup(&f.target, "edit").await.unwrap();

        let ok = f.engine.validate_restore("Strings.json", 1, &f.target).await.unwrap();
        assert!(ok.is_valid);

        let missing = f.engine.validate_restore("Strings.json", 99, &f.target).await.unwrap();
        assert!(!missing.is_valid);
        assert!(missing.message.is_some());

        let no_history = f
            .engine
            .validate_restore("Other.json", 1, Path::new("/does/not/matter"))
            .await
            .unwrap();
        assert!(!no_history.is_valid);

        let bad_name = f
            .engine
            .validate_restore("fr/Strings.json", 1, &f.target)
            .await
            .unwrap();
        assert!(!bad_name.is_valid);
        assert!(bad_name.message.unwrap().contains("fr/Strings.json"));
    }

    #[test]
    fn test_merge_keys() {
        let mut current: ResourceMap = vec![ResourceEntry::new("A", "live")].into_iter().collect();
        let backup: ResourceMap = vec![ResourceEntry::new("A", "old"), ResourceEntry::new("B", "b")]
            .into_iter()
            .collect();
        let keys: BTreeSet<String> = ["A", "C"].iter().map(|s| s.to_string()).collect();

        let (restored, missing) = merge_keys(&mut current, &backup, &keys);

        assert_eq!(restored, vec!["A"]);
        assert_eq!(missing, vec!["C"]);
        assert_eq!(current.get("A").unwrap().value, "old");
        assert!(!current.contains_key("B"));
    }
}
