//! Versioned snapshot store.
//!
//! Layout under the backup root, one directory per logical file name:
//!
//! ```text
//! <root>/Strings.json/manifest.json
//! <root>/Strings.json/Strings.v001.json
//! <root>/Strings.json/Strings.v002.json
//! ```
//!
//! Every mutation of a file's manifest runs under that file name's lock.

pub mod manifest;

use crate::fs::atomic::write_atomic;
use crate::fs::walker::find_manifests;
use crate::hash::{hash_bytes, hash_file};
use crate::resource::{ResourceCodec, ResourceMap};
use crate::rotation::RotationPolicy;
use crate::utils::{BackupError, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use manifest::{stored_file_name, BackupManifest, BackupRecord};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const MANIFEST_FILE_NAME: &str = "manifest.json";

pub struct BackupStore {
    root: PathBuf,
    policy: RotationPolicy,
    codec: Arc<dyn ResourceCodec>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl BackupStore {
    pub fn new(root: impl Into<PathBuf>, policy: RotationPolicy, codec: Arc<dyn ResourceCodec>) -> Self {
        Self {
            root: root.into(),
            policy,
            codec,
            locks: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn policy(&self) -> &RotationPolicy {
        &self.policy
    }

    pub fn codec(&self) -> Arc<dyn ResourceCodec> {
        self.codec.clone()
    }

    /// Snapshot `source`, then apply rotation.
    pub async fn create_backup(&self, source: &Path, operation: &str) -> Result<BackupRecord> {
        self.create_backup_at(source, operation, Utc::now()).await
    }

    pub(crate) async fn create_backup_at(
        &self,
        source: &Path,
        operation: &str,
        now: DateTime<Utc>,
    ) -> Result<BackupRecord> {
        let file_name = file_name_of(source)?;
        let dir = self.file_dir(&file_name)?;

        let lock = self.file_lock(&file_name);
        let _guard = lock.lock().await;

        let content = match tokio::fs::read(source).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BackupError::SourceNotFound(source.to_path_buf()));
            }
            Err(e) => return Err(BackupError::Io(e)),
        };

        tokio::fs::create_dir_all(&dir).await?;
        let manifest_path = dir.join(MANIFEST_FILE_NAME);
        let mut manifest = BackupManifest::load_or_default(&manifest_path, &file_name).await?;

        let version = manifest.next_version();
        let stored = stored_file_name(&file_name, version);
        // Timestamps never run backwards within one manifest
        let timestamp = manifest
            .latest()
            .map(|r| r.timestamp.max(now))
            .unwrap_or(now);

        let payload = dir.join(&stored);
        write_atomic(&payload, &content).await?;
        // Counted from the stored bytes so it matches the hash
        let key_count = self.count_keys(&payload).await;

        let record = BackupRecord {
            version,
            timestamp,
            stored_file_name: stored,
            operation: operation.to_string(),
            key_count,
            content_hash: hash_bytes(&content),
        };
        manifest.push(record.clone());
        manifest.save(&manifest_path).await?;

        info!(
            file = %file_name,
            version,
            operation,
            keys = key_count,
            "Created backup"
        );

        self.rotate_locked(&mut manifest, &dir, now).await?;

        Ok(record)
    }

    /// All retained backups of `file_name`, most recent first.
    pub async fn list_backups(&self, file_name: &str) -> Result<Vec<BackupRecord>> {
        Ok(self.load_manifest(file_name).await?.records_descending())
    }

    pub async fn get_backup(&self, file_name: &str, version: u32) -> Result<Option<BackupRecord>> {
        Ok(self.load_manifest(file_name).await?.get(version).cloned())
    }

    /// Where the payload of `version` lives. Does not check existence.
    pub fn backup_file_path(&self, file_name: &str, version: u32) -> Result<PathBuf> {
        Ok(self.file_dir(file_name)?.join(stored_file_name(file_name, version)))
    }

    /// Delete one version. Returns false if it was not in the manifest.
    pub async fn delete_backup(&self, file_name: &str, version: u32) -> Result<bool> {
        let dir = self.file_dir(file_name)?;
        let lock = self.file_lock(file_name);
        let _guard = lock.lock().await;

        let manifest_path = dir.join(MANIFEST_FILE_NAME);
        let mut manifest = BackupManifest::load_or_default(&manifest_path, file_name).await?;

        let Some(record) = manifest.remove(version) else {
            return Ok(false);
        };
        manifest.save(&manifest_path).await?;
        remove_payload(&dir, &record).await?;

        info!(file = %file_name, version, "Deleted backup");
        Ok(true)
    }

    /// Recompute the payload hash of `version` and compare it to the manifest.
    pub async fn verify_backup(&self, file_name: &str, version: u32) -> Result<BackupRecord> {
        validate_file_name(file_name)?;
        let lock = self.file_lock(file_name);
        let _guard = lock.lock().await;

        let (record, payload) = self.locate(file_name, version).await?;
        let actual = hash_file(&payload).await?;
        check_integrity(file_name, &record, actual)?;
        Ok(record)
    }

    /// Read a verified payload of `version`.
    pub async fn read_backup(&self, file_name: &str, version: u32) -> Result<(BackupRecord, Vec<u8>)> {
        validate_file_name(file_name)?;
        let lock = self.file_lock(file_name);
        let _guard = lock.lock().await;

        let (record, _, content) = self.read_verified(file_name, version).await?;
        Ok((record, content))
    }

    /// Parse a verified payload of `version` into a resource map.
    pub async fn load_backup_map(&self, file_name: &str, version: u32) -> Result<(BackupRecord, ResourceMap)> {
        validate_file_name(file_name)?;
        let lock = self.file_lock(file_name);
        let _guard = lock.lock().await;

        let (record, payload, _) = self.read_verified(file_name, version).await?;
        let codec = self.codec.clone();
        let map = tokio::task::spawn_blocking(move || codec.parse(&payload)).await??;
        Ok((record, map))
    }

    /// Run rotation for `file_name` now. Returns the removed versions.
    pub async fn apply_rotation(&self, file_name: &str) -> Result<Vec<u32>> {
        self.apply_rotation_at(file_name, Utc::now()).await
    }

    pub async fn apply_rotation_at(&self, file_name: &str, now: DateTime<Utc>) -> Result<Vec<u32>> {
        let dir = self.file_dir(file_name)?;
        let lock = self.file_lock(file_name);
        let _guard = lock.lock().await;

        let mut manifest =
            BackupManifest::load_or_default(&dir.join(MANIFEST_FILE_NAME), file_name).await?;
        self.rotate_locked(&mut manifest, &dir, now).await
    }

    /// Logical file names that have a manifest under the root.
    pub async fn list_files(&self) -> Result<Vec<String>> {
        let root = self.root.clone();
        let found = tokio::task::spawn_blocking(move || find_manifests(&root, MANIFEST_FILE_NAME))
            .await??;
        Ok(found.into_iter().map(|m| m.file_name).collect())
    }

    async fn rotate_locked(
        &self,
        manifest: &mut BackupManifest,
        dir: &Path,
        now: DateTime<Utc>,
    ) -> Result<Vec<u32>> {
        let doomed = self.policy.versions_to_remove(now, manifest);
        if doomed.is_empty() {
            return Ok(doomed);
        }

        let removed: Vec<BackupRecord> = doomed.iter().filter_map(|v| manifest.remove(*v)).collect();
        // Manifest first: a crash leaves orphan payloads, never dangling records
        manifest.save(&dir.join(MANIFEST_FILE_NAME)).await?;
        for record in &removed {
            remove_payload(dir, record).await?;
        }

        info!(
            file = %manifest.file_name,
            removed = ?doomed,
            remaining = manifest.len(),
            "Rotated backups"
        );
        Ok(doomed)
    }

    /// Record and payload path of `version`. Callers hold the file lock.
    async fn locate(&self, file_name: &str, version: u32) -> Result<(BackupRecord, PathBuf)> {
        let record = self
            .load_manifest(file_name)
            .await?
            .get(version)
            .cloned()
            .ok_or_else(|| BackupError::version_not_found(file_name, version))?;
        let payload = self.file_dir(file_name)?.join(&record.stored_file_name);
        Ok((record, payload))
    }

    /// Record, payload path and bytes of `version`, checked against the
    /// recorded hash. Callers hold the file lock.
    async fn read_verified(&self, file_name: &str, version: u32) -> Result<(BackupRecord, PathBuf, Vec<u8>)> {
        let (record, payload) = self.locate(file_name, version).await?;
        let content = tokio::fs::read(&payload).await?;
        check_integrity(file_name, &record, hash_bytes(&content))?;
        Ok((record, payload, content))
    }

    async fn load_manifest(&self, file_name: &str) -> Result<BackupManifest> {
        let path = self.file_dir(file_name)?.join(MANIFEST_FILE_NAME);
        BackupManifest::load_or_default(&path, file_name).await
    }

    async fn count_keys(&self, payload: &Path) -> usize {
        let codec = self.codec.clone();
        let path = payload.to_path_buf();
        match tokio::task::spawn_blocking(move || codec.parse(&path)).await {
            Ok(Ok(map)) => map.len(),
            Ok(Err(e)) => {
                warn!("Could not parse {} for key count: {}", payload.display(), e);
                0
            }
            Err(e) => {
                warn!("Key count task failed for {}: {}", payload.display(), e);
                0
            }
        }
    }

    fn file_dir(&self, file_name: &str) -> Result<PathBuf> {
        validate_file_name(file_name)?;
        Ok(self.root.join(file_name))
    }

    fn file_lock(&self, file_name: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(file_name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

fn check_integrity(file_name: &str, record: &BackupRecord, actual: String) -> Result<()> {
    if actual == record.content_hash {
        return Ok(());
    }
    warn!(file = %file_name, version = record.version, "Backup payload failed integrity check");
    Err(BackupError::IntegrityMismatch {
        file_name: file_name.to_string(),
        version: record.version,
        expected: record.content_hash.clone(),
        actual,
    })
}

async fn remove_payload(dir: &Path, record: &BackupRecord) -> Result<()> {
    match tokio::fs::remove_file(dir.join(&record.stored_file_name)).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("Payload {} already gone", record.stored_file_name);
            Ok(())
        }
        Err(e) => Err(BackupError::Io(e)),
    }
}

fn file_name_of(path: &Path) -> Result<String> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| BackupError::InvalidFileName(path.display().to_string()))?;
    validate_file_name(&name)?;
    Ok(name)
}

fn validate_file_name(file_name: &str) -> Result<()> {
    let bad = file_name.is_empty()
        || file_name == "."
        || file_name == ".."
        || file_name.contains(['/', '\\'])
        || file_name.contains('\0');
    if bad {
        return Err(BackupError::InvalidFileName(file_name.to_string()));
    }
    Ok(())
}
