//! Manifest types for versioned backups.
//!
//! A manifest records every retained snapshot of one logical resource file
//! and is serialized as `manifest.json` next to the payloads it describes.

use crate::fs::atomic::write_atomic;
use crate::utils::{BackupError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// One immutable snapshot descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRecord {
    pub version: u32,
    pub timestamp: DateTime<Utc>,
    /// Payload file name, relative to the manifest's directory
    #[serde(rename = "filePath", alias = "storedFileName")]
    pub stored_file_name: String,
    pub operation: String,
    pub key_count: usize,
    /// Lowercase hex SHA-256 of the payload bytes
    #[serde(rename = "hash")]
    pub content_hash: String,
}

/// Backup manifest, serialized as `manifest.json` in each file's backup directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupManifest {
    pub file_name: String,
    /// Highest version ever assigned, including deleted ones
    #[serde(default)]
    pub last_version: u32,
    /// Records in ascending version order
    #[serde(default)]
    pub backups: Vec<BackupRecord>,
}

impl BackupManifest {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            last_version: 0,
            backups: Vec::new(),
        }
    }

    /// Load the manifest at `path`, or an empty one if none exists yet.
    pub async fn load_or_default(path: &Path, file_name: &str) -> Result<Self> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::new(file_name));
            }
            Err(e) => return Err(BackupError::Io(e)),
        };

        let mut manifest: BackupManifest = serde_json::from_str(&content)?;
        if manifest.file_name.is_empty() {
            manifest.file_name = file_name.to_string();
        }
        manifest.backups.sort_by_key(|r| r.version);
        debug!(
            "Loaded manifest for {} ({} backups)",
            manifest.file_name,
            manifest.backups.len()
        );
        Ok(manifest)
    }

    /// Persist atomically to `path`.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &json).await?;
        debug!("Saved manifest for {} ({} backups)", self.file_name, self.backups.len());
        Ok(())
    }

    /// Next version number; never reuses a number, even after deletions.
    pub fn next_version(&self) -> u32 {
        let max_existing = self.backups.iter().map(|r| r.version).max().unwrap_or(0);
        self.last_version.max(max_existing) + 1
    }

    pub fn push(&mut self, record: BackupRecord) {
        self.last_version = self.last_version.max(record.version);
        self.backups.push(record);
        self.backups.sort_by_key(|r| r.version);
    }

    pub fn remove(&mut self, version: u32) -> Option<BackupRecord> {
        let idx = self.backups.iter().position(|r| r.version == version)?;
        Some(self.backups.remove(idx))
    }

    pub fn get(&self, version: u32) -> Option<&BackupRecord> {
        self.backups.iter().find(|r| r.version == version)
    }

    pub fn latest(&self) -> Option<&BackupRecord> {
        self.backups.iter().max_by_key(|r| r.version)
    }

    /// Most recent first.
    pub fn records_descending(&self) -> Vec<BackupRecord> {
        let mut records = self.backups.clone();
        records.sort_by(|a, b| b.version.cmp(&a.version));
        records
    }

    pub fn len(&self) -> usize {
        self.backups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backups.is_empty()
    }
}

/// Payload name for `version` of `file_name`: `Strings.resx` -> `Strings.v003.resx`.
pub fn stored_file_name(file_name: &str, version: u32) -> String {
    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| file_name.to_string());

    match path.extension() {
        Some(ext) => format!("{}.v{:03}.{}", stem, version, ext.to_string_lossy()),
        None => format!("{}.v{:03}", stem, version),
    }
}
