//! Error types for the backup engine.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Source file not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("Backup version {version} not found for {file_name}")]
    VersionNotFound { file_name: String, version: u32 },

    #[error(
        "Integrity check failed for {file_name} v{version}: expected {expected}, got {actual}"
    )]
    IntegrityMismatch {
        file_name: String,
        version: u32,
        expected: String,
        actual: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid resource file {}: {reason}", path.display())]
    ResourceFormat { path: PathBuf, reason: String },

    #[error("Invalid file name: {0}")]
    InvalidFileName(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl BackupError {
    /// True for every variant in the "does not exist" class.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            BackupError::SourceNotFound(_) | BackupError::VersionNotFound { .. }
        )
    }

    pub(crate) fn version_not_found(file_name: &str, version: u32) -> Self {
        BackupError::VersionNotFound {
            file_name: file_name.to_string(),
            version,
        }
    }
}

impl From<tokio::task::JoinError> for BackupError {
    fn from(e: tokio::task::JoinError) -> Self {
        BackupError::Task(e.to_string())
    }
}

impl From<::config::ConfigError> for BackupError {
    fn from(e: ::config::ConfigError) -> Self {
        BackupError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_class() {
        assert!(BackupError::version_not_found("a.json", 3).is_not_found());
        assert!(BackupError::SourceNotFound(PathBuf::from("x")).is_not_found());
        assert!(!BackupError::InvalidFileName("fr/a.json".into()).is_not_found());

        let mismatch = BackupError::IntegrityMismatch {
            file_name: "a.json".into(),
            version: 1,
            expected: "aa".into(),
            actual: "bb".into(),
        };
        assert!(!mismatch.is_not_found());
    }

    #[test]
    fn test_error_messages_carry_context() {
        let err = BackupError::version_not_found("Strings.json", 7);
        assert_eq!(err.to_string(), "Backup version 7 not found for Strings.json");
    }
}
