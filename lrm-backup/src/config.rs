//! Configuration management for the backup engine.
//!
//! Loads configuration from an optional TOML file with environment variable
//! overrides (`LRM_BACKUP__SECTION__KEY`).

use crate::rotation::RotationPolicy;
use crate::utils::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "LRM_BACKUP";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backup: BackupConfig,
    pub retention: RotationPolicy,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Directory holding one sub-directory per backed-up resource file
    pub root_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (pretty, compact)
    pub format: String,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from(".lrm/backups"),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration: defaults, then `path` (if any), then environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(BackupError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(::config::File::from(path).required(true));
        }

        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file without environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| BackupError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| BackupError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.backup.root_dir.as_os_str().is_empty() {
            return Err(BackupError::Config("backup.root_dir must not be empty".into()));
        }
        match self.log.format.as_str() {
            "pretty" | "compact" => Ok(()),
            other => Err(BackupError::Config(format!("unknown log format: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.backup.root_dir, PathBuf::from(".lrm/backups"));
        assert_eq!(config.retention.keep_all_for_hours, 24);
        assert_eq!(config.retention.keep_daily_for_days, 7);
        assert_eq!(config.retention.keep_weekly_for_weeks, 4);
        assert_eq!(config.retention.keep_monthly_for_months, 6);
        assert_eq!(config.retention.max_total_backups, 100);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lrm-backup.toml");
        fs::write(
            &path,
            "[backup]\nroot_dir = \"/tmp/lrm\"\n\n[retention]\nmax_total_backups = 5\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.backup.root_dir, PathBuf::from("/tmp/lrm"));
        assert_eq!(config.retention.max_total_backups, 5);
        assert_eq!(config.retention.keep_all_for_hours, 24);
        assert_eq!(config.log.format, "pretty");
    }

    #[test]
    fn test_load_layered_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lrm-backup.toml");
        fs::write(&path, "[retention]\nkeep_daily_for_days = 14\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.retention.keep_daily_for_days, 14);
        assert_eq!(config.retention.keep_weekly_for_weeks, 4);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Some(Path::new("/nonexistent/lrm.toml"))).unwrap_err();
        assert!(matches!(err, BackupError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_unknown_format() {
        let mut config = Config::default();
        config.log.format = "xml".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_render_round_trips() {
        let mut config = Config::default();
        config.retention.max_total_backups = 12;
        let rendered = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.retention.max_total_backups, 12);
    }
}
