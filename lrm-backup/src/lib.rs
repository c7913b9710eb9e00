//! Localization Resource Backup Library
//!
//! Versioned, content-hashed snapshots of resource files with tiered
//! rotation, key-level diffs and full or partial restore.

pub mod config;
pub mod diff;
pub mod fs;
pub mod hash;
pub mod resource;
pub mod restore;
pub mod rotation;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use diff::{Change, ChangeType, DiffEngine, DiffResult, DiffStatistics};
pub use resource::{JsonResourceCodec, ResourceCodec, ResourceEntry, ResourceMap};
pub use restore::{RestoreEngine, RestoreResult, ValidationResult};
pub use rotation::RotationPolicy;
pub use store::manifest::{BackupManifest, BackupRecord};
pub use store::BackupStore;
pub use utils::errors::BackupError;
pub type Result<T> = std::result::Result<T, BackupError>;
