//! File metadata carried across atomic replacement.
//!
//! Replacing a file by rename swaps in a fresh inode, so the permission
//! bits of the live resource file are captured first and re-applied.

use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMetadata {
    /// Unix mode bits; `None` elsewhere
    pub permissions: Option<u32>,
}

impl FileMetadata {
    /// Extract metadata from a file path
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = fs::metadata(path)?;

        #[cfg(unix)]
        let permissions = {
            use std::os::unix::fs::PermissionsExt;
            Some(metadata.permissions().mode())
        };

        #[cfg(not(unix))]
        let permissions = {
            let _ = metadata;
            None
        };

        Ok(Self { permissions })
    }

    /// Apply the captured permissions to another file
    #[cfg(unix)]
    pub fn apply_to_path(&self, path: &Path) -> std::io::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        if let Some(mode) = self.permissions {
            fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
        }

        Ok(())
    }

    #[cfg(not(unix))]
    pub fn apply_to_path(&self, _path: &Path) -> std::io::Result<()> {
        Ok(())
    }
}
