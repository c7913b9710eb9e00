//! Backup directory traversal.
//!
//! The backup root holds one directory per logical resource file, each with
//! a `manifest.json` next to its versioned payloads.

use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// A manifest found under the backup root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestLocation {
    /// Directory name, which is the logical file name
    pub file_name: String,

    /// Full path to the manifest file
    pub manifest_path: PathBuf,
}

/// Find every manifest named `manifest_name` one level below `root`.
///
/// A missing root yields an empty list. Results are sorted by file name.
///
/// # Example
/// ```no_run
/// use lrm_backup::fs::walker::find_manifests;
/// use std::path::Path;
///
/// let found = find_manifests(Path::new(".lrm/backups"), "manifest.json").unwrap();
/// println!("{} files have backups", found.len());
/// ```
pub fn find_manifests(root: &Path, manifest_name: &str) -> std::io::Result<Vec<ManifestLocation>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let mut found = Vec::new();

    let walker = WalkDir::new(root).min_depth(2).max_depth(2).follow_links(false);

    for entry in walker {
        let entry = entry?;

        if !is_manifest(&entry, manifest_name) {
            continue;
        }

        let Some(parent) = entry.path().parent() else {
            continue;
        };
        let Some(dir_name) = parent.file_name() else {
            continue;
        };

        found.push(ManifestLocation {
            file_name: dir_name.to_string_lossy().to_string(),
            manifest_path: entry.path().to_path_buf(),
        });
    }

    found.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok(found)
}

fn is_manifest(entry: &DirEntry, manifest_name: &str) -> bool {
    entry.file_type().is_file() && entry.file_name().to_string_lossy() == manifest_name
}
