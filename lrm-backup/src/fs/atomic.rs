//! Crash-safe file replacement.
//!
//! Data is written to a uniquely named temp file next to the destination,
//! flushed to disk, then renamed over the destination. Readers see either
//! the old content or the new content, never a truncated file.

use super::metadata::FileMetadata;
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Suffix of in-flight temp files.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Atomically replace `path` with `data`.
///
/// # Returns
/// * `Ok(usize)` - Number of bytes written
/// * `Err(io::Error)` - If the temp file cannot be written or renamed
pub async fn write_atomic(path: &Path, data: &[u8]) -> io::Result<usize> {
    write_atomic_with(path, data, None).await
}

/// Atomically replace `path`, carrying over the permission bits of the
/// file being replaced (if it exists).
pub async fn replace_preserving_metadata(path: &Path, data: &[u8]) -> io::Result<usize> {
    let existing = match FileMetadata::from_path(path) {
        Ok(meta) => Some(meta),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(e),
    };
    write_atomic_with(path, data, existing.as_ref()).await
}

async fn write_atomic_with(
    path: &Path,
    data: &[u8],
    metadata: Option<&FileMetadata>,
) -> io::Result<usize> {
    let tmp = temp_path_for(path)?;

    let written = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(data).await?;
        file.sync_all().await
    }
    .await;

    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }

    commit_temp(&tmp, path, metadata).await?;
    Ok(data.len())
}

/// Move a fully written temp file over `path`, applying `metadata` first.
///
/// The temp file is removed if the commit fails.
pub async fn commit_temp(tmp: &Path, path: &Path, metadata: Option<&FileMetadata>) -> io::Result<()> {
    let result = async {
        if let Some(meta) = metadata {
            meta.apply_to_path(tmp)?;
        }
        tokio::fs::rename(tmp, path).await
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(tmp).await;
    }
    result
}

/// A fresh temp path in the same directory as `path`, so that renaming it
/// over `path` stays on one file system. The extension of `path` stays
/// last (`.Strings.<id>.tmp.json`) for codecs that dispatch on it.
pub fn temp_path_for(path: &Path) -> io::Result<PathBuf> {
    let file_name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("not a file path: {}", path.display()),
        )
    })?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let id = Uuid::new_v4().simple();
    let tmp_name = match (path.file_stem(), path.extension()) {
        (Some(stem), Some(ext)) => format!(
            ".{}.{}{}.{}",
            stem.to_string_lossy(),
            id,
            TEMP_SUFFIX,
            ext.to_string_lossy()
        ),
        _ => format!(".{}.{}{}", file_name.to_string_lossy(), id, TEMP_SUFFIX),
    };
    Ok(dir.join(tmp_name))
}
