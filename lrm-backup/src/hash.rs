//! SHA-256 content hashing for backup payloads.

use sha2::{Digest, Sha256};
use std::path::Path;

/// Length of a hex-encoded SHA-256 digest.
pub const HASH_HEX_LEN: usize = 64;

/// Lowercase hex SHA-256 of `data`.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Hash the raw bytes of the file at `path`.
pub async fn hash_file(path: &Path) -> std::io::Result<String> {
    let data = tokio::fs::read(path).await?;
    Ok(hash_bytes(&data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_hash_is_deterministic() {
        let a = hash_bytes(b"<root><data name=\"Key1\"/></root>");
        let b = hash_bytes(b"<root><data name=\"Key1\"/></root>");
        assert_eq!(a, b);
        assert_eq!(a.len(), HASH_HEX_LEN);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(
            hash_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_different_content_differs() {
        assert_ne!(hash_bytes(b"Value1"), hash_bytes(b"Value2"));
    }

    #[tokio::test]
    async fn test_hash_file_matches_bytes() -> std::io::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("Strings.json");
        tokio::fs::write(&path, b"{\"Key1\":\"Value1\"}").await?;

        assert_eq!(hash_file(&path).await?, hash_bytes(b"{\"Key1\":\"Value1\"}"));
        Ok(())
    }
}
