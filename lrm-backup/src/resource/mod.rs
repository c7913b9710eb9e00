//! Resource file model and the codec boundary.
//!
//! The engine never reads a resource format itself; it asks a
//! [`ResourceCodec`] to turn a file into an ordered key map and back.

pub mod json;

use crate::utils::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use json::JsonResourceCodec;

/// One translatable entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub key: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl ResourceEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Entries keyed by `key`, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceMap {
    entries: IndexMap<String, ResourceEntry>,
}

impl ResourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry. A replaced key keeps its position.
    pub fn insert(&mut self, entry: ResourceEntry) -> Option<ResourceEntry> {
        self.entries.insert(entry.key.clone(), entry)
    }

    pub fn get(&self, key: &str) -> Option<&ResourceEntry> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<ResourceEntry> for ResourceMap {
    fn from_iter<I: IntoIterator<Item = ResourceEntry>>(iter: I) -> Self {
        let mut map = ResourceMap::new();
        for entry in iter {
            map.insert(entry);
        }
        map
    }
}

/// Reads and writes one concrete resource format.
pub trait ResourceCodec: Send + Sync {
    /// Parse the file at `path` into an ordered map.
    fn parse(&self, path: &Path) -> Result<ResourceMap>;

    /// Write `map` to `path`, replacing any existing content.
    fn serialize(&self, map: &ResourceMap, path: &Path) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_keeps_position_on_replace() {
        let mut map: ResourceMap = vec![
            ResourceEntry::new("A", "1"),
            ResourceEntry::new("B", "2"),
            ResourceEntry::new("C", "3"),
        ]
        .into_iter()
        .collect();

        let old = map.insert(ResourceEntry::new("B", "two").with_comment("updated"));

        assert_eq!(old.map(|e| e.value), Some("2".to_string()));
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["A", "B", "C"]);
        assert_eq!(map.get("B").unwrap().comment.as_deref(), Some("updated"));
        assert_eq!(map.len(), 3);
    }
}
