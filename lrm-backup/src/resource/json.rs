//! Flat JSON resource files.
//!
//! ```json
//! {
//!   "Greeting": "Hello",
//!   "Farewell": { "value": "Goodbye", "comment": "Shown on logout" }
//! }
//! ```

use super::{ResourceCodec, ResourceEntry, ResourceMap};
use crate::utils::{BackupError, Result};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonResourceCodec;

impl JsonResourceCodec {
    pub fn new() -> Self {
        Self
    }

    /// Parse JSON text. `path` is only used for error context.
    pub fn parse_str(&self, content: &str, path: &Path) -> Result<ResourceMap> {
        if content.trim().is_empty() {
            return Ok(ResourceMap::new());
        }

        let root: Value = serde_json::from_str(content).map_err(|e| format_error(path, e))?;
        let Value::Object(object) = root else {
            return Err(format_error(path, "top level must be an object"));
        };

        let mut map = ResourceMap::new();
        for (key, value) in object {
            let entry = match value {
                Value::String(s) => ResourceEntry::new(key, s),
                Value::Object(fields) => entry_from_object(key, fields, path)?,
                other => {
                    return Err(format_error(
                        path,
                        format!("value of {key:?} must be a string or object, got {other}"),
                    ))
                }
            };
            map.insert(entry);
        }

        Ok(map)
    }

    pub fn to_string(&self, map: &ResourceMap) -> Result<String> {
        let mut object = Map::with_capacity(map.len());
        for entry in map.iter() {
            let value = match &entry.comment {
                Some(comment) => {
                    let mut fields = Map::new();
                    fields.insert("value".into(), Value::String(entry.value.clone()));
                    fields.insert("comment".into(), Value::String(comment.clone()));
                    Value::Object(fields)
                }
                None => Value::String(entry.value.clone()),
            };
            object.insert(entry.key.clone(), value);
        }

        let mut out = serde_json::to_string_pretty(&Value::Object(object))?;
        out.push('\n');
        Ok(out)
    }
}

impl ResourceCodec for JsonResourceCodec {
    fn parse(&self, path: &Path) -> Result<ResourceMap> {
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BackupError::SourceNotFound(path.to_path_buf())
            } else {
                BackupError::Io(e)
            }
        })?;
        self.parse_str(&content, path)
    }

    fn serialize(&self, map: &ResourceMap, path: &Path) -> Result<()> {
        fs::write(path, self.to_string(map)?)?;
        Ok(())
    }
}

fn entry_from_object(key: String, mut fields: Map<String, Value>, path: &Path) -> Result<ResourceEntry> {
    let value = match fields.remove("value") {
        Some(Value::String(s)) => s,
        _ => return Err(format_error(path, format!("{key:?} is missing a string \"value\""))),
    };
    let comment = match fields.remove("comment") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(_) => return Err(format_error(path, format!("comment of {key:?} must be a string"))),
    };

    Ok(ResourceEntry { key, value, comment })
}

fn format_error(path: &Path, reason: impl ToString) -> BackupError {
    BackupError::ResourceFormat {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}
