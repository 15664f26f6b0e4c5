//! Mod manifest loading.
//!
//! A manifest is a JSON file listing the workshop items to install, either as
//! a top-level array or wrapped in an object:
//!
//! ```json
//! { "mods": [ { "id": "2009463077", "name": "Harmony" }, { "id": 818773962 } ] }
//! ```
//!
//! Loading is purely syntactic. Whether an id exists on the workshop is only
//! discovered when SteamCMD tries to download it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::ManifestError;

/// Keys accepted for the workshop item id, in lookup order.
const ID_KEYS: &[&str] = &["id", "identifier", "publishedFileId"];

/// Keys accepted for the display name, in lookup order.
const NAME_KEYS: &[&str] = &["name", "displayName"];

/// Key of the entry list when the manifest is an object.
const MODS_KEY: &str = "mods";

// ============================================================================
// Manifest Entry
// ============================================================================

/// One workshop item to install.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Workshop item id.
    pub id: String,
    /// Human-readable name, used only for reporting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ManifestEntry {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Name for log lines and reports: the display name if set, else the id.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

impl fmt::Display for ManifestEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.id),
            None => f.write_str(&self.id),
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Reads and validates the manifest at `path`.
///
/// Entries are returned in file order. An empty list is valid.
pub fn load(path: &Path) -> Result<Vec<ManifestEntry>, ManifestError> {
    let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;

    let entries = parse(path, &content)?;
    info!("Loaded {} entries from manifest {}", entries.len(), path.display());
    Ok(entries)
}

/// Parses manifest text. `path` is only used for error messages.
pub fn parse(path: &Path, content: &str) -> Result<Vec<ManifestEntry>, ManifestError> {
    let value: Value = serde_json::from_str(content).map_err(|e| ManifestError::Malformed {
        path: path.to_path_buf(),
        line: e.line(),
        column: e.column(),
        message: e.to_string(),
    })?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove(MODS_KEY) {
            Some(Value::Array(items)) => items,
            _ => return Err(shape_error(path, "expected a \"mods\" array")),
        },
        _ => return Err(shape_error(path, "expected an array of entries")),
    };

    let mut seen = HashSet::with_capacity(items.len());
    let mut entries = Vec::with_capacity(items.len());

    for (index, item) in items.into_iter().enumerate() {
        let invalid = |reason: String| ManifestError::InvalidEntry {
            path: path.to_path_buf(),
            index,
            reason,
        };

        let fields = match item {
            Value::Object(fields) => fields,
            other => return Err(invalid(format!("expected an object, found {}", kind(&other)))),
        };

        let entry = parse_entry(&fields).map_err(invalid)?;
        if !seen.insert(entry.id.clone()) {
            return Err(invalid(format!("duplicate id \"{}\"", entry.id)));
        }

        debug!(index, id = %entry.id, "Manifest entry");
        entries.push(entry);
    }

    Ok(entries)
}

fn parse_entry(fields: &Map<String, Value>) -> Result<ManifestEntry, String> {
    let (key, raw) = ID_KEYS
        .iter()
        .find_map(|key| fields.get(*key).map(|v| (*key, v)))
        .ok_or_else(|| "missing \"id\"".to_string())?;

    let id = match raw {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => match n.as_u64() {
            Some(n) => n.to_string(),
            None => return Err(format!("\"{}\" must be a non-negative integer or a string", key)),
        },
        other => return Err(format!("\"{}\" must be a string, found {}", key, kind(other))),
    };

    validate_id(&id)?;

    let name = match NAME_KEYS.iter().find_map(|key| fields.get(*key)) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::String(s)) => Some(s.trim().to_string()),
        Some(other) => return Err(format!("\"name\" must be a string, found {}", kind(other))),
    };

    Ok(ManifestEntry { id, name })
}

/// Ids are passed to SteamCMD as command arguments, so anything beyond a
/// plain token is rejected.
fn validate_id(id: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err("empty id".to_string());
    }
    if let Some(c) = id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(format!("id \"{}\" contains invalid character {:?}", id, c));
    }
    Ok(())
}

fn shape_error(path: &Path, message: &str) -> ManifestError {
    ManifestError::Malformed {
        path: PathBuf::from(path),
        line: 1,
        column: 1,
        message: message.to_string(),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse_str(content: &str) -> Result<Vec<ManifestEntry>, ManifestError> {
        parse(Path::new("mods.json"), content)
    }

    #[test]
    fn test_parse_array_preserves_order() {
        let entries = parse_str(
            r#"[
                { "id": "300", "name": "Third" },
                { "id": "100" },
                { "id": "200", "name": "Second" }
            ]"#,
        )
        .unwrap();

        let ids: Vec<_> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["300", "100", "200"]);
        assert_eq!(entries[0].name.as_deref(), Some("Third"));
        assert_eq!(entries[1].name, None);
    }

    #[test]
    fn test_parse_mods_object_and_aliases() {
        let entries = parse_str(
            r#"{ "mods": [
                { "publishedFileId": 2009463077, "displayName": "Harmony" },
                { "identifier": "818773962", "author": "ignored" }
            ] }"#,
        )
        .unwrap();

        assert_eq!(entries[0], ManifestEntry::new("2009463077").with_name("Harmony"));
        assert_eq!(entries[1], ManifestEntry::new("818773962"));
    }

    #[test]
    fn test_parse_empty_manifest() {
        assert!(parse_str("[]").unwrap().is_empty());
        assert!(parse_str(r#"{ "mods": [] }"#).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_json_reports_position() {
        let err = parse_str("[\n  { \"id\": \"100\" },\n  { \"id\": }\n]").unwrap_err();
        match err {
            ManifestError::Malformed { line, column, .. } => {
                assert_eq!(line, 3);
                assert!(column > 0);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_wrong_top_level_shape() {
        assert!(matches!(
            parse_str(r#""100""#),
            Err(ManifestError::Malformed { .. })
        ));
        assert!(matches!(
            parse_str(r#"{ "items": [] }"#),
            Err(ManifestError::Malformed { .. })
        ));
    }

    #[test]
    fn test_missing_id_reports_index() {
        let err = parse_str(r#"[{ "id": "1" }, { "name": "No id" }]"#).unwrap_err();
        match &err {
            ManifestError::InvalidEntry { index, reason, .. } => {
                assert_eq!(*index, 1);
                assert!(reason.contains("missing"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.to_string().contains("mods.json"));
    }

    #[test]
    fn test_rejects_bad_ids() {
        for bad in [
            r#"[{ "id": "" }]"#,
            r#"[{ "id": "   " }]"#,
            r#"[{ "id": "100 +quit" }]"#,
            r#"[{ "id": -5 }]"#,
            r#"[{ "id": true }]"#,
            r#"[42]"#,
        ] {
            assert!(
                matches!(parse_str(bad), Err(ManifestError::InvalidEntry { index: 0, .. })),
                "accepted {}",
                bad
            );
        }
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let err = parse_str(r#"[{ "id": "100" }, { "id": 200 }, { "id": 100 }]"#).unwrap_err();
        match err {
            ManifestError::InvalidEntry { index, reason, .. } => {
                assert_eq!(index, 2);
                assert!(reason.contains("duplicate"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = load(&temp_dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, ManifestError::Unreadable { .. }));
    }

    #[test]
    fn test_load_from_disk() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("mods.json");
        std::fs::write(&path, r#"[{ "id": "100", "name": "Core" }]"#).unwrap();

        let entries = load(&path).unwrap();
        assert_eq!(entries, vec![ManifestEntry::new("100").with_name("Core")]);
        assert_eq!(entries[0].label(), "Core");
        assert_eq!(entries[0].to_string(), "Core (100)");
    }
}
