//! Plugin manifest parsing.
//!
//! A manifest is a `plugin.json` file at the root of a plugin directory:
//!
//! ```json
//! {
//!   "name": "warden-plugin-github",
//!   "version": "1.2.0",
//!   "displayName": "GitHub",
//!   "description": "Mirrors pushes into activity records",
//!   "entryPoint": "dist/handler",
//!   "hooks": { "webhook.received": 10 }
//! }
//! ```
//!
//! Only `name` and `version` are required. Optional fields are type-guarded:
//! a field of the wrong type is dropped with a debug log instead of failing
//! the whole manifest.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use warden_core::{Error, Result, validate_identifier};

/// File name of the manifest inside a plugin directory.
pub const MANIFEST_FILE: &str = "plugin.json";

/// Entry point used when the manifest does not name one.
pub const DEFAULT_ENTRY_POINT: &str = "index";

/// Priority given to hooks declared without one.
pub const DEFAULT_HOOK_PRIORITY: i32 = 100;

/// Largest manifest file accepted.
const MAX_MANIFEST_BYTES: u64 = 256 * 1024;

/// Declarative plugin metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    /// Validated plugin identifier
    pub name: String,
    /// Plugin version string
    pub version: String,
    /// Human-readable name, defaults to `name`
    pub display_name: String,
    /// Short description, empty when absent
    pub description: String,
    /// Author
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// License expression
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    /// Code entry point relative to the plugin directory
    pub entry_point: String,
    /// Catalog category
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Supported core version range
    #[serde(skip_serializing_if = "Option::is_none")]
    pub core_version_range: Option<String>,
    /// Expected `blake3:<hex>` checksum of the entry point
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Hook name to priority
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub hooks: BTreeMap<String, i32>,
}

/// Loads and validates a manifest.
///
/// # Errors
///
/// - [`Error::InvalidArgument`] if `path` is not absolute
/// - [`Error::ManifestError`] if the file is missing, unreadable, not a JSON
///   object, or lacks a non-empty `name` or `version`
/// - [`Error::InvalidIdentifier`] if `name` is not a valid identifier
pub fn load_manifest(path: &Path) -> Result<PluginManifest> {
    if !path.is_absolute() {
        return Err(Error::InvalidArgument(format!(
            "manifest path must be absolute: {}",
            path.display()
        )));
    }

    let manifest_error = |reason: String| Error::ManifestError {
        path: path.to_path_buf(),
        reason,
    };

    let metadata = fs::metadata(path).map_err(|e| manifest_error(format!("cannot read: {e}")))?;
    if !metadata.is_file() {
        return Err(manifest_error("not a regular file".to_string()));
    }
    if metadata.len() > MAX_MANIFEST_BYTES {
        return Err(manifest_error(format!(
            "file is {} bytes, limit is {MAX_MANIFEST_BYTES}",
            metadata.len()
        )));
    }

    let content =
        fs::read_to_string(path).map_err(|e| manifest_error(format!("cannot read: {e}")))?;
    let value: Value =
        serde_json::from_str(&content).map_err(|e| manifest_error(format!("invalid JSON: {e}")))?;
    let Value::Object(fields) = value else {
        return Err(manifest_error("top level must be a JSON object".to_string()));
    };

    let manifest = parse_fields(&fields).map_err(manifest_error)?;
    validate_identifier(&manifest.name)?;

    tracing::debug!(
        plugin_id = %manifest.name,
        version = %manifest.version,
        "Loaded plugin manifest"
    );
    Ok(manifest)
}

fn parse_fields(fields: &Map<String, Value>) -> std::result::Result<PluginManifest, String> {
    let name = required_str(fields, "name")?;
    let version = required_str(fields, "version")?;

    let entry_point = optional_str(fields, "entryPoint")
        .filter(|entry| !entry.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ENTRY_POINT.to_string());

    Ok(PluginManifest {
        display_name: optional_str(fields, "displayName").unwrap_or_else(|| name.clone()),
        description: optional_str(fields, "description").unwrap_or_default(),
        author: optional_str(fields, "author"),
        license: optional_str(fields, "license"),
        entry_point,
        category: optional_str(fields, "category"),
        core_version_range: optional_str(fields, "coreVersionRange"),
        checksum: optional_str(fields, "checksum"),
        hooks: parse_hooks(fields.get("hooks")),
        name,
        version,
    })
}

fn required_str(fields: &Map<String, Value>, key: &str) -> std::result::Result<String, String> {
    match fields.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::String(_)) => Err(format!("field '{key}' must not be blank")),
        Some(_) => Err(format!("field '{key}' must be a string")),
        None => Err(format!("missing required field '{key}'")),
    }
}

fn optional_str(fields: &Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => {
            tracing::debug!(field = key, kind = json_kind(other), "Dropping wrong-typed manifest field");
            None
        }
    }
}

fn parse_hooks(value: Option<&Value>) -> BTreeMap<String, i32> {
    let mut hooks = BTreeMap::new();
    match value {
        Some(Value::Object(entries)) => {
            for (hook, priority) in entries {
                if hook.trim().is_empty() {
                    continue;
                }
                let priority = match priority {
                    Value::Null => Some(DEFAULT_HOOK_PRIORITY),
                    Value::Number(n) => n.as_i64().and_then(|p| i32::try_from(p).ok()),
                    _ => None,
                };
                match priority {
                    Some(priority) => {
                        hooks.insert(hook.clone(), priority);
                    }
                    None => {
                        tracing::debug!(hook = %hook, "Dropping hook with non-integer priority");
                    }
                }
            }
        }
        Some(Value::Null) | None => {}
        Some(other) => {
            tracing::debug!(kind = json_kind(other), "Dropping wrong-typed manifest field 'hooks'");
        }
    }
    hooks
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
