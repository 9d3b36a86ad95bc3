//! Module loading: from identifier to verified plugin code.

use crate::checksum::{calculate_checksum, verify_checksum};
use crate::loader::{PluginLoader, PluginSource};
use crate::manifest::{PluginManifest, load_manifest};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use warden_core::{Error, Result, has_recognized_prefix, validate_identifier, verify_containment};

/// WebAssembly binary magic number.
const WASM_MAGIC: &[u8; 4] = b"\0asm";

/// Extension appended to entry points that name none.
const MODULE_EXTENSION: &str = "wasm";

/// Largest module accepted.
const MAX_MODULE_BYTES: u64 = 32 * 1024 * 1024;

/// Loaded plugin code.
///
/// Bytes are shared; cloning is cheap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginModule {
    /// Raw WebAssembly binary
    pub bytes: Arc<[u8]>,
    /// `blake3:<hex>` of `bytes`
    pub checksum: String,
}

/// A plugin ready for activation.
#[derive(Debug, Clone)]
pub struct LoadedPlugin {
    /// Validated manifest
    pub manifest: PluginManifest,
    /// Handler code
    pub module: PluginModule,
    /// Absolute manifest location
    pub manifest_path: PathBuf,
    /// Canonical plugin directory
    pub plugin_dir: PathBuf,
    /// Root the plugin was found under
    pub source: PluginSource,
}

impl PluginLoader {
    /// Loads a plugin by identifier.
    ///
    /// Steps, each of which fails the whole load:
    /// 1. validate the identifier and require a recognised prefix
    /// 2. resolve `plugin.json` across the roots, checking containment per root
    /// 3. load the manifest and check its name matches
    /// 4. resolve the entry point inside the plugin directory
    /// 5. re-check containment on canonical paths, then read and verify the code
    ///
    /// # Errors
    ///
    /// [`Error::InvalidIdentifier`], [`Error::PathEscape`],
    /// [`Error::ManifestError`] or [`Error::ModuleLoadError`] depending on the
    /// failing step.
    pub fn load_plugin(&self, identifier: &str) -> Result<LoadedPlugin> {
        validate_identifier(identifier)?;
        if !has_recognized_prefix(identifier, &self.config.prefixes) {
            tracing::warn!(plugin_id = identifier, "Rejected plugin without a recognised prefix");
            return Err(Error::InvalidIdentifier {
                identifier: identifier.to_string(),
                reason: "unrecognised plugin prefix".to_string(),
            });
        }

        let (source, manifest_path) = self.resolve_manifest_path(identifier)?;
        let manifest = load_manifest(&manifest_path)?;
        if manifest.name != identifier {
            return Err(Error::ManifestError {
                path: manifest_path,
                reason: format!("manifest name '{}' does not match '{identifier}'", manifest.name),
            });
        }

        let plugin_dir = manifest_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| load_error(identifier, "manifest has no parent directory"))?;
        let entry_path = resolve_entry_point(&plugin_dir, &manifest.entry_point)?;

        // Symlinks inside the plugin directory may point anywhere.
        let canonical_dir = fs::canonicalize(&plugin_dir)
            .map_err(|e| load_error(identifier, &format!("cannot resolve plugin directory: {e}")))?;
        let canonical_entry = fs::canonicalize(&entry_path).map_err(|e| {
            load_error(identifier, &format!("entry point '{}' not found: {e}", manifest.entry_point))
        })?;
        verify_containment(&canonical_entry, &canonical_dir)?;

        let module = read_module(identifier, &canonical_entry, manifest.checksum.as_deref())?;

        tracing::info!(
            plugin_id = identifier,
            version = %manifest.version,
            source = ?source,
            checksum = %module.checksum,
            "Loaded plugin"
        );

        Ok(LoadedPlugin {
            manifest,
            module,
            manifest_path,
            plugin_dir: canonical_dir,
            source,
        })
    }
}

/// Resolves a manifest entry point against the plugin directory.
///
/// Absolute entry points are refused outright; relative ones must stay inside
/// `plugin_dir`. An entry point without an extension gets `.wasm`.
///
/// # Errors
///
/// Returns [`Error::PathEscape`] for absolute or escaping entry points.
pub fn resolve_entry_point(plugin_dir: &Path, entry_point: &str) -> Result<PathBuf> {
    let entry = Path::new(entry_point);
    if entry.is_absolute() || entry_point.starts_with(['/', '\\']) || entry.has_root() {
        tracing::warn!(entry_point, "Rejected absolute plugin entry point");
        return Err(Error::PathEscape {
            path: entry.to_path_buf(),
            base: plugin_dir.to_path_buf(),
        });
    }

    let mut resolved = plugin_dir.join(entry);
    if resolved.extension().is_none() {
        resolved.set_extension(MODULE_EXTENSION);
    }
    verify_containment(&resolved, plugin_dir)?;
    Ok(resolved)
}

fn read_module(identifier: &str, path: &Path, pinned: Option<&str>) -> Result<PluginModule> {
    let metadata = fs::metadata(path)
        .map_err(|e| load_error(identifier, &format!("cannot stat entry point: {e}")))?;
    if !metadata.is_file() {
        return Err(load_error(identifier, "entry point is not a regular file"));
    }
    if metadata.len() > MAX_MODULE_BYTES {
        return Err(load_error(
            identifier,
            &format!("module is {} bytes, limit is {MAX_MODULE_BYTES}", metadata.len()),
        ));
    }

    let bytes = fs::read(path)
        .map_err(|e| load_error(identifier, &format!("cannot read entry point: {e}")))?;
    if !bytes.starts_with(WASM_MAGIC) {
        return Err(load_error(identifier, "entry point is not a WebAssembly module"));
    }

    let checksum = match pinned {
        Some(expected) => verify_checksum(identifier, &bytes, expected)?,
        None => calculate_checksum(&bytes),
    };

    Ok(PluginModule {
        bytes: Arc::from(bytes),
        checksum,
    })
}

fn load_error(plugin: &str, reason: &str) -> Error {
    Error::ModuleLoadError {
        plugin: plugin.to_string(),
        reason: reason.to_string(),
    }
}
