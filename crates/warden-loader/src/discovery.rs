//! Plugin discovery.
//!
//! Two sources are scanned and concatenated, then sorted by name:
//! declared-dependency plugins under the installed root, and, in production,
//! subdirectories of the external root. Every candidate is filtered by a
//! recognised prefix and loaded in isolation; a broken plugin is logged and
//! skipped without affecting the rest of the catalog.

use crate::loader::{PluginLoader, PluginSource};
use crate::manifest::{PluginManifest, load_manifest};
use std::fs;
use warden_core::{Error, Result, has_recognized_prefix, validate_identifier};

impl PluginLoader {
    /// Discovers all loadable plugin manifests, sorted by name.
    #[must_use]
    pub fn discover_plugins(&self) -> Vec<PluginManifest> {
        let mut manifests = self.discover_installed();
        if self.config.production {
            manifests.extend(self.discover_external());
        }
        manifests.sort_by(|a, b| a.name.cmp(&b.name));

        tracing::info!(count = manifests.len(), "Plugin discovery complete");
        manifests
    }

    fn discover_installed(&self) -> Vec<PluginManifest> {
        self.config
            .installed
            .iter()
            .filter(|id| self.is_candidate(id))
            .filter_map(|id| self.try_load(PluginSource::Installed, id))
            .collect()
    }

    fn discover_external(&self) -> Vec<PluginManifest> {
        let root = self.root(PluginSource::External);
        let candidates = match list_candidates(root) {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!(root = %root.display(), error = %e, "Cannot scan external plugin root");
                return Vec::new();
            }
        };

        candidates
            .iter()
            .filter(|id| self.is_candidate(id))
            .filter_map(|id| self.try_load(PluginSource::External, id))
            .collect()
    }

    fn is_candidate(&self, identifier: &str) -> bool {
        let recognised = has_recognized_prefix(identifier, &self.config.prefixes);
        if !recognised {
            tracing::debug!(identifier, "Skipping entry without a recognised plugin prefix");
        }
        recognised
    }

    fn try_load(&self, source: PluginSource, identifier: &str) -> Option<PluginManifest> {
        match self.load_candidate(source, identifier) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                tracing::warn!(
                    plugin_id = identifier,
                    source = ?source,
                    error = %e,
                    "Skipping plugin with invalid manifest"
                );
                None
            }
        }
    }

    fn load_candidate(&self, source: PluginSource, identifier: &str) -> Result<PluginManifest> {
        validate_identifier(identifier)?;
        let path = self.manifest_path_under(source, identifier)?;
        if path.is_file() {
            self.verify_canonical_manifest(source, identifier, &path)?;
        }
        let manifest = load_manifest(&path)?;
        if manifest.name != identifier {
            return Err(Error::ManifestError {
                path,
                reason: format!("manifest name '{}' does not match '{identifier}'", manifest.name),
            });
        }
        Ok(manifest)
    }
}

/// Lists directory names under `root`, descending one level into `@scope`
/// directories to yield `@scope/name` identifiers.
fn list_candidates(root: &std::path::Path) -> std::io::Result<Vec<String>> {
    let mut candidates = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };

        if name.starts_with('@') {
            let Ok(scoped) = fs::read_dir(entry.path()) else {
                continue;
            };
            for inner in scoped.flatten() {
                if inner.file_type().is_ok_and(|t| t.is_dir())
                    && let Some(local) = inner.file_name().to_str()
                {
                    candidates.push(format!("{name}/{local}"));
                }
            }
        } else {
            candidates.push(name);
        }
    }
    Ok(candidates)
}
