//! Loader configuration and the shared root resolution logic.

use crate::manifest::MANIFEST_FILE;
use std::fs;
use std::path::{Path, PathBuf};
use warden_core::{DiscoverySettings, Error, Result, WardenConfig, verify_containment};

/// Where plugins live and which identifiers count as plugins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Root of declared-dependency plugins
    pub installed_root: PathBuf,
    /// Operator-controlled root, scanned only in production
    pub external_root: PathBuf,
    /// Whether `external_root` is consulted
    pub production: bool,
    /// Recognised identifier prefixes
    pub prefixes: Vec<String>,
    /// Declared plugin identifiers
    pub installed: Vec<String>,
}

impl LoaderConfig {
    /// Builds a loader configuration from the discovery section.
    #[must_use]
    pub fn from_settings(settings: &DiscoverySettings, production: bool) -> Self {
        Self {
            installed_root: settings.installed_root.clone(),
            external_root: settings.external_root.clone(),
            production,
            prefixes: settings.prefixes.clone(),
            installed: settings.installed.clone(),
        }
    }
}

impl From<&WardenConfig> for LoaderConfig {
    fn from(config: &WardenConfig) -> Self {
        Self::from_settings(&config.discovery, config.production_enabled())
    }
}

/// Discovers and loads plugins from the configured roots.
///
/// # Examples
///
/// ```no_run
/// use warden_loader::{LoaderConfig, PluginLoader};
/// use warden_core::WardenConfig;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = WardenConfig::default();
/// let loader = PluginLoader::new(LoaderConfig::from(&config))?;
/// for manifest in loader.discover_plugins() {
///     println!("{} {}", manifest.name, manifest.version);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct PluginLoader {
    pub(crate) config: LoaderConfig,
}

/// Which root a plugin was found under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginSource {
    /// Declared dependency under the installed root
    Installed,
    /// Subdirectory of the external root
    External,
}

impl PluginSource {
    /// Lowercase name, as shown by the CLI.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Installed => "installed",
            Self::External => "external",
        }
    }
}

impl PluginLoader {
    /// Creates a loader, making both roots absolute.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the current directory cannot be determined.
    pub fn new(mut config: LoaderConfig) -> Result<Self> {
        config.installed_root = std::path::absolute(&config.installed_root)?;
        config.external_root = std::path::absolute(&config.external_root)?;
        Ok(Self { config })
    }

    /// Returns the effective configuration.
    #[must_use]
    pub const fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Returns the root for a source.
    #[must_use]
    pub fn root(&self, source: PluginSource) -> &Path {
        match source {
            PluginSource::Installed => &self.config.installed_root,
            PluginSource::External => &self.config.external_root,
        }
    }

    /// Builds `<root>/<identifier>/plugin.json` and checks it stays under
    /// `root`. Scoped identifiers resolve two levels deep.
    pub(crate) fn manifest_path_under(&self, source: PluginSource, identifier: &str) -> Result<PathBuf> {
        let root = self.root(source);
        let path = root.join(identifier).join(MANIFEST_FILE);
        verify_containment(&path, root)?;
        Ok(path)
    }

    /// Finds the manifest for an already-validated identifier, trying the
    /// installed root first and, in production, the external root.
    pub(crate) fn resolve_manifest_path(&self, identifier: &str) -> Result<(PluginSource, PathBuf)> {
        let mut sources = vec![PluginSource::Installed];
        if self.config.production {
            sources.push(PluginSource::External);
        }

        for source in sources {
            let path = self.manifest_path_under(source, identifier)?;
            if path.is_file() {
                self.verify_canonical_manifest(source, identifier, &path)?;
                return Ok((source, path));
            }
        }

        Err(Error::ModuleLoadError {
            plugin: identifier.to_string(),
            reason: "plugin not found in any plugin root".to_string(),
        })
    }

    /// Re-checks a manifest found under `source` on canonical paths. A
    /// symlinked plugin directory or manifest must still resolve inside the
    /// canonical root.
    pub(crate) fn verify_canonical_manifest(
        &self,
        source: PluginSource,
        identifier: &str,
        manifest_path: &Path,
    ) -> Result<()> {
        let resolve = |path: &Path| {
            fs::canonicalize(path).map_err(|e| Error::ModuleLoadError {
                plugin: identifier.to_string(),
                reason: format!("cannot resolve {}: {e}", path.display()),
            })
        };

        let canonical_root = resolve(self.root(source))?;
        let plugin_dir = manifest_path.parent().unwrap_or(manifest_path);
        let canonical_dir = resolve(plugin_dir)?;
        let canonical_manifest = resolve(manifest_path)?;

        verify_containment(&canonical_dir, &canonical_root)?;
        verify_containment(&canonical_manifest, &canonical_dir)?;
        Ok(())
    }
}
