//! `warden load`: load and compile a plugin without running it.

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use warden_core::cli::{ExitCode, OutputFormat};
use warden_core::{PluginId, WardenConfig};
use warden_loader::{LoaderConfig, PluginLoader};
use warden_sandbox::{Sandbox, SandboxConfig};

use crate::formatters::format_output;

/// Result of loading a plugin.
#[derive(Debug, Serialize)]
pub struct LoadResult {
    /// Plugin identifier
    pub name: String,
    /// Plugin version
    pub version: String,
    /// Root the plugin was found under
    pub source: &'static str,
    /// Canonical plugin directory
    pub plugin_dir: String,
    /// Module checksum
    pub checksum: String,
    /// Module size in bytes
    pub module_bytes: usize,
    /// Hook name to priority
    pub hooks: BTreeMap<String, i32>,
}

/// Loads `identifier` and compiles its module.
///
/// # Errors
///
/// Returns the loader or compilation error.
pub fn load(config: &WardenConfig, identifier: &str) -> Result<LoadResult> {
    let loader = PluginLoader::new(LoaderConfig::from(config))?;
    let plugin = loader.load_plugin(identifier)?;

    let sandbox = Sandbox::new(SandboxConfig::from_settings(&config.sandbox))?;
    sandbox.compile(&PluginId::from(plugin.manifest.name.as_str()), &plugin.module.bytes)?;

    Ok(LoadResult {
        name: plugin.manifest.name,
        version: plugin.manifest.version,
        source: plugin.source.as_str(),
        plugin_dir: plugin.plugin_dir.display().to_string(),
        checksum: plugin.module.checksum,
        module_bytes: plugin.module.bytes.len(),
        hooks: plugin.manifest.hooks,
    })
}

/// Runs the load command.
///
/// # Errors
///
/// Returns an error if the plugin cannot be loaded or compiled.
pub fn run(config: &WardenConfig, identifier: &str, output_format: OutputFormat) -> Result<ExitCode> {
    let result = load(config, identifier)?;
    println!("{}", format_output(&result, output_format)?);
    Ok(ExitCode::SUCCESS)
}
