//! `warden discover`: list installable plugins.

use anyhow::{Context, Result};
use serde::Serialize;
use warden_core::WardenConfig;
use warden_core::cli::{ExitCode, OutputFormat};
use warden_loader::{LoaderConfig, PluginLoader, PluginManifest};

use crate::formatters::format_output;

/// Result of a discovery scan.
#[derive(Debug, Serialize)]
pub struct DiscoverResult {
    /// Whether the external root was scanned
    pub production: bool,
    /// Number of plugins found
    pub plugin_count: usize,
    /// Manifests, sorted by name
    pub plugins: Vec<PluginManifest>,
}

/// Scans the configured roots.
///
/// # Errors
///
/// Returns an error if the roots cannot be resolved.
pub fn discover(config: &WardenConfig) -> Result<DiscoverResult> {
    let loader =
        PluginLoader::new(LoaderConfig::from(config)).context("failed to resolve plugin roots")?;
    let plugins = loader.discover_plugins();
    Ok(DiscoverResult {
        production: loader.config().production,
        plugin_count: plugins.len(),
        plugins,
    })
}

/// Runs the discover command.
///
/// # Errors
///
/// Returns an error if the scan or output formatting fails.
pub fn run(config: &WardenConfig, output_format: OutputFormat) -> Result<ExitCode> {
    let result = discover(config)?;
    tracing::info!(plugins = result.plugin_count, "Discovery finished");
    println!("{}", format_output(&result, output_format)?);
    Ok(ExitCode::SUCCESS)
}
