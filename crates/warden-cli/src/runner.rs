//! Command dispatch, configuration loading and logging setup.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use warden_core::WardenConfig;
use warden_core::cli::{ExitCode, OutputFormat};

use crate::cli::{Commands, LogFormat};
use crate::commands;

/// Initializes logging to stderr.
///
/// `--verbose` forces the `debug` level; otherwise `RUST_LOG` applies,
/// defaulting to `info`.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging(verbose: bool, format: LogFormat) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?,
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()?,
    }
    Ok(())
}

/// Default configuration file location.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("warden").join("config.toml"))
}

/// Loads configuration from `path`, or from the default location if it
/// exists, or falls back to built-in defaults.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is invalid.
pub fn load_config(path: Option<&Path>) -> Result<WardenConfig> {
    if let Some(path) = path {
        return WardenConfig::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()));
    }

    match default_config_path() {
        Some(path) if path.is_file() => WardenConfig::load(&path)
            .with_context(|| format!("failed to load configuration from {}", path.display())),
        _ => {
            tracing::debug!("No configuration file found, using defaults");
            let config = WardenConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

/// Maps a command error to the process exit code.
#[must_use]
pub fn exit_code_for(error: &anyhow::Error) -> ExitCode {
    error
        .downcast_ref::<warden_core::Error>()
        .map_or(ExitCode::ERROR, ExitCode::from_error)
}

/// Executes the specified CLI command.
///
/// # Errors
///
/// Returns an error if the command fails.
pub async fn execute_command(
    command: Commands,
    config: WardenConfig,
    output_format: OutputFormat,
) -> Result<ExitCode> {
    match command {
        Commands::Discover => commands::discover::run(&config, output_format),
        Commands::Load { plugin } => commands::load::run(&config, &plugin, output_format),
        Commands::Exec {
            plugin,
            tenant,
            request,
            path,
        } => {
            commands::exec::run(
                config,
                &plugin,
                &tenant,
                request.as_deref(),
                &path,
                output_format,
            )
            .await
        }
        Commands::Token { action } => commands::token::run(&config, action, output_format).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use warden_core::{AuthFailure, Error};

    #[test]
    fn test_load_config_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[sandbox]\ntimeout_ms = 250\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.sandbox.timeout_ms, 250);
    }

    #[test]
    fn test_load_config_invalid_file_keeps_error_type() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[sandbox]\ntimeout_ms = 0\n").unwrap();

        let err = load_config(Some(&path)).unwrap_err();
        assert!(format!("{err:#}").contains("timeout_ms"));
        assert_eq!(exit_code_for(&err), ExitCode::INVALID_INPUT);
    }

    #[test]
    fn test_exit_code_for_foreign_errors() {
        let err = anyhow::anyhow!("something else");
        assert_eq!(exit_code_for(&err), ExitCode::ERROR);

        let err = anyhow::Error::new(Error::Unauthorized {
            reason: AuthFailure::InvalidSignature,
        })
        .context("verify failed");
        assert_eq!(exit_code_for(&err), ExitCode::UNAUTHORIZED);
    }
}
