//! `warden exec`: run a plugin handler against one webhook request.

use anyhow::{Context, Result};
use std::path::Path;
use warden_core::cli::{ExitCode, OutputFormat};
use warden_core::{InvocationState, PluginId, TenantId, WardenConfig, WebhookRequest};
use warden_runtime::{InvocationReport, PluginRuntime};

use crate::formatters::format_output;

/// Reads a JSON webhook request from `path`.
///
/// # Errors
///
/// Returns an error if the file is unreadable or not a request object.
pub fn read_request(path: &Path) -> Result<WebhookRequest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read request file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("invalid webhook request in {}", path.display()))
}

/// Enables `identifier` and invokes it once.
///
/// # Errors
///
/// Returns an error if the runtime cannot start or the plugin cannot be
/// enabled. Handler failures are part of the report.
pub async fn exec(
    config: WardenConfig,
    identifier: &str,
    tenant: &str,
    request: &WebhookRequest,
) -> Result<InvocationReport> {
    let runtime = PluginRuntime::new(config)?;
    let manifest = runtime.enable(identifier).await?;
    let report = runtime
        .invoke_webhook(
            &PluginId::from(manifest.name.as_str()),
            &TenantId::from(tenant),
            request,
        )
        .await?;
    Ok(report)
}

/// Exit code for an invocation outcome.
#[must_use]
pub const fn exit_code(state: InvocationState) -> ExitCode {
    match state {
        InvocationState::Succeeded => ExitCode::SUCCESS,
        InvocationState::TimedOut => ExitCode::TIMEOUT,
        _ => ExitCode::ERROR,
    }
}

/// Runs the exec command.
///
/// # Errors
///
/// See [`exec`].
pub async fn run(
    config: WardenConfig,
    identifier: &str,
    tenant: &str,
    request_file: Option<&Path>,
    path: &str,
    output_format: OutputFormat,
) -> Result<ExitCode> {
    let request = match request_file {
        Some(file) => read_request(file)?,
        None => WebhookRequest::new("POST", path),
    };

    let report = exec(config, identifier, tenant, &request).await?;
    println!("{}", format_output(&report, output_format)?);
    Ok(exit_code(report.state))
}
