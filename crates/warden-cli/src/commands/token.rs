//! `warden token`: issue and verify plugin tokens.

use anyhow::Result;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::sync::Arc;
use warden_core::cli::{ExitCode, OutputFormat};
use warden_core::{Error, PluginId, TenantId, WardenConfig};
use warden_token::{MemoryNonceStore, TokenService, bearer_token};

use crate::actions::TokenAction;
use crate::formatters::format_output;

/// Result of `token issue`.
#[derive(Debug, Serialize)]
pub struct IssueResult {
    /// Plugin the token is bound to
    pub plugin_id: PluginId,
    /// Tenant the token is bound to
    pub tenant_id: TenantId,
    /// The token
    pub token: String,
}

/// Result of `token verify`.
#[derive(Debug, Serialize)]
pub struct VerifyResult {
    /// Plugin the token is bound to
    pub plugin_id: PluginId,
    /// Tenant the token is bound to
    pub tenant_id: TenantId,
    /// Unix seconds the token was minted at
    pub issued_at: i64,
}

/// Reads the HMAC secret named by `core.secret_env`.
///
/// # Errors
///
/// Returns [`Error::ConfigError`] if the variable is unset or empty.
pub fn secret(config: &WardenConfig) -> Result<SecretString> {
    Ok(config.resolve_secret().ok_or_else(|| Error::ConfigError {
        message: format!(
            "environment variable {} must hold the plugin token secret",
            config.core.secret_env
        ),
    })?)
}

/// Performs a token action against a process-local nonce store.
///
/// # Errors
///
/// Returns the token service error.
pub async fn handle(
    action: TokenAction,
    secret: &SecretString,
) -> Result<serde_json::Value> {
    let service = TokenService::new(Arc::new(MemoryNonceStore::new()));
    let value = match action {
        TokenAction::Issue { plugin, tenant } => {
            let plugin_id = PluginId::from(plugin.as_str());
            let tenant_id = TenantId::from(tenant.as_str());
            let token = service.issue(&plugin_id, &tenant_id, secret)?;
            serde_json::to_value(IssueResult {
                plugin_id,
                tenant_id,
                token: token.expose_secret().to_string(),
            })?
        }
        TokenAction::Verify { token } => {
            let token = bearer_token(&token).unwrap_or(&token);
            let claims = service.verify(token, secret).await?;
            serde_json::to_value(VerifyResult {
                plugin_id: claims.plugin_id,
                tenant_id: claims.tenant_id,
                issued_at: claims.issued_at,
            })?
        }
    };
    Ok(value)
}

/// Runs the token command.
///
/// # Errors
///
/// Returns an error if the secret is missing or the action fails.
pub async fn run(
    config: &WardenConfig,
    action: TokenAction,
    output_format: OutputFormat,
) -> Result<ExitCode> {
    let secret = secret(config)?;
    let value = handle(action, &secret).await?;
    println!("{}", format_output(&value, output_format)?);
    Ok(ExitCode::SUCCESS)
}
