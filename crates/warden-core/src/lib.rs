//! Core types, errors, configuration and path guards for Warden.
//!
//! Warden is the trust boundary between a multi-tenant host and the
//! third-party plugins it runs. This crate holds what every other crate in
//! the workspace shares:
//!
//! - the [`Error`] taxonomy and [`Result`] alias
//! - strong identifiers ([`PluginId`], [`TenantId`]) and invocation types
//! - identifier validation and path containment ([`validation`])
//! - the TOML configuration ([`WardenConfig`])
//! - CLI value types ([`cli`])

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]

mod config;
mod error;
mod types;

pub mod cli;
pub mod validation;

pub use config::{
    CoreSettings, DiscoverySettings, PRODUCTION_ENV, SandboxSettings, TokenSettings,
    WardenConfig, parse_origin,
};
pub use error::{AuthFailure, Error, Result};
pub use types::{ExecutionResult, InvocationState, PluginId, TenantId, WebhookRequest};
pub use validation::{has_recognized_prefix, validate_identifier, verify_containment};
