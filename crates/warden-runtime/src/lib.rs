//! Plugin runtime: the trust boundary between core and third-party plugins.
//!
//! Ties together discovery and loading ([`warden_loader`]), sandboxed
//! execution ([`warden_sandbox`]) and per-invocation tokens
//! ([`warden_token`]).
//!
//! # Lifecycle
//!
//! 1. [`PluginRuntime::discover`] lists installable plugins
//! 2. [`PluginRuntime::enable`] loads and compiles one, and registers its
//!    manifest hooks
//! 3. [`PluginRuntime::invoke_webhook`] and [`PluginRuntime::invoke_hooks`]
//!    run handlers, each with a freshly minted token
//! 4. [`PluginRuntime::authenticate`] verifies that token when the plugin
//!    calls back into the core API
//!
//! # Examples
//!
//! ```no_run
//! use warden_core::WardenConfig;
//! use warden_runtime::PluginRuntime;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let runtime = PluginRuntime::new(WardenConfig::default())?;
//! for manifest in runtime.discover() {
//!     runtime.enable(&manifest.name).await?;
//! }
//!
//! let report = runtime
//!     .invoke_hooks("push", &"acme".into(), &serde_json::json!({"ref": "main"}))
//!     .await;
//! for failure in report.failures() {
//!     eprintln!("{}: {:?}", failure.plugin_id, failure.error);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod hooks;
pub mod runtime;

pub use hooks::{HookHandler, HookOutcome, HookRegistry, HookReport};
pub use runtime::{InvocationReport, PluginRuntime, PluginRuntimeBuilder};
