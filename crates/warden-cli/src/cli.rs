//! CLI argument definitions and parsing.
//!
//! - `Cli` - main entry point and global flags
//! - `Commands` - available subcommands

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::actions::TokenAction;

/// Warden - sandboxed plugin runtime.
///
/// Discovers plugins, loads and compiles their WebAssembly handlers, runs
/// them under time, memory and egress limits, and issues the tokens they use
/// to call back into core.
#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (json, text, pretty)
    #[arg(long = "format", global = true, default_value = "pretty")]
    pub format: String,

    /// Log line format on stderr
    #[arg(long = "log-format", global = true, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Configuration file (default: <config dir>/warden/config.toml)
    #[arg(short, long, global = true, env = "WARDEN_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Log output style.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// One JSON object per line
    Json,
    /// Human-readable lines
    #[default]
    Pretty,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List installable plugins.
    ///
    /// Scans the installed root and, in production, the external root.
    /// Plugins with unreadable or invalid manifests are skipped.
    ///
    /// # Examples
    ///
    /// ```bash
    /// warden discover --format json
    /// ```
    Discover,

    /// Load and compile a plugin without running it.
    ///
    /// Validates the identifier, manifest, entry point containment and module
    /// checksum, then compiles the module.
    ///
    /// # Examples
    ///
    /// ```bash
    /// warden load warden-plugin-github
    /// ```
    Load {
        /// Plugin identifier
        plugin: String,
    },

    /// Run a plugin's handler against one webhook request.
    ///
    /// The request file holds a JSON object
    /// `{"method", "path", "headers", "body"}`; without one, a `POST` with an
    /// empty body is sent to `--path`.
    ///
    /// # Examples
    ///
    /// ```bash
    /// WARDEN_PLUGIN_SECRET=... warden exec warden-plugin-github \
    ///     --tenant acme --request push.json
    /// ```
    Exec {
        /// Plugin identifier
        plugin: String,

        /// Tenant the invocation runs for
        #[arg(short, long)]
        tenant: String,

        /// JSON file with the webhook request
        #[arg(short, long)]
        request: Option<PathBuf>,

        /// Request path when no request file is given
        #[arg(long, default_value = "/hooks/webhook", conflicts_with = "request")]
        path: String,
    },

    /// Issue or verify plugin tokens.
    Token {
        /// Token action
        #[command(subcommand)]
        action: TokenAction,
    },
}
