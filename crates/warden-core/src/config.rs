//! Warden configuration file.
//!
//! Configuration is read from TOML. Every section is optional and falls back
//! to its defaults, so an empty file is a valid configuration.
//!
//! ```toml
//! [core]
//! base_url = "https://core.example.com/api"
//! secret_env = "WARDEN_PLUGIN_SECRET"
//!
//! [discovery]
//! installed_root = "/srv/warden/node_plugins"
//! external_root = "/opt/warden/plugins"
//! production = false
//! prefixes = ["warden-plugin-", "@warden/plugin-"]
//! installed = ["warden-plugin-github"]
//!
//! [sandbox]
//! timeout_ms = 5000
//! memory_limit_mb = 64
//! max_host_calls = 256
//! max_response_bytes = 1048576
//!
//! [egress]
//! "warden-plugin-github" = ["https://api.github.com"]
//!
//! [tokens]
//! cleanup_interval_secs = 60
//! ```
//!
//! # Examples
//!
//! ```
//! use warden_core::WardenConfig;
//!
//! let config = WardenConfig::from_toml_str(
//!     r#"
//!     [sandbox]
//!     timeout_ms = 250
//!     "#,
//! )
//! .unwrap();
//! assert_eq!(config.sandbox.timeout_ms, 250);
//! assert_eq!(config.sandbox.memory_limit_mb, 64);
//! ```

use crate::{Error, Result};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Environment variable that turns production discovery on when set to
/// `production`.
pub const PRODUCTION_ENV: &str = "WARDEN_ENV";

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct WardenConfig {
    /// Core API settings
    #[serde(default)]
    pub core: CoreSettings,

    /// Plugin discovery roots and filters
    #[serde(default)]
    pub discovery: DiscoverySettings,

    /// Execution limits
    #[serde(default)]
    pub sandbox: SandboxSettings,

    /// Per-plugin outbound origin allowlists, keyed by plugin id
    #[serde(default)]
    pub egress: BTreeMap<String, Vec<String>>,

    /// Token housekeeping
    #[serde(default)]
    pub tokens: TokenSettings,
}

/// Core API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CoreSettings {
    /// Base URL plugins call back into; its origin is implicitly allowlisted
    pub base_url: String,

    /// Name of the environment variable holding the HMAC secret
    pub secret_env: String,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/api".to_string(),
            secret_env: "WARDEN_PLUGIN_SECRET".to_string(),
        }
    }
}

/// Where plugins are found.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DiscoverySettings {
    /// Directory holding declared-dependency plugins, one subdirectory per id
    pub installed_root: PathBuf,

    /// Operator-controlled directory scanned in production
    pub external_root: PathBuf,

    /// Scan `external_root` as well
    pub production: bool,

    /// Recognised identifier prefixes
    pub prefixes: Vec<String>,

    /// Declared plugin identifiers
    pub installed: Vec<String>,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            installed_root: PathBuf::from("plugins"),
            external_root: PathBuf::from("/opt/warden/plugins"),
            production: false,
            prefixes: vec!["warden-plugin-".to_string(), "@warden/plugin-".to_string()],
            installed: Vec::new(),
        }
    }
}

/// Execution limits applied to every invocation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SandboxSettings {
    /// Wall-clock budget per invocation in milliseconds
    pub timeout_ms: u64,

    /// Linear memory ceiling per instance in megabytes
    pub memory_limit_mb: u32,

    /// Host function calls allowed per invocation
    pub max_host_calls: usize,

    /// Largest outbound response body handed to a guest
    pub max_response_bytes: usize,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            memory_limit_mb: 64,
            max_host_calls: 256,
            max_response_bytes: 1024 * 1024,
        }
    }
}

impl SandboxSettings {
    /// Returns the timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Token housekeeping.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TokenSettings {
    /// Seconds between consumed-nonce purges
    pub cleanup_interval_secs: u64,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: 60,
        }
    }
}

impl WardenConfig {
    /// Reads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read, or
    /// [`Error::ConfigError`] if it does not parse or validate.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parses and validates configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] on parse or validation failure.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| Error::ConfigError {
            message: format!("failed to parse config: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.sandbox.timeout_ms == 0 {
            return Err(config_error("sandbox.timeout_ms must be greater than zero"));
        }
        if self.sandbox.memory_limit_mb == 0 {
            return Err(config_error("sandbox.memory_limit_mb must be greater than zero"));
        }
        if self.sandbox.max_host_calls == 0 {
            return Err(config_error("sandbox.max_host_calls must be greater than zero"));
        }
        if self.tokens.cleanup_interval_secs == 0 {
            return Err(config_error(
                "tokens.cleanup_interval_secs must be greater than zero",
            ));
        }

        self.core_base_url()?;

        if self.discovery.prefixes.is_empty()
            || self.discovery.prefixes.iter().any(String::is_empty)
        {
            return Err(config_error("discovery.prefixes must be non-empty strings"));
        }

        for (plugin, origins) in &self.egress {
            for origin in origins {
                parse_origin(origin).map_err(|reason| Error::ConfigError {
                    message: format!("egress entry '{origin}' for '{plugin}': {reason}"),
                })?;
            }
        }

        Ok(())
    }

    /// Parses `core.base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the URL is invalid or not http(s).
    pub fn core_base_url(&self) -> Result<Url> {
        let url = Url::parse(&self.core.base_url).map_err(|e| Error::ConfigError {
            message: format!("core.base_url '{}' is invalid: {e}", self.core.base_url),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::ConfigError {
                message: format!("core.base_url must use http or https, got '{}'", url.scheme()),
            });
        }
        Ok(url)
    }

    /// Returns the allowlisted origins configured for a plugin.
    #[must_use]
    pub fn egress_for(&self, plugin_id: &str) -> &[String] {
        self.egress.get(plugin_id).map_or(&[], Vec::as_slice)
    }

    /// Returns whether the external plugin root is scanned.
    #[must_use]
    pub fn production_enabled(&self) -> bool {
        self.discovery.production
            || std::env::var(PRODUCTION_ENV).is_ok_and(|value| value == "production")
    }

    /// Reads the HMAC secret from the environment variable named in
    /// `core.secret_env`.
    ///
    /// Returns `None` when the variable is unset or empty. Inbound
    /// authentication treats that as a server misconfiguration.
    #[must_use]
    pub fn resolve_secret(&self) -> Option<SecretString> {
        match std::env::var(&self.core.secret_env) {
            Ok(value) if !value.is_empty() => Some(SecretString::from(value)),
            _ => {
                tracing::warn!(
                    env = %self.core.secret_env,
                    "Plugin token secret is not configured"
                );
                None
            }
        }
    }
}

/// Parses a bare `scheme://host[:port]` origin.
///
/// Paths other than `/`, queries, fragments and credentials are refused so
/// that an allowlist entry always names exactly one origin.
///
/// # Errors
///
/// Returns a description of the problem.
pub fn parse_origin(value: &str) -> std::result::Result<url::Origin, String> {
    let url = Url::parse(value).map_err(|e| e.to_string())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("scheme '{}' is not http or https", url.scheme()));
    }
    if url.host().is_none() {
        return Err("missing host".to_string());
    }
    if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
        return Err("must be an origin without path, query or fragment".to_string());
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err("must not carry credentials".to_string());
    }
    Ok(url.origin())
}

fn config_error(message: &str) -> Error {
    Error::ConfigError {
        message: message.to_string(),
    }
}
