//! Error types for the Warden plugin trust boundary.
//!
//! Every library crate in the workspace reports failures through [`Error`].
//! The variants follow the security taxonomy of the subsystem: identifier and
//! path violations, manifest and module failures, sandbox contract breaches,
//! egress denials and token rejections.
//!
//! # Examples
//!
//! ```
//! use warden_core::{Error, Result};
//!
//! fn require_version(version: &str) -> Result<()> {
//!     if version.trim().is_empty() {
//!         return Err(Error::ManifestError {
//!             path: "/plugins/demo/plugin.json".into(),
//!             reason: "missing required field 'version'".to_string(),
//!         });
//!     }
//!     Ok(())
//! }
//!
//! let err = require_version("").unwrap_err();
//! assert!(err.is_manifest_error());
//! assert!(!err.public_message().contains("/plugins"));
//! ```

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Reason a bearer token was rejected before its window or nonce were checked.
///
/// Only visible in internal telemetry; callers of the core API always see a
/// single generic "unauthorized" answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthFailure {
    /// Header absent, or not of the form `Bearer <token>`.
    MissingCredentials,
    /// Token is not exactly two non-empty `.`-separated parts.
    MalformedToken,
    /// Payload is not base64, not UTF-8, or not four `:`-separated fields.
    MalformedPayload,
    /// HMAC over the payload does not match the provided signature.
    InvalidSignature,
    /// Timestamp field is not an integer.
    InvalidTimestamp,
}

impl AuthFailure {
    /// Returns a stable label for logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MissingCredentials => "missing_credentials",
            Self::MalformedToken => "malformed_token",
            Self::MalformedPayload => "malformed_payload",
            Self::InvalidSignature => "invalid_signature",
            Self::InvalidTimestamp => "invalid_timestamp",
        }
    }
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for the plugin trust boundary.
#[derive(Error, Debug)]
pub enum Error {
    /// Plugin identifier failed validation.
    ///
    /// Security violation: never retried.
    #[error("Invalid plugin identifier '{identifier}': {reason}")]
    InvalidIdentifier {
        /// The rejected identifier
        identifier: String,
        /// Why it was rejected
        reason: String,
    },

    /// A path derived from plugin-declared data escapes its base directory.
    ///
    /// Security violation: never retried.
    #[error("Path {} escapes base directory {}", path.display(), base.display())]
    PathEscape {
        /// Offending resolved path
        path: PathBuf,
        /// Directory the path had to stay inside
        base: PathBuf,
    },

    /// Manifest file missing, unreadable, unparseable or incomplete.
    #[error("Invalid manifest {}: {reason}", path.display())]
    ManifestError {
        /// Manifest location
        path: PathBuf,
        /// Description of the problem
        reason: String,
    },

    /// Plugin code could not be resolved or loaded.
    #[error("Failed to load plugin '{plugin}': {reason}")]
    ModuleLoadError {
        /// Plugin identifier
        plugin: String,
        /// Description of the failure
        reason: String,
    },

    /// The handler broke the sandbox contract (missing export, wrong return type).
    #[error("Handler contract violated: {reason}")]
    HandlerContractError {
        /// What the handler did wrong
        reason: String,
    },

    /// Operation exceeded its wall-clock budget.
    #[error("Operation timed out after {duration_ms}ms: {operation}")]
    Timeout {
        /// Name of the operation that timed out
        operation: String,
        /// Budget in milliseconds
        duration_ms: u64,
    },

    /// Outbound request to an origin outside the plugin's allowlist.
    #[error("Outbound request to {origin} is not allowed")]
    DomainNotAllowed {
        /// Serialized origin of the rejected URL
        origin: String,
    },

    /// Token rejected before the validity window was evaluated.
    #[error("Unauthorized: {reason}")]
    Unauthorized {
        /// Internal reason
        reason: AuthFailure,
    },

    /// Token outside its validity window.
    #[error("Token expired: issued at {issued_at}, now {now}")]
    TokenExpired {
        /// Embedded issue timestamp (epoch seconds)
        issued_at: i64,
        /// Verification time (epoch seconds)
        now: i64,
    },

    /// Token nonce already consumed.
    #[error("Token replay detected for plugin '{plugin_id}'")]
    TokenReplay {
        /// Plugin the replayed token was issued to
        plugin_id: String,
    },

    /// Guest code trapped or a host function failed during execution.
    #[error("Execution failed: {message}")]
    ExecutionError {
        /// Description of the failure
        message: String,
    },

    /// Wasmtime engine, compilation or linking failure.
    #[error("WASM error: {message}")]
    WasmError {
        /// Description of the failure
        message: String,
    },

    /// Outbound HTTP transport failure.
    #[error("HTTP error: {message}")]
    HttpError {
        /// Description of the failure
        message: String,
    },

    /// Consumed-nonce persistence failure.
    #[error("Storage error: {message}")]
    StorageError {
        /// Description of the failure
        message: String,
    },

    /// Configuration is invalid or incomplete.
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration problem
        message: String,
    },

    /// Invalid argument passed by a caller.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O error from filesystem access.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns `true` for identifier and path violations.
    ///
    /// # Examples
    ///
    /// ```
    /// use warden_core::Error;
    ///
    /// let err = Error::InvalidIdentifier {
    ///     identifier: "../etc".to_string(),
    ///     reason: "parent directory reference".to_string(),
    /// };
    /// assert!(err.is_security_violation());
    /// ```
    #[must_use]
    pub const fn is_security_violation(&self) -> bool {
        matches!(
            self,
            Self::InvalidIdentifier { .. } | Self::PathEscape { .. } | Self::DomainNotAllowed { .. }
        )
    }

    /// Returns `true` if this error rejects an inbound token.
    ///
    /// # Examples
    ///
    /// ```
    /// use warden_core::Error;
    ///
    /// let err = Error::TokenReplay { plugin_id: "warden-plugin-demo".to_string() };
    /// assert!(err.is_auth_failure());
    /// ```
    #[must_use]
    pub const fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized { .. } | Self::TokenExpired { .. } | Self::TokenReplay { .. }
        )
    }

    /// Returns `true` if this is a timeout error.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if this is a manifest error.
    #[must_use]
    pub const fn is_manifest_error(&self) -> bool {
        matches!(self, Self::ManifestError { .. })
    }

    /// Returns `true` if this is a handler contract violation.
    #[must_use]
    pub const fn is_contract_error(&self) -> bool {
        matches!(self, Self::HandlerContractError { .. })
    }

    /// Returns `true` if a caller may reasonably retry the operation.
    ///
    /// Only infrastructure failures qualify. Security and contract failures
    /// are final, and invocation timeouts are left to the caller's own policy.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::HttpError { .. } | Self::StorageError { .. })
    }

    /// Renders a message safe to show outside the server.
    ///
    /// Filesystem paths are never included, and every token rejection
    /// collapses to `"unauthorized"` so verification cannot be used as an
    /// oracle.
    ///
    /// # Examples
    ///
    /// ```
    /// use warden_core::{AuthFailure, Error};
    ///
    /// let expired = Error::TokenExpired { issued_at: 0, now: 1_000 };
    /// let forged = Error::Unauthorized { reason: AuthFailure::InvalidSignature };
    /// assert_eq!(expired.public_message(), forged.public_message());
    /// ```
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::InvalidIdentifier { identifier, .. } => {
                format!("invalid plugin identifier '{identifier}'")
            }
            Self::PathEscape { .. } => "plugin path is outside its directory".to_string(),
            Self::ManifestError { .. } => "plugin manifest is invalid".to_string(),
            Self::ModuleLoadError { plugin, .. } => format!("plugin '{plugin}' could not be loaded"),
            Self::HandlerContractError { .. } | Self::ExecutionError { .. } => {
                "plugin handler failed".to_string()
            }
            Self::Timeout { .. } => "plugin handler timed out".to_string(),
            Self::DomainNotAllowed { origin } => format!("outbound request to {origin} denied"),
            Self::Unauthorized { .. } | Self::TokenExpired { .. } | Self::TokenReplay { .. } => {
                "unauthorized".to_string()
            }
            Self::ConfigError { .. } => "server misconfigured".to_string(),
            Self::InvalidArgument(msg) => format!("invalid argument: {msg}"),
            Self::WasmError { .. }
            | Self::HttpError { .. }
            | Self::StorageError { .. }
            | Self::Io(_)
            | Self::Json(_) => "internal error".to_string(),
        }
    }
}

/// Result type alias for Warden operations.
pub type Result<T> = std::result::Result<T, Error>;
