//! Value types shared by the `warden` command-line interface.
//!
//! # Examples
//!
//! ```
//! use warden_core::cli::{ExitCode, OutputFormat};
//!
//! let format: OutputFormat = "json".parse().unwrap();
//! assert_eq!(format, OutputFormat::Json);
//! assert!(ExitCode::SUCCESS.is_success());
//! ```

use crate::Error;
use std::fmt;
use std::str::FromStr;

/// CLI output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutputFormat {
    /// JSON output for machine parsing
    Json,
    /// Plain text output for scripts
    Text,
    /// Indented, human-oriented output
    #[default]
    Pretty,
}

impl OutputFormat {
    /// Returns the string representation of the format.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "text",
            Self::Pretty => "pretty",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" => Ok(Self::Text),
            "pretty" => Ok(Self::Pretty),
            _ => Err(Error::InvalidArgument(format!(
                "invalid output format: '{s}' (expected: json, text, or pretty)"
            ))),
        }
    }
}

/// Process exit code with semantic meaning.
///
/// # Examples
///
/// ```
/// use warden_core::cli::ExitCode;
/// use warden_core::Error;
///
/// let err = Error::Timeout { operation: "handler".into(), duration_ms: 10 };
/// assert_eq!(ExitCode::from_error(&err), ExitCode::TIMEOUT);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExitCode(i32);

impl ExitCode {
    /// Successful execution.
    pub const SUCCESS: Self = Self(0);

    /// General error.
    pub const ERROR: Self = Self(1);

    /// Invalid input or arguments.
    pub const INVALID_INPUT: Self = Self(2);

    /// Identifier, path or egress violation.
    pub const SECURITY_VIOLATION: Self = Self(3);

    /// Handler exceeded its time budget.
    pub const TIMEOUT: Self = Self(4);

    /// Token rejected.
    pub const UNAUTHORIZED: Self = Self(5);

    /// Creates an exit code from an integer value.
    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        Self(code)
    }

    /// Maps an error to the exit code reported for it.
    #[must_use]
    pub const fn from_error(error: &Error) -> Self {
        if error.is_security_violation() {
            Self::SECURITY_VIOLATION
        } else if error.is_auth_failure() {
            Self::UNAUTHORIZED
        } else if error.is_timeout() {
            Self::TIMEOUT
        } else if matches!(
            error,
            Error::InvalidArgument(_) | Error::ConfigError { .. } | Error::ManifestError { .. }
        ) {
            Self::INVALID_INPUT
        } else {
            Self::ERROR
        }
    }

    /// Returns the exit code as an integer.
    #[must_use]
    pub const fn as_i32(&self) -> i32 {
        self.0
    }

    /// Checks if the exit code represents success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.0 == 0
    }
}

impl Default for ExitCode {
    fn default() -> Self {
        Self::SUCCESS
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
