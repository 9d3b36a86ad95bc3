//! Strong domain types for the plugin trust boundary.
//!
//! Newtypes keep plugin and tenant identifiers from being swapped at call
//! sites that take both, which matters most in the token service where the
//! pair is signed together.
//!
//! # Examples
//!
//! ```
//! use warden_core::{PluginId, TenantId};
//!
//! let plugin = PluginId::new("warden-plugin-github");
//! let tenant = TenantId::new("acme");
//! assert_eq!(plugin.as_str(), "warden-plugin-github");
//! assert_eq!(tenant.to_string(), "acme");
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a string without validation.
            #[inline]
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the identifier as a string slice.
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the identifier and returns the inner `String`.
            #[inline]
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_newtype!(
    /// Plugin identifier, equal to the manifest `name`.
    PluginId
);

string_newtype!(
    /// Tenant identifier. Tokens are bound to exactly one tenant.
    TenantId
);

/// Inbound webhook delivered to a plugin handler.
///
/// Serialized as JSON and copied into the guest's memory; one per invocation.
///
/// # Examples
///
/// ```
/// use warden_core::WebhookRequest;
///
/// let request = WebhookRequest::new("POST", "/hooks/github")
///     .with_header("x-github-event", "push")
///     .with_body(r#"{"ref":"main"}"#);
/// assert_eq!(request.headers.get("x-github-event").map(String::as_str), Some("push"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookRequest {
    /// HTTP method
    pub method: String,
    /// Request path
    pub path: String,
    /// Header map (names as received)
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Raw body text
    #[serde(default)]
    pub body: String,
}

impl WebhookRequest {
    /// Creates a request with no headers and an empty body.
    #[must_use]
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers: BTreeMap::new(),
            body: String::new(),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }
}

/// Lifecycle of a single handler invocation.
///
/// `Pending → Running → {Succeeded, Failed, TimedOut}`. Terminal states are
/// final; the engine never retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationState {
    /// Created, sandbox not yet built
    Pending,
    /// Guest code is executing
    Running,
    /// Handler returned a boolean
    Succeeded,
    /// Handler trapped, broke its contract, or the sandbox failed
    Failed,
    /// Wall-clock budget exhausted
    TimedOut,
}

impl InvocationState {
    /// Returns `true` for `Succeeded`, `Failed` and `TimedOut`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::TimedOut)
    }

    /// Returns whether moving from `self` to `next` is a legal transition.
    ///
    /// # Examples
    ///
    /// ```
    /// use warden_core::InvocationState;
    ///
    /// assert!(InvocationState::Pending.can_transition_to(InvocationState::Running));
    /// assert!(InvocationState::Running.can_transition_to(InvocationState::TimedOut));
    /// assert!(!InvocationState::Succeeded.can_transition_to(InvocationState::Running));
    /// ```
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running | Self::Failed)
                | (Self::Running, Self::Succeeded | Self::Failed | Self::TimedOut)
        )
    }

    /// Returns the terminal state an execution outcome maps to.
    ///
    /// ```
    /// use warden_core::{Error, InvocationState};
    ///
    /// let timed_out: Result<(), Error> =
    ///     Err(Error::Timeout { operation: "handler".into(), duration_ms: 5 });
    /// assert_eq!(InvocationState::for_outcome(&timed_out), InvocationState::TimedOut);
    /// assert_eq!(InvocationState::for_outcome(&Ok::<_, Error>(true)), InvocationState::Succeeded);
    /// ```
    #[must_use]
    pub const fn for_outcome<T>(outcome: &crate::Result<T>) -> Self {
        match outcome {
            Ok(_) => Self::Succeeded,
            Err(e) if e.is_timeout() => Self::TimedOut,
            Err(_) => Self::Failed,
        }
    }

    /// Returns a stable label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for InvocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Successful handler outcome plus timing metadata for external logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Boolean returned by the handler
    pub value: bool,
    /// Wall-clock time spent in the sandbox
    pub elapsed: Duration,
    /// Host function calls made by the guest
    pub host_calls: usize,
}
