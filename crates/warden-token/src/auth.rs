//! Inbound authentication of plugin calls to the core API.

use crate::token::{TokenService, VerifiedToken};
use secrecy::SecretString;
use std::fmt;
use warden_core::{AuthFailure, Error};

/// Why an inbound request was refused, mapped to an HTTP status.
///
/// The response body never carries the reason; that only goes to the log.
#[derive(Debug)]
pub struct AuthRejection {
    status: u16,
    error: Error,
}

impl AuthRejection {
    const fn unauthorized(error: Error) -> Self {
        Self { status: 401, error }
    }

    const fn internal(error: Error) -> Self {
        Self { status: 500, error }
    }

    /// HTTP status: 401 for bad credentials, 500 for server-side faults.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        self.status
    }

    /// Response body safe to return to the caller.
    #[must_use]
    pub const fn body(&self) -> &'static str {
        if self.status == 401 {
            r#"{"error":"unauthorized"}"#
        } else {
            r#"{"error":"internal server error"}"#
        }
    }

    /// Underlying error, for logging.
    #[must_use]
    pub const fn error(&self) -> &Error {
        &self.error
    }
}

impl fmt::Display for AuthRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.status, self.error)
    }
}

impl std::error::Error for AuthRejection {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
#[must_use]
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

impl TokenService {
    /// Authenticates an inbound core API call from its `Authorization` header.
    ///
    /// A missing secret is a server fault (500).
    ///
    /// # Errors
    ///
    /// Returns an [`AuthRejection`] with status 401 or 500.
    pub async fn authenticate(
        &self,
        authorization: Option<&str>,
        secret: Option<&SecretString>,
    ) -> Result<VerifiedToken, AuthRejection> {
        let Some(secret) = secret else {
            tracing::error!("Plugin token secret is not configured; refusing request");
            return Err(AuthRejection::internal(Error::ConfigError {
                message: "plugin token secret is not configured".to_string(),
            }));
        };

        let Some(token) = authorization.and_then(bearer_token) else {
            tracing::warn!("Plugin request without bearer credentials");
            return Err(AuthRejection::unauthorized(Error::Unauthorized {
                reason: AuthFailure::MissingCredentials,
            }));
        };

        match self.verify(token, secret).await {
            Ok(claims) => Ok(claims),
            Err(e) if e.is_auth_failure() => {
                tracing::warn!(error = %e, "Plugin request rejected");
                Err(AuthRejection::unauthorized(e))
            }
            Err(e) => {
                tracing::error!(error = %e, "Plugin authentication failed");
                Err(AuthRejection::internal(e))
            }
        }
    }
}
