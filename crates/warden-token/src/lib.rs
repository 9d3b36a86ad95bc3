//! Plugin tokens for Warden.
//!
//! Each invocation gets a fresh HMAC-signed token binding the plugin to one
//! tenant. The core API accepts it once, inside a short validity window.
//!
//! # Examples
//!
//! ```
//! use secrecy::{ExposeSecret, SecretString};
//! use std::sync::Arc;
//! use warden_token::{MemoryNonceStore, TokenService};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let service = TokenService::new(Arc::new(MemoryNonceStore::new()));
//! let secret = SecretString::from("change-me".to_string());
//!
//! let token = service.issue(&"warden-plugin-github".into(), &"acme".into(), &secret)?;
//! let claims = service.verify(token.expose_secret(), &secret).await?;
//! assert_eq!(claims.tenant_id.as_str(), "acme");
//!
//! // Second use of the same token is a replay.
//! assert!(service.verify(token.expose_secret(), &secret).await.is_err());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]

mod auth;
mod janitor;
mod nonce;
mod token;

pub use auth::{AuthRejection, bearer_token};
pub use janitor::NonceJanitor;
pub use nonce::{ConsumedNonce, MemoryNonceStore, NonceStore};
pub use token::{
    CLOCK_SKEW_SECS, NONCE_RETENTION_SECS, TOKEN_VALIDITY_SECS, TokenService, VerifiedToken,
};
