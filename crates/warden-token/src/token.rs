//! Short-lived HMAC tokens binding a plugin to one tenant.
//!
//! ```text
//! token   = base64(payload) "." hex(HMAC-SHA256(payload, secret))
//! payload = plugin_id ":" tenant_id ":" issued_at ":" nonce
//! ```
//!
//! A token is accepted once, from 30 seconds before its timestamp until 330
//! seconds after it.

use crate::nonce::{ConsumedNonce, NonceStore};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use std::sync::Arc;
use warden_core::{AuthFailure, Error, PluginId, Result, TenantId};

type HmacSha256 = Hmac<Sha256>;

/// Seconds a token stays valid after its timestamp.
pub const TOKEN_VALIDITY_SECS: i64 = 300;

/// Clock skew tolerated on either side of the validity window.
pub const CLOCK_SKEW_SECS: i64 = 30;

/// Age after which a consumed nonce can no longer matter.
pub const NONCE_RETENTION_SECS: i64 = TOKEN_VALIDITY_SECS + 2 * CLOCK_SKEW_SECS;

const NONCE_BYTES: usize = 32;

/// Length of a hex-encoded HMAC-SHA256 tag.
const SIGNATURE_HEX_LEN: usize = 64;

/// Claims of a token that passed every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    /// Plugin the token was minted for
    pub plugin_id: PluginId,
    /// Tenant the token was minted for
    pub tenant_id: TenantId,
    /// Nonce, now consumed
    pub nonce: String,
    /// Unix seconds the token was minted at
    pub issued_at: i64,
}

/// Issues and verifies plugin tokens.
///
/// Cheap to clone; clones share the nonce store.
#[derive(Debug, Clone)]
pub struct TokenService {
    nonces: Arc<dyn NonceStore>,
}

impl TokenService {
    /// Creates a service backed by `nonces`.
    #[must_use]
    pub fn new(nonces: Arc<dyn NonceStore>) -> Self {
        Self { nonces }
    }

    /// Consumed-nonce store.
    #[must_use]
    pub fn nonce_store(&self) -> &Arc<dyn NonceStore> {
        &self.nonces
    }

    /// Mints a token with a fresh nonce and the current time.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if an identifier is empty or contains `:`
    /// - [`Error::ConfigError`] if the secret is empty
    pub fn issue(
        &self,
        plugin_id: &PluginId,
        tenant_id: &TenantId,
        secret: &SecretString,
    ) -> Result<SecretString> {
        self.issue_at(plugin_id, tenant_id, secret, Utc::now().timestamp())
    }

    /// Mints a token stamped with `issued_at` (Unix seconds).
    ///
    /// # Errors
    ///
    /// Same as [`TokenService::issue`].
    pub fn issue_at(
        &self,
        plugin_id: &PluginId,
        tenant_id: &TenantId,
        secret: &SecretString,
        issued_at: i64,
    ) -> Result<SecretString> {
        for (field, value) in [("plugin id", plugin_id.as_str()), ("tenant id", tenant_id.as_str())] {
            if value.is_empty() || value.contains(':') {
                return Err(Error::InvalidArgument(format!(
                    "{field} must be non-empty and free of ':'"
                )));
            }
        }

        let nonce = hex::encode(rand::random::<[u8; NONCE_BYTES]>());
        let payload = format!("{plugin_id}:{tenant_id}:{issued_at}:{nonce}");
        let signature = hex::encode(sign(secret, payload.as_bytes())?.finalize().into_bytes());

        tracing::debug!(
            plugin_id = %plugin_id,
            tenant_id = %tenant_id,
            issued_at,
            "Plugin token issued"
        );
        Ok(SecretString::from(format!(
            "{}.{signature}",
            STANDARD.encode(payload)
        )))
    }

    /// Verifies a token against the current time and consumes its nonce.
    ///
    /// # Errors
    ///
    /// - [`Error::Unauthorized`] for malformed tokens and bad signatures
    /// - [`Error::TokenExpired`] outside the validity window
    /// - [`Error::TokenReplay`] if the nonce was already consumed
    /// - [`Error::StorageError`] if the nonce store fails
    pub async fn verify(&self, token: &str, secret: &SecretString) -> Result<VerifiedToken> {
        self.verify_at(token, secret, Utc::now().timestamp()).await
    }

    /// Verifies a token as of `now` (Unix seconds).
    ///
    /// Nothing in the payload is trusted before the signature matches.
    ///
    /// # Errors
    ///
    /// Same as [`TokenService::verify`].
    pub async fn verify_at(
        &self,
        token: &str,
        secret: &SecretString,
        now: i64,
    ) -> Result<VerifiedToken> {
        let (encoded, signature) = match token.split('.').collect::<Vec<_>>().as_slice() {
            [encoded, signature] if !encoded.is_empty() && !signature.is_empty() => {
                (*encoded, *signature)
            }
            _ => return Err(unauthorized(AuthFailure::MalformedToken)),
        };

        let payload = STANDARD
            .decode(encoded)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or_else(|| unauthorized(AuthFailure::MalformedPayload))?;
        let [plugin_id, tenant_id, issued_at, nonce] = split_payload(&payload)?;

        // Lowercase only: `hex::decode` also accepts uppercase digits.
        if signature.len() != SIGNATURE_HEX_LEN
            || !signature.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        {
            return Err(unauthorized(AuthFailure::InvalidSignature));
        }
        let provided =
            hex::decode(signature).map_err(|_| unauthorized(AuthFailure::InvalidSignature))?;
        sign(secret, payload.as_bytes())?
            .verify_slice(&provided)
            .map_err(|_| unauthorized(AuthFailure::InvalidSignature))?;

        let issued_at: i64 = issued_at
            .parse()
            .map_err(|_| unauthorized(AuthFailure::InvalidTimestamp))?;

        let not_before = issued_at.saturating_sub(CLOCK_SKEW_SECS);
        let not_after = issued_at.saturating_add(TOKEN_VALIDITY_SECS + CLOCK_SKEW_SECS);
        if now < not_before || now > not_after {
            tracing::warn!(plugin_id, tenant_id, issued_at, now, "Expired plugin token");
            return Err(Error::TokenExpired { issued_at, now });
        }

        let claims = VerifiedToken {
            plugin_id: PluginId::from(plugin_id),
            tenant_id: TenantId::from(tenant_id),
            nonce: nonce.to_string(),
            issued_at,
        };

        let fresh = self
            .nonces
            .consume(ConsumedNonce {
                tenant_id: claims.tenant_id.clone(),
                plugin_id: claims.plugin_id.clone(),
                nonce: claims.nonce.clone(),
                consumed_at: now,
            })
            .await?;
        if !fresh {
            tracing::warn!(plugin_id, tenant_id, "Replayed plugin token");
            return Err(Error::TokenReplay {
                plugin_id: plugin_id.to_string(),
            });
        }

        tracing::debug!(plugin_id, tenant_id, "Plugin token verified");
        Ok(claims)
    }

    /// Deletes consumed nonces old enough that their tokens have expired.
    ///
    /// Storage hygiene only; verification never depends on it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageError`] if the nonce store fails.
    pub async fn cleanup_expired_nonces(&self) -> Result<usize> {
        self.cleanup_expired_nonces_at(Utc::now().timestamp()).await
    }

    /// [`cleanup_expired_nonces`](Self::cleanup_expired_nonces) as of `now`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageError`] if the nonce store fails.
    pub async fn cleanup_expired_nonces_at(&self, now: i64) -> Result<usize> {
        let removed = self
            .nonces
            .purge_older_than(now.saturating_sub(NONCE_RETENTION_SECS))
            .await?;
        if removed > 0 {
            tracing::debug!(removed, "Expired nonces purged");
        }
        Ok(removed)
    }
}

fn sign(secret: &SecretString, payload: &[u8]) -> Result<HmacSha256> {
    let key = secret.expose_secret();
    if key.is_empty() {
        return Err(Error::ConfigError {
            message: "plugin token secret is empty".to_string(),
        });
    }
    let mut mac = HmacSha256::new_from_slice(key.as_bytes()).map_err(|e| Error::ConfigError {
        message: format!("invalid plugin token secret: {e}"),
    })?;
    mac.update(payload);
    Ok(mac)
}

fn split_payload(payload: &str) -> Result<[&str; 4]> {
    let mut fields = payload.split(':');
    match (fields.next(), fields.next(), fields.next(), fields.next(), fields.next()) {
        (Some(plugin), Some(tenant), Some(issued_at), Some(nonce), None)
            if !plugin.is_empty() && !tenant.is_empty() && !nonce.is_empty() =>
        {
            Ok([plugin, tenant, issued_at, nonce])
        }
        _ => Err(unauthorized(AuthFailure::MalformedPayload)),
    }
}

const fn unauthorized(reason: AuthFailure) -> Error {
    Error::Unauthorized { reason }
}
