//! Consumed-nonce storage for replay defence.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::fmt;
use warden_core::{PluginId, Result, TenantId};

/// A nonce that has been spent by a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumedNonce {
    /// Tenant the token was minted for
    pub tenant_id: TenantId,
    /// Plugin the token was minted for
    pub plugin_id: PluginId,
    /// Random nonce from the token payload
    pub nonce: String,
    /// Unix seconds at which it was consumed
    pub consumed_at: i64,
}

/// Storage for consumed nonces, keyed by `(tenant_id, plugin_id, nonce)`.
///
/// Implementations must make [`consume`](Self::consume) a single atomic
/// insert-if-absent: two concurrent calls with the same key must not both
/// return `true`.
#[async_trait]
pub trait NonceStore: Send + Sync + fmt::Debug {
    /// Records the nonce. Returns `false` if the key was already present.
    ///
    /// # Errors
    ///
    /// Returns [`warden_core::Error::StorageError`] if the backend fails.
    async fn consume(&self, nonce: ConsumedNonce) -> Result<bool>;

    /// Deletes rows consumed before `cutoff` (Unix seconds) and returns how
    /// many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`warden_core::Error::StorageError`] if the backend fails.
    async fn purge_older_than(&self, cutoff: i64) -> Result<usize>;

    /// Number of stored rows.
    ///
    /// # Errors
    ///
    /// Returns [`warden_core::Error::StorageError`] if the backend fails.
    async fn len(&self) -> Result<usize>;
}

type NonceKey = (TenantId, PluginId, String);

/// In-process [`NonceStore`] on a sharded concurrent map.
///
/// Distinct nonces land on independent shards; the same nonce contends on
/// one shard lock, which is what makes [`NonceStore::consume`] atomic.
#[derive(Debug, Default)]
pub struct MemoryNonceStore {
    rows: DashMap<NonceKey, i64>,
}

impl MemoryNonceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NonceStore for MemoryNonceStore {
    async fn consume(&self, nonce: ConsumedNonce) -> Result<bool> {
        let key = (nonce.tenant_id, nonce.plugin_id, nonce.nonce);
        match self.rows.entry(key) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(nonce.consumed_at);
                Ok(true)
            }
        }
    }

    async fn purge_older_than(&self, cutoff: i64) -> Result<usize> {
        let mut removed = 0;
        self.rows.retain(|_, consumed_at| {
            let keep = *consumed_at >= cutoff;
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.rows.len())
    }
}
