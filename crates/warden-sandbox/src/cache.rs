//! LRU cache of compiled modules.
//!
//! Compiled code is immutable and safe to share; stores and instances are
//! never cached. Entries are keyed by the module's BLAKE3 checksum, so two
//! plugins shipping identical bytes share one compilation.
//!
//! # Examples
//!
//! ```
//! use warden_sandbox::cache::{CacheKey, ModuleCache};
//!
//! let cache = ModuleCache::new(8);
//! let key = CacheKey::for_bytes(b"\0asm\x01\0\0\0");
//! assert!(cache.get(&key).is_none());
//! assert!(key.as_str().starts_with("blake3:"));
//! ```

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use wasmtime::Module;

/// Cache key: a `blake3:<hex>` module checksum.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Computes the key for raw module bytes.
    #[must_use]
    pub fn for_bytes(bytes: &[u8]) -> Self {
        Self(format!("blake3:{}", blake3::hash(bytes).to_hex()))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Thread-safe LRU cache of compiled modules with hit/miss counters.
pub struct ModuleCache {
    cache: Mutex<lru::LruCache<CacheKey, Module>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for ModuleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("hits", &self.hits())
            .field("misses", &self.misses())
            .finish()
    }
}

impl ModuleCache {
    /// Creates a cache holding at most `capacity` modules (minimum one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(lru::LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, lru::LruCache<CacheKey, Module>> {
        // The cache holds no invariants a panicking holder could break.
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Looks up a module, updating LRU order and the hit/miss counters.
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<Module> {
        let module = self.lock().get(key).cloned();
        if module.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        module
    }

    /// Inserts a module, evicting the least recently used entry when full.
    pub fn insert(&self, key: CacheKey, module: Module) {
        let mut cache = self.lock();
        cache.put(key, module);
        tracing::debug!(cache_size = cache.len(), "Module cached");
    }

    /// Returns whether `key` is cached, without touching LRU order.
    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lock().contains(key)
    }

    /// Removes all entries.
    pub fn clear(&self) {
        self.lock().clear();
        tracing::info!("Module cache cleared");
    }

    /// Number of cached modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of cached modules.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.lock().cap().get()
    }

    /// Lookups that found a module.
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Lookups that did not.
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}
