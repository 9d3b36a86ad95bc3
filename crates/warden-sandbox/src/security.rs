//! Execution limits for plugin handlers.
//!
//! # Examples
//!
//! ```
//! use warden_sandbox::SandboxConfig;
//! use std::time::Duration;
//!
//! let config = SandboxConfig::builder()
//!     .timeout(Duration::from_millis(500))
//!     .memory_limit_mb(16)
//!     .max_host_calls(32)
//!     .build();
//!
//! assert_eq!(config.memory_limit_bytes(), 16 * 1024 * 1024);
//! assert_eq!(config.timeout(), Duration::from_millis(500));
//! ```

use std::time::Duration;
use warden_core::SandboxSettings;

/// Limits applied to every invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxConfig {
    timeout: Duration,
    memory_limit_mb: usize,
    max_host_calls: usize,
    max_response_bytes: usize,
    cache_capacity: usize,
    epoch_tick: Duration,
}

impl SandboxConfig {
    /// Default wall-clock budget.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Default linear memory ceiling.
    pub const DEFAULT_MEMORY_LIMIT_MB: usize = 64;

    /// Default host call budget.
    pub const DEFAULT_MAX_HOST_CALLS: usize = 256;

    /// Default outbound response cap.
    pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 1024 * 1024;

    /// Default number of compiled modules kept.
    pub const DEFAULT_CACHE_CAPACITY: usize = 64;

    /// Epoch tick used by the watchdog.
    pub const DEFAULT_EPOCH_TICK: Duration = Duration::from_millis(10);

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> SandboxConfigBuilder {
        SandboxConfigBuilder::default()
    }

    /// Builds a configuration from the `[sandbox]` config section.
    #[must_use]
    pub fn from_settings(settings: &SandboxSettings) -> Self {
        Self::builder()
            .timeout(settings.timeout())
            .memory_limit_mb(settings.memory_limit_mb as usize)
            .max_host_calls(settings.max_host_calls)
            .max_response_bytes(settings.max_response_bytes)
            .build()
    }

    /// Wall-clock budget per invocation.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Linear memory ceiling in bytes.
    #[must_use]
    pub const fn memory_limit_bytes(&self) -> usize {
        self.memory_limit_mb.saturating_mul(1024 * 1024)
    }

    /// Host call budget per invocation.
    #[must_use]
    pub const fn max_host_calls(&self) -> usize {
        self.max_host_calls
    }

    /// Largest response body handed to a guest.
    #[must_use]
    pub const fn max_response_bytes(&self) -> usize {
        self.max_response_bytes
    }

    /// Compiled-module cache capacity.
    #[must_use]
    pub const fn cache_capacity(&self) -> usize {
        self.cache_capacity
    }

    /// Epoch tick interval.
    #[must_use]
    pub const fn epoch_tick(&self) -> Duration {
        self.epoch_tick
    }

    /// Number of epoch ticks covering the timeout, plus one for the tick in
    /// progress when the deadline is set.
    #[must_use]
    pub fn epoch_deadline_ticks(&self) -> u64 {
        let tick_ms = self.epoch_tick.as_millis().max(1);
        let timeout_ms = self.timeout.as_millis().max(1);
        u64::try_from(timeout_ms.div_ceil(tick_ms))
            .unwrap_or(u64::MAX)
            .saturating_add(1)
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`SandboxConfig`].
#[derive(Debug, Default)]
pub struct SandboxConfigBuilder {
    timeout: Option<Duration>,
    memory_limit_mb: Option<usize>,
    max_host_calls: Option<usize>,
    max_response_bytes: Option<usize>,
    cache_capacity: Option<usize>,
    epoch_tick: Option<Duration>,
}

impl SandboxConfigBuilder {
    /// Sets the wall-clock budget.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the memory ceiling in megabytes.
    #[must_use]
    pub const fn memory_limit_mb(mut self, mb: usize) -> Self {
        self.memory_limit_mb = Some(mb);
        self
    }

    /// Sets the host call budget.
    #[must_use]
    pub const fn max_host_calls(mut self, max: usize) -> Self {
        self.max_host_calls = Some(max);
        self
    }

    /// Sets the outbound response cap.
    #[must_use]
    pub const fn max_response_bytes(mut self, max: usize) -> Self {
        self.max_response_bytes = Some(max);
        self
    }

    /// Sets the compiled-module cache capacity.
    #[must_use]
    pub const fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = Some(capacity);
        self
    }

    /// Sets the epoch tick interval.
    #[must_use]
    pub const fn epoch_tick(mut self, tick: Duration) -> Self {
        self.epoch_tick = Some(tick);
        self
    }

    /// Builds the configuration. Zero values are raised to the smallest
    /// usable limit.
    #[must_use]
    pub fn build(self) -> SandboxConfig {
        SandboxConfig {
            timeout: self
                .timeout
                .unwrap_or(SandboxConfig::DEFAULT_TIMEOUT)
                .max(Duration::from_millis(1)),
            memory_limit_mb: self
                .memory_limit_mb
                .unwrap_or(SandboxConfig::DEFAULT_MEMORY_LIMIT_MB)
                .max(1),
            max_host_calls: self
                .max_host_calls
                .unwrap_or(SandboxConfig::DEFAULT_MAX_HOST_CALLS),
            max_response_bytes: self
                .max_response_bytes
                .unwrap_or(SandboxConfig::DEFAULT_MAX_RESPONSE_BYTES),
            cache_capacity: self
                .cache_capacity
                .unwrap_or(SandboxConfig::DEFAULT_CACHE_CAPACITY)
                .max(1),
            epoch_tick: self
                .epoch_tick
                .unwrap_or(SandboxConfig::DEFAULT_EPOCH_TICK)
                .max(Duration::from_millis(1)),
        }
    }
}
