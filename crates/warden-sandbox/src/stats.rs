//! Execution statistics snapshot.
//!
//! ```
//! use warden_sandbox::SandboxStats;
//!
//! let stats = SandboxStats {
//!     total_executions: 10,
//!     execution_failures: 2,
//!     timeouts: 1,
//!     ..SandboxStats::default()
//! };
//! assert_eq!(stats.success_rate(), Some(0.8));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Counters collected by [`Sandbox`](crate::Sandbox) since creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxStats {
    /// Invocations started.
    pub total_executions: u64,

    /// Invocations that ended `Failed` or `TimedOut`.
    pub execution_failures: u64,

    /// Invocations that ended `TimedOut`.
    pub timeouts: u64,

    /// Modules rejected by the compiler.
    pub compilation_failures: u64,

    /// Compilations served from the module cache.
    pub cache_hits: u64,

    /// Compilations that had to run.
    pub cache_misses: u64,

    /// Mean wall-clock time of all invocations, in microseconds.
    pub avg_execution_time_us: u64,

    /// When the snapshot was taken.
    pub snapshot_time: DateTime<Utc>,
}

impl SandboxStats {
    /// Fraction of invocations that succeeded, `None` before the first one.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> Option<f64> {
        if self.total_executions == 0 {
            return None;
        }
        let successes = self.total_executions.saturating_sub(self.execution_failures);
        Some(successes as f64 / self.total_executions as f64)
    }

    /// Fraction of compilations served from cache, `None` before the first one.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn cache_hit_rate(&self) -> Option<f64> {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 {
            return None;
        }
        Some(self.cache_hits as f64 / lookups as f64)
    }

    /// Mean invocation time.
    #[must_use]
    pub const fn avg_execution_time(&self) -> Duration {
        Duration::from_micros(self.avg_execution_time_us)
    }
}

impl Default for SandboxStats {
    fn default() -> Self {
        Self {
            total_executions: 0,
            execution_failures: 0,
            timeouts: 0,
            compilation_failures: 0,
            cache_hits: 0,
            cache_misses: 0,
            avg_execution_time_us: 0,
            snapshot_time: Utc::now(),
        }
    }
}
