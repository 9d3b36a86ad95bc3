//! Periodic purge of consumed nonces.

use crate::token::TokenService;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

/// Background task calling [`TokenService::cleanup_expired_nonces`] on an
/// interval. The task is aborted when the handle is dropped.
#[derive(Debug)]
pub struct NonceJanitor {
    handle: JoinHandle<()>,
}

impl NonceJanitor {
    /// Spawns the janitor on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn spawn(service: TokenService, every: Duration) -> Self {
        let every = every.max(Duration::from_millis(1));
        let handle = tokio::spawn(async move {
            let mut interval = time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = service.cleanup_expired_nonces().await {
                    tracing::warn!(error = %e, "Nonce cleanup failed");
                }
            }
        });
        tracing::debug!(interval_ms = every.as_millis(), "Nonce janitor started");
        Self { handle }
    }

    /// Returns whether the task has stopped.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for NonceJanitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
