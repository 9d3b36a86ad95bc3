//! Engine-wide epoch ticker.
//!
//! Guests run on the async executor and a CPU-bound loop never yields, so a
//! future-level timeout alone cannot stop it. A background thread advances
//! the engine epoch at a fixed interval; every store sets a deadline in ticks
//! and wasmtime traps the guest with [`wasmtime::Trap::Interrupt`] once it
//! passes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use wasmtime::Engine;

/// Background thread calling [`Engine::increment_epoch`]. Stopped and joined
/// on drop.
#[derive(Debug)]
pub struct EpochTicker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl EpochTicker {
    /// Starts ticking `engine` every `interval`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the thread cannot be spawned.
    pub fn start(engine: Engine, interval: Duration) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let handle = std::thread::Builder::new()
            .name("warden-epoch-ticker".to_string())
            .spawn(move || {
                while !stop_flag.load(Ordering::Acquire) {
                    std::thread::sleep(interval);
                    engine.increment_epoch();
                }
            })?;

        tracing::debug!(interval_ms = interval.as_millis(), "Epoch ticker started");
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }
}

impl Drop for EpochTicker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
