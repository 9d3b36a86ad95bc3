//! Plugin handler execution on Wasmtime.
//!
//! One [`Sandbox`] owns the engine, the linker with the `warden` imports, the
//! compiled-module cache and the epoch ticker. Each call to
//! [`Sandbox::execute`] builds a new store and instance, so no guest state
//! survives between invocations, plugins, or tenants.
//!
//! # Examples
//!
//! ```no_run
//! use warden_core::{PluginId, TenantId, WebhookRequest};
//! use warden_sandbox::{InvocationContext, Sandbox, SandboxConfig};
//!
//! # async fn example(bytes: Vec<u8>) -> Result<(), Box<dyn std::error::Error>> {
//! let sandbox = Sandbox::new(SandboxConfig::default())?;
//! let plugin = PluginId::from("warden-plugin-github");
//! let handler = sandbox.compile(&plugin, &bytes)?;
//!
//! let context = InvocationContext::new(TenantId::from("acme"));
//! let result = sandbox
//!     .execute(&handler, context, &WebhookRequest::new("POST", "/hooks/push"))
//!     .await?;
//! println!("handled: {} in {:?}", result.value, result.elapsed);
//! # Ok(())
//! # }
//! ```

use crate::cache::{CacheKey, ModuleCache};
use crate::epoch::EpochTicker;
use crate::host_functions::{self, HostContext, HostTrap};
use crate::http_client::PluginHttpClient;
use crate::security::SandboxConfig;
use crate::stats::SandboxStats;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use warden_core::{
    Error, ExecutionResult, InvocationState, PluginId, Result, TenantId, WebhookRequest,
};
use wasmtime::{
    Config, Engine, Linker, Module, ResourceLimiter, Store, Strategy, Trap, WasmBacktraceDetails,
};

/// Store data: host context plus memory limiter.
pub(crate) struct StoreData {
    pub(crate) host: HostContext,
    limiter: MemoryLimiter,
}

/// A compiled plugin module bound to its plugin.
#[derive(Debug, Clone)]
pub struct CompiledHandler {
    plugin_id: PluginId,
    checksum: CacheKey,
    module: Module,
}

impl CompiledHandler {
    /// Plugin the module belongs to.
    #[must_use]
    pub const fn plugin_id(&self) -> &PluginId {
        &self.plugin_id
    }

    /// Checksum of the source bytes.
    #[must_use]
    pub const fn checksum(&self) -> &CacheKey {
        &self.checksum
    }
}

/// Per-invocation inputs beyond the request itself.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    /// Tenant the invocation runs for.
    pub tenant_id: TenantId,
    /// Outbound client; `None` denies every request.
    pub http_client: Option<PluginHttpClient>,
}

impl InvocationContext {
    /// Context with no network access.
    #[must_use]
    pub const fn new(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            http_client: None,
        }
    }

    /// Attaches the plugin's HTTP client.
    #[must_use]
    pub fn with_http_client(mut self, client: PluginHttpClient) -> Self {
        self.http_client = Some(client);
        self
    }
}

/// Executes plugin handlers under time, memory and host call limits.
///
/// `Send + Sync`; share it behind an `Arc` and call [`execute`](Self::execute)
/// concurrently. Every call gets its own store.
pub struct Sandbox {
    engine: Engine,
    linker: Linker<StoreData>,
    config: SandboxConfig,
    module_cache: ModuleCache,
    _ticker: EpochTicker,

    total_executions: AtomicU64,
    execution_failures: AtomicU64,
    timeouts: AtomicU64,
    compilation_failures: AtomicU64,
    total_execution_time_us: AtomicU64,
}

impl std::fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sandbox")
            .field("config", &self.config)
            .field("module_cache", &self.module_cache)
            .field(
                "total_executions",
                &self.total_executions.load(Ordering::Relaxed),
            )
            .field(
                "execution_failures",
                &self.execution_failures.load(Ordering::Relaxed),
            )
            .finish_non_exhaustive()
    }
}

impl Sandbox {
    /// Creates the engine, links the host functions and starts the epoch
    /// ticker.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WasmError`] if the engine or linker cannot be built,
    /// or an I/O error if the ticker thread cannot be spawned.
    pub fn new(config: SandboxConfig) -> Result<Self> {
        let mut wasmtime_config = Config::new();
        wasmtime_config.async_support(true);
        wasmtime_config.epoch_interruption(true);
        wasmtime_config.wasm_backtrace_details(WasmBacktraceDetails::Disable);
        wasmtime_config.strategy(Strategy::Cranelift);

        let engine = Engine::new(&wasmtime_config).map_err(|e| Error::WasmError {
            message: format!("failed to create Wasmtime engine: {e}"),
        })?;

        let mut linker = Linker::new(&engine);
        host_functions::link(&mut linker)?;

        let ticker = EpochTicker::start(engine.clone(), config.epoch_tick())?;
        let module_cache = ModuleCache::new(config.cache_capacity());

        tracing::info!(
            timeout_ms = config.timeout().as_millis(),
            memory_limit_bytes = config.memory_limit_bytes(),
            max_host_calls = config.max_host_calls(),
            "Sandbox ready"
        );

        Ok(Self {
            engine,
            linker,
            config,
            module_cache,
            _ticker: ticker,
            total_executions: AtomicU64::new(0),
            execution_failures: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            compilation_failures: AtomicU64::new(0),
            total_execution_time_us: AtomicU64::new(0),
        })
    }

    /// Active limits.
    #[must_use]
    pub const fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Compiles module bytes, reusing a cached compilation when the same bytes
    /// have been seen before. The cache key is the BLAKE3 digest of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModuleLoadError`] if Wasmtime rejects the module.
    pub fn compile(&self, plugin_id: &PluginId, bytes: &[u8]) -> Result<CompiledHandler> {
        let key = CacheKey::for_bytes(bytes);

        let module = if let Some(module) = self.module_cache.get(&key) {
            tracing::debug!(plugin_id = %plugin_id, checksum = %key, "Using cached module");
            module
        } else {
            let start = Instant::now();
            let module = Module::new(&self.engine, bytes).map_err(|e| {
                self.compilation_failures.fetch_add(1, Ordering::Relaxed);
                Error::ModuleLoadError {
                    plugin: plugin_id.to_string(),
                    reason: format!("compilation failed: {e}"),
                }
            })?;
            tracing::info!(
                plugin_id = %plugin_id,
                size = bytes.len(),
                elapsed_ms = start.elapsed().as_millis(),
                "Module compiled"
            );
            self.module_cache.insert(key.clone(), module.clone());
            module
        };

        Ok(CompiledHandler {
            plugin_id: plugin_id.clone(),
            checksum: key,
            module,
        })
    }

    /// Runs the handler once against `request`.
    ///
    /// A `false` return is a successful invocation. Timeouts, traps and
    /// contract violations are returned as errors and counted; nothing is
    /// retried.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] when the wall-clock budget runs out
    /// - [`Error::HandlerContractError`] for missing exports or a non-boolean
    ///   return
    /// - [`Error::ExecutionError`] when the guest traps or exhausts its host
    ///   call budget
    pub async fn execute(
        &self,
        handler: &CompiledHandler,
        context: InvocationContext,
        request: &WebhookRequest,
    ) -> Result<ExecutionResult> {
        let start = Instant::now();
        self.total_executions.fetch_add(1, Ordering::Relaxed);

        let plugin_id = handler.plugin_id.clone();
        let tenant_id = context.tenant_id.clone();
        let payload = serde_json::to_vec(request)?;
        let timeout = self.config.timeout();

        log_transition(&plugin_id, &tenant_id, InvocationState::Pending, InvocationState::Running);

        let outcome = match tokio::time::timeout(timeout, self.run(handler, context, &payload)).await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(timeout_error(timeout)),
        };

        let elapsed = start.elapsed();
        self.total_execution_time_us.fetch_add(
            u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );

        let state = InvocationState::for_outcome(&outcome);
        log_transition(&plugin_id, &tenant_id, InvocationState::Running, state);

        match outcome {
            Ok((value, host_calls)) => {
                tracing::info!(
                    plugin_id = %plugin_id,
                    tenant_id = %tenant_id,
                    value,
                    host_calls,
                    elapsed_ms = elapsed.as_millis(),
                    "Handler completed"
                );
                Ok(ExecutionResult {
                    value,
                    elapsed,
                    host_calls,
                })
            }
            Err(e) => {
                self.execution_failures.fetch_add(1, Ordering::Relaxed);
                if e.is_timeout() {
                    self.timeouts.fetch_add(1, Ordering::Relaxed);
                }
                tracing::warn!(
                    plugin_id = %plugin_id,
                    tenant_id = %tenant_id,
                    state = %state,
                    error = %e,
                    elapsed_ms = elapsed.as_millis(),
                    "Handler failed"
                );
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        handler: &CompiledHandler,
        context: InvocationContext,
        payload: &[u8],
    ) -> Result<(bool, usize)> {
        let host = HostContext::new(
            handler.plugin_id.clone(),
            context.tenant_id,
            context.http_client,
            self.config.max_host_calls(),
            self.config.max_response_bytes(),
        );
        let mut store = Store::new(
            &self.engine,
            StoreData {
                host,
                limiter: MemoryLimiter::new(self.config.memory_limit_bytes()),
            },
        );
        store.limiter(|data| &mut data.limiter);
        store.set_epoch_deadline(self.config.epoch_deadline_ticks());
        store.epoch_deadline_trap();

        let instance = self
            .linker
            .instantiate_async(&mut store, &handler.module)
            .await
            .map_err(|e| self.guest_error(e))?;

        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| contract_error("missing export 'memory'"))?;
        let alloc = instance
            .get_typed_func::<i32, i32>(&mut store, "alloc")
            .map_err(|_| contract_error("missing or mistyped export 'alloc'"))?;
        let handle = instance
            .get_func(&mut store, "handle")
            .ok_or_else(|| contract_error("missing export 'handle'"))?
            .typed::<(i32, i32), i32>(&store)
            .map_err(|_| contract_error("handler must return boolean"))?;

        let len = i32::try_from(payload.len())
            .map_err(|_| Error::InvalidArgument("webhook request too large".to_string()))?;
        let ptr = alloc
            .call_async(&mut store, len)
            .await
            .map_err(|e| self.guest_error(e))?;
        let offset =
            usize::try_from(ptr).map_err(|_| contract_error("alloc returned a negative pointer"))?;
        memory
            .write(&mut store, offset, payload)
            .map_err(|_| contract_error("alloc returned an out-of-bounds buffer"))?;

        let ret = handle
            .call_async(&mut store, (ptr, len))
            .await
            .map_err(|e| self.guest_error(e))?;
        let host_calls = store.data().host.call_count();

        match ret {
            0 => Ok((false, host_calls)),
            1 => Ok((true, host_calls)),
            other => Err(contract_error(format!(
                "handler must return boolean, got {other}"
            ))),
        }
    }

    fn guest_error(&self, error: wasmtime::Error) -> Error {
        if matches!(error.downcast_ref::<Trap>(), Some(Trap::Interrupt)) {
            return timeout_error(self.config.timeout());
        }
        if let Some(trap) = error.downcast_ref::<HostTrap>() {
            return Error::ExecutionError {
                message: trap.to_string(),
            };
        }
        Error::ExecutionError {
            message: format!("{error:#}"),
        }
    }

    /// Compiled-module cache.
    #[must_use]
    pub const fn module_cache(&self) -> &ModuleCache {
        &self.module_cache
    }

    /// Drops every cached compilation.
    pub fn clear_cache(&self) {
        self.module_cache.clear();
    }

    /// Snapshot of the execution counters.
    #[must_use]
    pub fn collect_stats(&self) -> SandboxStats {
        let total_executions = self.total_executions.load(Ordering::Relaxed);
        let total_time_us = self.total_execution_time_us.load(Ordering::Relaxed);

        SandboxStats {
            total_executions,
            execution_failures: self.execution_failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            compilation_failures: self.compilation_failures.load(Ordering::Relaxed),
            cache_hits: self.module_cache.hits(),
            cache_misses: self.module_cache.misses(),
            avg_execution_time_us: total_time_us.checked_div(total_executions).unwrap_or(0),
            snapshot_time: Utc::now(),
        }
    }
}

fn log_transition(
    plugin_id: &PluginId,
    tenant_id: &TenantId,
    from: InvocationState,
    to: InvocationState,
) {
    debug_assert!(from.can_transition_to(to));
    tracing::debug!(
        plugin_id = %plugin_id,
        tenant_id = %tenant_id,
        from = %from,
        to = %to,
        "Invocation state changed"
    );
}

fn timeout_error(timeout: Duration) -> Error {
    Error::Timeout {
        operation: "plugin handler".to_string(),
        duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
    }
}

fn contract_error(reason: impl Into<String>) -> Error {
    Error::HandlerContractError {
        reason: reason.into(),
    }
}

/// Refuses linear memory growth past the configured ceiling.
struct MemoryLimiter {
    max_memory_bytes: usize,
}

impl MemoryLimiter {
    const fn new(max_memory_bytes: usize) -> Self {
        Self { max_memory_bytes }
    }
}

impl ResourceLimiter for MemoryLimiter {
    fn memory_growing(
        &mut self,
        current: usize,
        desired: usize,
        _maximum: Option<usize>,
    ) -> wasmtime::Result<bool> {
        if desired > self.max_memory_bytes {
            tracing::warn!(
                desired,
                limit = self.max_memory_bytes,
                "Guest memory growth refused"
            );
            Ok(false)
        } else {
            tracing::trace!(current, desired, "Guest memory growing");
            Ok(true)
        }
    }

    fn table_growing(
        &mut self,
        _current: usize,
        desired: usize,
        _maximum: Option<usize>,
    ) -> wasmtime::Result<bool> {
        Ok(desired <= 10_000)
    }
}
