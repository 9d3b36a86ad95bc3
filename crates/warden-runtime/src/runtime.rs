//! Plugin lifecycle: enable, invoke, disable.
//!
//! [`PluginRuntime`] wires the loader, sandbox, token service and hook
//! registry together. Every invocation mints a fresh token and builds a
//! per-plugin HTTP client from the `[egress]` configuration.

use crate::hooks::{HookHandler, HookRegistry, HookReport};
use async_trait::async_trait;
use secrecy::SecretString;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use url::Url;
use warden_core::{
    Error, ExecutionResult, InvocationState, PluginId, Result, TenantId, WardenConfig,
    WebhookRequest,
};
use warden_loader::{LoaderConfig, PluginLoader, PluginManifest, PluginSource};
use warden_sandbox::{
    CompiledHandler, DomainAllowlist, HttpTransport, InvocationContext, PluginHttpClient,
    ReqwestTransport, Sandbox, SandboxConfig, SandboxStats,
};
use warden_token::{
    AuthRejection, MemoryNonceStore, NonceJanitor, NonceStore, TokenService, VerifiedToken,
};

/// Outcome of one webhook invocation, ready for logging or serialization.
#[derive(Debug, Clone, Serialize)]
pub struct InvocationReport {
    /// Invoked plugin
    pub plugin_id: PluginId,
    /// Tenant the invocation ran for
    pub tenant_id: TenantId,
    /// Terminal state
    pub state: InvocationState,
    /// Handler result, when it succeeded
    pub value: Option<bool>,
    /// Wall-clock time including token minting
    pub elapsed_ms: u64,
    /// Host calls made by the guest
    pub host_calls: usize,
    /// Failure description, when it did not succeed
    pub error: Option<String>,
}

impl InvocationReport {
    fn new(
        plugin_id: PluginId,
        tenant_id: TenantId,
        outcome: &Result<ExecutionResult>,
        elapsed: Duration,
    ) -> Self {
        let (value, host_calls, error) = match outcome {
            Ok(result) => (Some(result.value), result.host_calls, None),
            Err(e) => (None, 0, Some(e.to_string())),
        };
        Self {
            plugin_id,
            tenant_id,
            state: InvocationState::for_outcome(outcome),
            value,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            host_calls,
            error,
        }
    }

    /// Returns `true` if the handler ran to completion.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.state == InvocationState::Succeeded
    }
}

/// Everything needed to run a compiled handler for a tenant.
#[derive(Debug)]
struct Invoker {
    config: WardenConfig,
    core_base: Url,
    sandbox: Sandbox,
    tokens: TokenService,
    secret: Option<SecretString>,
    transport: Arc<dyn HttpTransport>,
}

impl Invoker {
    fn context(&self, plugin_id: &PluginId, tenant_id: &TenantId) -> Result<InvocationContext> {
        let secret = self.secret.as_ref().ok_or_else(|| Error::ConfigError {
            message: format!(
                "plugin token secret is not set (environment variable {})",
                self.config.core.secret_env
            ),
        })?;
        let token = self.tokens.issue(plugin_id, tenant_id, secret)?;
        let allowlist = DomainAllowlist::from_entries(self.config.egress_for(plugin_id.as_str()))?;

        let client = PluginHttpClient::new(
            plugin_id.clone(),
            self.core_base.clone(),
            token,
            allowlist,
            Arc::clone(&self.transport),
        );
        Ok(InvocationContext::new(tenant_id.clone()).with_http_client(client))
    }

    async fn run(
        &self,
        handler: &CompiledHandler,
        tenant_id: &TenantId,
        request: &WebhookRequest,
    ) -> Result<ExecutionResult> {
        let context = self.context(handler.plugin_id(), tenant_id)?;
        self.sandbox.execute(handler, context, request).await
    }
}

/// Hook handler that runs a plugin's sandboxed handler.
///
/// The hook payload is delivered as a `POST /hooks/<hook>` request with a
/// JSON body.
#[derive(Debug)]
struct SandboxHookHandler {
    invoker: Arc<Invoker>,
    handler: CompiledHandler,
}

#[async_trait]
impl HookHandler for SandboxHookHandler {
    async fn handle(
        &self,
        hook: &str,
        tenant_id: &TenantId,
        payload: &serde_json::Value,
    ) -> Result<bool> {
        let request = WebhookRequest::new("POST", format!("/hooks/{hook}"))
            .with_header("content-type", "application/json")
            .with_header("x-warden-hook", hook)
            .with_body(payload.to_string());
        self.invoker
            .run(&self.handler, tenant_id, &request)
            .await
            .map(|result| result.value)
    }
}

#[derive(Debug, Clone)]
struct EnabledPlugin {
    manifest: PluginManifest,
    handler: CompiledHandler,
    source: PluginSource,
}

/// Builder for [`PluginRuntime`].
#[derive(Debug)]
pub struct PluginRuntimeBuilder {
    config: WardenConfig,
    secret: Option<Option<SecretString>>,
    transport: Option<Arc<dyn HttpTransport>>,
    nonces: Option<Arc<dyn NonceStore>>,
    sandbox: Option<SandboxConfig>,
}

impl PluginRuntimeBuilder {
    /// Uses `secret` instead of reading `core.secret_env`.
    #[must_use]
    pub fn secret(mut self, secret: Option<SecretString>) -> Self {
        self.secret = Some(secret);
        self
    }

    /// Replaces the `reqwest` transport.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replaces the in-memory nonce store.
    #[must_use]
    pub fn nonce_store(mut self, nonces: Arc<dyn NonceStore>) -> Self {
        self.nonces = Some(nonces);
        self
    }

    /// Overrides the limits derived from `[sandbox]`.
    #[must_use]
    pub fn sandbox_config(mut self, config: SandboxConfig) -> Self {
        self.sandbox = Some(config);
        self
    }

    /// Validates the configuration and builds the runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] for invalid configuration, or the
    /// error of whichever component fails to start.
    pub fn build(self) -> Result<PluginRuntime> {
        let config = self.config;
        config.validate()?;
        let core_base = config.core_base_url()?;

        let secret = self.secret.unwrap_or_else(|| config.resolve_secret());
        let sandbox_config = self
            .sandbox
            .unwrap_or_else(|| SandboxConfig::from_settings(&config.sandbox));
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(
                sandbox_config.timeout(),
                sandbox_config.max_response_bytes(),
            )?),
        };
        let nonces = self
            .nonces
            .unwrap_or_else(|| Arc::new(MemoryNonceStore::new()));

        let loader = PluginLoader::new(LoaderConfig::from(&config))?;
        let sandbox = Sandbox::new(sandbox_config)?;

        tracing::info!(
            core = %core_base,
            production = config.production_enabled(),
            secret_configured = secret.is_some(),
            "Plugin runtime ready"
        );

        Ok(PluginRuntime {
            loader,
            invoker: Arc::new(Invoker {
                config,
                core_base,
                sandbox,
                tokens: TokenService::new(nonces),
                secret,
                transport,
            }),
            hooks: HookRegistry::new(),
            enabled: RwLock::new(HashMap::new()),
        })
    }
}

/// The plugin trust boundary as one service.
///
/// # Examples
///
/// ```no_run
/// use warden_core::{WardenConfig, WebhookRequest};
/// use warden_runtime::PluginRuntime;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let runtime = PluginRuntime::new(WardenConfig::default())?;
/// let _janitor = runtime.spawn_nonce_janitor();
///
/// let manifest = runtime.enable("warden-plugin-github").await?;
/// let report = runtime
///     .invoke_webhook(
///         &manifest.name.as_str().into(),
///         &"acme".into(),
///         &WebhookRequest::new("POST", "/hooks/push"),
///     )
///     .await?;
/// println!("{}: {:?}", report.state, report.value);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PluginRuntime {
    loader: PluginLoader,
    invoker: Arc<Invoker>,
    hooks: HookRegistry,
    enabled: RwLock<HashMap<PluginId, EnabledPlugin>>,
}

impl PluginRuntime {
    /// Starts a builder from `config`.
    #[must_use]
    pub const fn builder(config: WardenConfig) -> PluginRuntimeBuilder {
        PluginRuntimeBuilder {
            config,
            secret: None,
            transport: None,
            nonces: None,
            sandbox: None,
        }
    }

    /// Builds a runtime with default components.
    ///
    /// # Errors
    ///
    /// See [`PluginRuntimeBuilder::build`].
    pub fn new(config: WardenConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &WardenConfig {
        &self.invoker.config
    }

    /// Lists installable plugins.
    #[must_use]
    pub fn discover(&self) -> Vec<PluginManifest> {
        self.loader.discover_plugins()
    }

    /// Loads, compiles and activates a plugin, registering its manifest
    /// hooks. Enabling an enabled plugin reloads it.
    ///
    /// Nothing is registered unless every step succeeds.
    ///
    /// # Errors
    ///
    /// Any loader error, or [`Error::ModuleLoadError`] if compilation fails.
    pub async fn enable(&self, identifier: &str) -> Result<PluginManifest> {
        let loader = self.loader.clone();
        let id = identifier.to_string();
        let plugin = tokio::task::spawn_blocking(move || loader.load_plugin(&id))
            .await
            .map_err(|e| Error::ExecutionError {
                message: format!("plugin load task failed: {e}"),
            })??;

        let plugin_id = PluginId::from(plugin.manifest.name.as_str());
        let handler = self.invoker.sandbox.compile(&plugin_id, &plugin.module.bytes)?;

        let mut enabled = self.enabled.write().await;
        if enabled.remove(&plugin_id).is_some() {
            self.hooks.unregister_plugin(&plugin_id).await;
        }
        for (hook, priority) in &plugin.manifest.hooks {
            let hook_handler = Arc::new(SandboxHookHandler {
                invoker: Arc::clone(&self.invoker),
                handler: handler.clone(),
            });
            self.hooks
                .register_hook(hook, plugin_id.clone(), *priority, hook_handler)
                .await;
        }

        tracing::info!(
            plugin_id = %plugin_id,
            version = %plugin.manifest.version,
            source = ?plugin.source,
            hooks = plugin.manifest.hooks.len(),
            "Plugin enabled"
        );
        enabled.insert(
            plugin_id,
            EnabledPlugin {
                manifest: plugin.manifest.clone(),
                handler,
                source: plugin.source,
            },
        );
        Ok(plugin.manifest)
    }

    /// Deactivates a plugin and removes its hooks. Returns `false` if it was
    /// not enabled.
    pub async fn disable(&self, plugin_id: &PluginId) -> bool {
        let mut enabled = self.enabled.write().await;
        let Some(plugin) = enabled.remove(plugin_id) else {
            return false;
        };
        let removed = self.hooks.unregister_plugin(plugin_id).await;
        tracing::info!(
            plugin_id = %plugin_id,
            version = %plugin.manifest.version,
            source = ?plugin.source,
            hooks_removed = removed,
            "Plugin disabled"
        );
        true
    }

    /// Enabled plugins, sorted.
    pub async fn enabled_plugins(&self) -> Vec<PluginId> {
        let mut ids: Vec<PluginId> = self.enabled.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Runs an enabled plugin's handler against one webhook request.
    ///
    /// Handler failures do not make this return `Err`; they are recorded in
    /// the report's `state` and `error`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the plugin is not enabled.
    pub async fn invoke_webhook(
        &self,
        plugin_id: &PluginId,
        tenant_id: &TenantId,
        request: &WebhookRequest,
    ) -> Result<InvocationReport> {
        let handler = self
            .enabled
            .read()
            .await
            .get(plugin_id)
            .map(|plugin| plugin.handler.clone())
            .ok_or_else(|| Error::InvalidArgument(format!("plugin '{plugin_id}' is not enabled")))?;

        let start = Instant::now();
        let outcome = self.invoker.run(&handler, tenant_id, request).await;
        let report = InvocationReport::new(
            plugin_id.clone(),
            tenant_id.clone(),
            &outcome,
            start.elapsed(),
        );

        tracing::info!(
            plugin_id = %plugin_id,
            tenant_id = %tenant_id,
            state = %report.state,
            elapsed_ms = report.elapsed_ms,
            "Webhook invocation finished"
        );
        Ok(report)
    }

    /// Runs every handler registered for `hook`.
    pub async fn invoke_hooks(
        &self,
        hook: &str,
        tenant_id: &TenantId,
        payload: &serde_json::Value,
    ) -> HookReport {
        self.hooks.invoke_hooks(hook, tenant_id, payload).await
    }

    /// Hook registry.
    #[must_use]
    pub const fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    /// Authenticates an inbound core API call from a plugin.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthRejection`] with status 401 or 500.
    pub async fn authenticate(
        &self,
        authorization: Option<&str>,
    ) -> std::result::Result<VerifiedToken, AuthRejection> {
        self.invoker
            .tokens
            .authenticate(authorization, self.invoker.secret.as_ref())
            .await
    }

    /// Token service shared by every invocation.
    #[must_use]
    pub fn tokens(&self) -> &TokenService {
        &self.invoker.tokens
    }

    /// Starts the consumed-nonce purge on `tokens.cleanup_interval_secs`.
    /// Keep the handle alive for as long as the purge should run.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn spawn_nonce_janitor(&self) -> NonceJanitor {
        NonceJanitor::spawn(
            self.invoker.tokens.clone(),
            Duration::from_secs(self.invoker.config.tokens.cleanup_interval_secs),
        )
    }

    /// Sandbox execution counters.
    #[must_use]
    pub fn stats(&self) -> SandboxStats {
        self.invoker.sandbox.collect_stats()
    }
}
