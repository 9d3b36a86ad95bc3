//! Hook registry: event name to priority-ordered plugin handlers.
//!
//! Handlers run lowest priority first; equal priorities keep registration
//! order. A failing handler is recorded in the [`HookReport`] and the
//! remaining handlers still run.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use warden_core::{InvocationState, PluginId, Result, TenantId};

/// A handler bound to one plugin.
#[async_trait]
pub trait HookHandler: Send + Sync + fmt::Debug {
    /// Handles one hook event for `tenant_id`.
    ///
    /// # Errors
    ///
    /// Any error is recorded against this handler; it does not stop the
    /// remaining handlers.
    async fn handle(
        &self,
        hook: &str,
        tenant_id: &TenantId,
        payload: &serde_json::Value,
    ) -> Result<bool>;
}

#[derive(Debug, Clone)]
struct HookEntry {
    plugin_id: PluginId,
    priority: i32,
    handler: Arc<dyn HookHandler>,
}

/// Outcome of one handler within [`HookRegistry::invoke_hooks`].
#[derive(Debug, Clone, Serialize)]
pub struct HookOutcome {
    /// Plugin that owns the handler
    pub plugin_id: PluginId,
    /// Registered priority
    pub priority: i32,
    /// Terminal state of the handler run
    pub state: InvocationState,
    /// Returned boolean, when the handler succeeded
    pub value: Option<bool>,
    /// Error message, when it did not
    pub error: Option<String>,
}

/// Collected outcomes of every handler registered for a hook.
#[derive(Debug, Clone, Serialize)]
pub struct HookReport {
    /// Hook name
    pub hook: String,
    /// One entry per handler, in execution order
    pub outcomes: Vec<HookOutcome>,
}

impl HookReport {
    /// Outcomes that did not succeed.
    pub fn failures(&self) -> impl Iterator<Item = &HookOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.state != InvocationState::Succeeded)
    }

    /// Returns `true` if every handler succeeded.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Process-lifetime table of hook handlers.
///
/// Mutations take the write lock; [`invoke_hooks`](Self::invoke_hooks) copies
/// the handler list and releases the lock before running anything, so
/// registration never waits on plugin code.
#[derive(Debug, Default)]
pub struct HookRegistry {
    hooks: RwLock<HashMap<String, Vec<HookEntry>>>,
}

impl HookRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `hook`.
    pub async fn register_hook(
        &self,
        hook: &str,
        plugin_id: PluginId,
        priority: i32,
        handler: Arc<dyn HookHandler>,
    ) {
        let mut hooks = self.hooks.write().await;
        let entries = hooks.entry(hook.to_string()).or_default();
        entries.push(HookEntry {
            plugin_id: plugin_id.clone(),
            priority,
            handler,
        });
        // Stable: equal priorities keep insertion order.
        entries.sort_by_key(|e| e.priority);

        tracing::info!(hook, plugin_id = %plugin_id, priority, "Hook handler registered");
    }

    /// Removes every handler `plugin_id` registered for `hook`. Returns the
    /// number removed.
    pub async fn unregister_hook(&self, hook: &str, plugin_id: &PluginId) -> usize {
        let mut hooks = self.hooks.write().await;
        let Some(entries) = hooks.get_mut(hook) else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|e| &e.plugin_id != plugin_id);
        let removed = before - entries.len();
        if entries.is_empty() {
            hooks.remove(hook);
        }

        if removed > 0 {
            tracing::info!(hook, plugin_id = %plugin_id, removed, "Hook handler unregistered");
        }
        removed
    }

    /// Removes every handler `plugin_id` registered, across all hooks.
    pub async fn unregister_plugin(&self, plugin_id: &PluginId) -> usize {
        let mut hooks = self.hooks.write().await;
        let mut removed = 0;
        for entries in hooks.values_mut() {
            let before = entries.len();
            entries.retain(|e| &e.plugin_id != plugin_id);
            removed += before - entries.len();
        }
        hooks.retain(|_, entries| !entries.is_empty());

        tracing::info!(plugin_id = %plugin_id, removed, "All hooks unregistered for plugin");
        removed
    }

    /// Plugins registered for `hook`, in execution order.
    pub async fn handlers(&self, hook: &str) -> Vec<(PluginId, i32)> {
        self.hooks
            .read()
            .await
            .get(hook)
            .map(|entries| {
                entries
                    .iter()
                    .map(|e| (e.plugin_id.clone(), e.priority))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Hook names with at least one handler, sorted.
    pub async fn registered_hooks(&self) -> Vec<String> {
        let mut names: Vec<String> = self.hooks.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Runs every handler for `hook` in order and collects their outcomes.
    pub async fn invoke_hooks(
        &self,
        hook: &str,
        tenant_id: &TenantId,
        payload: &serde_json::Value,
    ) -> HookReport {
        let entries = self
            .hooks
            .read()
            .await
            .get(hook)
            .cloned()
            .unwrap_or_default();

        let mut outcomes = Vec::with_capacity(entries.len());
        for entry in entries {
            let result = entry.handler.handle(hook, tenant_id, payload).await;
            let state = InvocationState::for_outcome(&result);
            let (value, error) = match result {
                Ok(value) => (Some(value), None),
                Err(e) => {
                    tracing::warn!(
                        hook,
                        plugin_id = %entry.plugin_id,
                        tenant_id = %tenant_id,
                        error = %e,
                        "Hook handler failed"
                    );
                    (None, Some(e.to_string()))
                }
            };
            outcomes.push(HookOutcome {
                plugin_id: entry.plugin_id,
                priority: entry.priority,
                state,
                value,
                error,
            });
        }

        HookReport {
            hook: hook.to_string(),
            outcomes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use warden_core::Error;

    #[derive(Debug)]
    struct Recording {
        name: &'static str,
        calls: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    #[async_trait]
    impl HookHandler for Recording {
        async fn handle(
            &self,
            _hook: &str,
            _tenant_id: &TenantId,
            _payload: &serde_json::Value,
        ) -> Result<bool> {
            self.calls.lock().unwrap().push(self.name);
            if self.fail {
                return Err(Error::ExecutionError {
                    message: format!("{} failed", self.name),
                });
            }
            Ok(true)
        }
    }

    fn handler(
        name: &'static str,
        calls: &Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    ) -> Arc<dyn HookHandler> {
        Arc::new(Recording {
            name,
            calls: Arc::clone(calls),
            fail,
        })
    }

    #[tokio::test]
    async fn test_priority_then_insertion_order() {
        let registry = HookRegistry::new();
        let calls = Arc::new(Mutex::new(Vec::new()));

        registry.register_hook("push", "p-b".into(), 100, handler("b", &calls, false)).await;
        registry.register_hook("push", "p-a".into(), 10, handler("a", &calls, false)).await;
        registry.register_hook("push", "p-c".into(), 100, handler("c", &calls, false)).await;
        registry.register_hook("push", "p-d".into(), 100, handler("d", &calls, false)).await;

        let report = registry
            .invoke_hooks("push", &"acme".into(), &serde_json::json!({}))
            .await;

        assert_eq!(*calls.lock().unwrap(), ["a", "b", "c", "d"]);
        assert!(report.all_succeeded());
        assert_eq!(report.outcomes.len(), 4);
    }

    #[tokio::test]
    async fn test_failure_does_not_block_others() {
        let registry = HookRegistry::new();
        let calls = Arc::new(Mutex::new(Vec::new()));

        registry.register_hook("push", "p-a".into(), 1, handler("a", &calls, true)).await;
        registry.register_hook("push", "p-b".into(), 2, handler("b", &calls, false)).await;

        let report = registry
            .invoke_hooks("push", &"acme".into(), &serde_json::Value::Null)
            .await;

        assert_eq!(*calls.lock().unwrap(), ["a", "b"]);
        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].plugin_id.as_str(), "p-a");
        assert_eq!(failures[0].state, InvocationState::Failed);
        assert_eq!(report.outcomes[1].value, Some(true));
    }

    #[tokio::test]
    async fn test_unregister_hook_removes_pair_only() {
        let registry = HookRegistry::new();
        let calls = Arc::new(Mutex::new(Vec::new()));

        registry.register_hook("push", "p-a".into(), 1, handler("a1", &calls, false)).await;
        registry.register_hook("push", "p-a".into(), 5, handler("a2", &calls, false)).await;
        registry.register_hook("push", "p-b".into(), 3, handler("b", &calls, false)).await;
        registry.register_hook("pull", "p-a".into(), 1, handler("a3", &calls, false)).await;

        assert_eq!(registry.unregister_hook("push", &"p-a".into()).await, 2);
        assert_eq!(registry.handlers("push").await, vec![(PluginId::from("p-b"), 3)]);
        assert_eq!(registry.handlers("pull").await.len(), 1);
        assert_eq!(registry.unregister_hook("missing", &"p-a".into()).await, 0);
    }

    #[tokio::test]
    async fn test_unregister_plugin_clears_empty_hooks() {
        let registry = HookRegistry::new();
        let calls = Arc::new(Mutex::new(Vec::new()));

        registry.register_hook("push", "p-a".into(), 1, handler("a", &calls, false)).await;
        registry.register_hook("pull", "p-a".into(), 1, handler("a", &calls, false)).await;
        registry.register_hook("pull", "p-b".into(), 1, handler("b", &calls, false)).await;

        assert_eq!(registry.unregister_plugin(&"p-a".into()).await, 2);
        assert_eq!(registry.registered_hooks().await, vec!["pull".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_hook_yields_empty_report() {
        let registry = HookRegistry::new();
        let report = registry
            .invoke_hooks("nothing", &"acme".into(), &serde_json::Value::Null)
            .await;
        assert!(report.outcomes.is_empty());
        assert!(report.all_succeeded());
    }
}
