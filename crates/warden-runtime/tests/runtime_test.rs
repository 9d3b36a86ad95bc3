//! End-to-end runtime tests: plugins on disk, enabled, invoked, and calling
//! back into core with their minted token.

use async_trait::async_trait;
use secrecy::SecretString;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use warden_core::{Error, InvocationState, PluginId, Result, TenantId, WardenConfig, WebhookRequest};
use warden_runtime::PluginRuntime;
use warden_sandbox::{HttpResponse, HttpTransport, OutboundRequest};

const ALLOC: &str = r#"
    (global $heap (mut i32) (i32.const 8192))
    (func (export "alloc") (param $len i32) (result i32)
        (local $p i32)
        (local.set $p (global.get $heap))
        (global.set $heap (i32.add (global.get $heap) (local.get $len)))
        (local.get $p))
"#;

#[derive(Debug, Default)]
struct Recorder {
    sent: Mutex<Vec<OutboundRequest>>,
}

impl Recorder {
    fn sent(&self) -> Vec<OutboundRequest> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for Recorder {
    async fn send(&self, request: OutboundRequest) -> Result<HttpResponse> {
        self.sent.lock().unwrap().push(request);
        Ok(HttpResponse {
            status: 200,
            headers: BTreeMap::new(),
            body: "{}".to_string(),
        })
    }
}

fn returning(value: i32) -> String {
    format!(
        r#"(module
            (memory (export "memory") 1)
            {ALLOC}
            (func (export "handle") (param i32 i32) (result i32) (i32.const {value})))"#
    )
}

/// Sends `request_json` and returns whether the host call result was positive.
fn calling(request_json: &str) -> String {
    let escaped = request_json.replace('"', "\\\"");
    let len = request_json.len();
    format!(
        r#"(module
            (import "warden" "http_request" (func $http (param i32 i32) (result i64)))
            (memory (export "memory") 1)
            (data (i32.const 0) "{escaped}")
            {ALLOC}
            (func (export "handle") (param i32 i32) (result i32)
                (i64.lt_s (i64.const 0) (call $http (i32.const 0) (i32.const {len})))))"#
    )
}

fn install(root: &Path, id: &str, hooks: &str, wat: &str) {
    let dir = root.join(id);
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("plugin.json"),
        format!(r#"{{"name":"{id}","version":"1.0.0","hooks":{hooks}}}"#),
    )
    .unwrap();
    fs::write(dir.join("index.wasm"), wat::parse_str(wat).unwrap()).unwrap();
}

fn config(root: &TempDir) -> WardenConfig {
    let mut config = WardenConfig::default();
    config.discovery.installed_root = root.path().to_path_buf();
    config.discovery.external_root = root.path().join("external");
    config
}

fn runtime(config: WardenConfig, recorder: &Arc<Recorder>) -> PluginRuntime {
    PluginRuntime::builder(config)
        .secret(Some(SecretString::from("runtime-secret".to_string())))
        .transport(Arc::clone(recorder) as Arc<dyn HttpTransport>)
        .build()
        .unwrap()
}

fn tenant() -> TenantId {
    TenantId::from("acme")
}

fn push() -> WebhookRequest {
    WebhookRequest::new("POST", "/hooks/push").with_body("{}")
}

#[tokio::test]
async fn test_enable_and_invoke_webhook() {
    let root = TempDir::new().unwrap();
    install(root.path(), "warden-plugin-a", "{}", &returning(1));
    let runtime = runtime(config(&root), &Arc::new(Recorder::default()));

    assert_eq!(runtime.discover().len(), 1);
    let manifest = runtime.enable("warden-plugin-a").await.unwrap();
    assert_eq!(manifest.version, "1.0.0");
    assert_eq!(runtime.enabled_plugins().await, vec![PluginId::from("warden-plugin-a")]);

    let report = runtime
        .invoke_webhook(&"warden-plugin-a".into(), &tenant(), &push())
        .await
        .unwrap();
    assert!(report.succeeded());
    assert_eq!(report.value, Some(true));
    assert!(report.error.is_none());
    assert_eq!(runtime.stats().total_executions, 1);
}

#[tokio::test]
async fn test_invoking_unknown_plugin_is_an_error() {
    let root = TempDir::new().unwrap();
    let runtime = runtime(config(&root), &Arc::new(Recorder::default()));

    let err = runtime
        .invoke_webhook(&"warden-plugin-missing".into(), &tenant(), &push())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[tokio::test]
async fn test_handler_failure_is_reported_not_returned() {
    let root = TempDir::new().unwrap();
    install(root.path(), "warden-plugin-a", "{}", &returning(7));
    let runtime = runtime(config(&root), &Arc::new(Recorder::default()));
    runtime.enable("warden-plugin-a").await.unwrap();

    let report = runtime
        .invoke_webhook(&"warden-plugin-a".into(), &tenant(), &push())
        .await
        .unwrap();
    assert_eq!(report.state, InvocationState::Failed);
    assert!(report.value.is_none());
    assert!(report.error.unwrap().contains("handler must return boolean"));
}

#[tokio::test]
async fn test_invalid_module_is_not_enabled() {
    let root = TempDir::new().unwrap();
    let dir = root.path().join("warden-plugin-bad");
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("plugin.json"),
        r#"{"name":"warden-plugin-bad","version":"1.0.0","hooks":{"push":1}}"#,
    )
    .unwrap();
    fs::write(dir.join("index.wasm"), b"\0asm\x01\0\0\0garbage").unwrap();
    let runtime = runtime(config(&root), &Arc::new(Recorder::default()));

    let err = runtime.enable("warden-plugin-bad").await.unwrap_err();
    assert!(matches!(err, Error::ModuleLoadError { .. }));
    assert!(runtime.enabled_plugins().await.is_empty());
    assert!(runtime.hooks().registered_hooks().await.is_empty());
}

#[tokio::test]
async fn test_hooks_run_in_priority_order_until_disabled() {
    let root = TempDir::new().unwrap();
    install(root.path(), "warden-plugin-late", r#"{"push":50}"#, &returning(1));
    install(root.path(), "warden-plugin-early", r#"{"push":5,"pull":1}"#, &returning(0));
    install(root.path(), "warden-plugin-broken", r#"{"push":20}"#, &returning(3));
    let runtime = runtime(config(&root), &Arc::new(Recorder::default()));

    for id in ["warden-plugin-late", "warden-plugin-early", "warden-plugin-broken"] {
        runtime.enable(id).await.unwrap();
    }

    let report = runtime
        .invoke_hooks("push", &tenant(), &serde_json::json!({"ref": "main"}))
        .await;
    let order: Vec<&str> = report.outcomes.iter().map(|o| o.plugin_id.as_str()).collect();
    assert_eq!(
        order,
        ["warden-plugin-early", "warden-plugin-broken", "warden-plugin-late"]
    );
    assert_eq!(report.outcomes[0].value, Some(false));
    assert_eq!(report.outcomes[1].state, InvocationState::Failed);
    assert_eq!(report.outcomes[2].value, Some(true));

    assert!(runtime.disable(&"warden-plugin-early".into()).await);
    assert!(!runtime.disable(&"warden-plugin-early".into()).await);
    assert_eq!(runtime.hooks().registered_hooks().await, vec!["push".to_string()]);
    assert_eq!(runtime.hooks().handlers("push").await.len(), 2);
}

#[tokio::test]
async fn test_reenable_does_not_duplicate_hooks() {
    let root = TempDir::new().unwrap();
    install(root.path(), "warden-plugin-a", r#"{"push":1}"#, &returning(1));
    let runtime = runtime(config(&root), &Arc::new(Recorder::default()));

    runtime.enable("warden-plugin-a").await.unwrap();
    runtime.enable("warden-plugin-a").await.unwrap();

    assert_eq!(runtime.hooks().handlers("push").await.len(), 1);
}

#[tokio::test]
async fn test_minted_token_authenticates_once() {
    let root = TempDir::new().unwrap();
    install(
        root.path(),
        "warden-plugin-a",
        "{}",
        &calling(r#"{"method":"POST","url":"http://127.0.0.1:8080/api/v1/events","body":"{}"}"#),
    );
    let recorder = Arc::new(Recorder::default());
    let runtime = runtime(config(&root), &recorder);
    runtime.enable("warden-plugin-a").await.unwrap();

    let report = runtime
        .invoke_webhook(&"warden-plugin-a".into(), &tenant(), &push())
        .await
        .unwrap();
    assert_eq!(report.value, Some(true));

    let sent = recorder.sent();
    assert_eq!(sent.len(), 1);
    let header = sent[0].header("authorization").unwrap().to_string();

    let claims = runtime.authenticate(Some(&header)).await.unwrap();
    assert_eq!(claims.plugin_id.as_str(), "warden-plugin-a");
    assert_eq!(claims.tenant_id, tenant());

    let rejection = runtime.authenticate(Some(&header)).await.unwrap_err();
    assert_eq!(rejection.status_code(), 401);
    assert!(matches!(rejection.error(), Error::TokenReplay { .. }));
}

#[tokio::test]
async fn test_egress_follows_per_plugin_allowlist() {
    let root = TempDir::new().unwrap();
    let request = r#"{"url":"https://api.github.com/repos"}"#;
    install(root.path(), "warden-plugin-allowed", "{}", &calling(request));
    install(root.path(), "warden-plugin-denied", "{}", &calling(request));

    let mut config = config(&root);
    config.egress.insert(
        "warden-plugin-allowed".to_string(),
        vec!["https://api.github.com".to_string()],
    );
    let recorder = Arc::new(Recorder::default());
    let runtime = runtime(config, &recorder);
    runtime.enable("warden-plugin-allowed").await.unwrap();
    runtime.enable("warden-plugin-denied").await.unwrap();

    let allowed = runtime
        .invoke_webhook(&"warden-plugin-allowed".into(), &tenant(), &push())
        .await
        .unwrap();
    let denied = runtime
        .invoke_webhook(&"warden-plugin-denied".into(), &tenant(), &push())
        .await
        .unwrap();

    assert_eq!(allowed.value, Some(true));
    assert_eq!(denied.value, Some(false));
    let sent = recorder.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].header("authorization").is_none());
}

#[tokio::test]
async fn test_missing_secret_fails_invocation_and_authentication() {
    let root = TempDir::new().unwrap();
    install(root.path(), "warden-plugin-a", "{}", &returning(1));
    let runtime = PluginRuntime::builder(config(&root))
        .secret(None)
        .transport(Arc::new(Recorder::default()))
        .build()
        .unwrap();
    runtime.enable("warden-plugin-a").await.unwrap();

    let report = runtime
        .invoke_webhook(&"warden-plugin-a".into(), &tenant(), &push())
        .await
        .unwrap();
    assert_eq!(report.state, InvocationState::Failed);
    assert!(report.error.unwrap().contains("secret"));
    assert_eq!(runtime.stats().total_executions, 0);

    let rejection = runtime.authenticate(Some("Bearer a.b")).await.unwrap_err();
    assert_eq!(rejection.status_code(), 500);
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let root = TempDir::new().unwrap();
    let mut config = config(&root);
    config.core.base_url = "ftp://core".to_string();

    let err = PluginRuntime::builder(config)
        .secret(None)
        .transport(Arc::new(Recorder::default()))
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::ConfigError { .. }));
}
