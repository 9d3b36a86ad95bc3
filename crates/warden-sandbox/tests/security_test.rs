//! Sandbox boundary tests.
//!
//! Guests are written in WAT against the `warden` import ABI:
//! - wall-clock timeout for CPU loops and suspended guests
//! - boolean return contract
//! - egress allowlist and bearer token placement
//! - host call budget and memory ceiling

use async_trait::async_trait;
use secrecy::SecretString;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;
use warden_core::{Error, InvocationState, PluginId, Result, TenantId, WebhookRequest};
use warden_sandbox::host_functions::{
    HTTP_DOMAIN_NOT_ALLOWED, HTTP_MALFORMED_REQUEST, HTTP_RESPONSE_TOO_LARGE,
};
use warden_sandbox::{
    CompiledHandler, DomainAllowlist, HttpResponse, HttpTransport, InvocationContext,
    OutboundRequest, PluginHttpClient, Sandbox, SandboxConfig,
};

const PLUGIN: &str = "warden-plugin-test";
const CORE_BASE: &str = "http://127.0.0.1:8080/api";

/// Bump allocator shared by every guest.
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
            body: "ok".to_string(),
        })
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warden_sandbox=debug,warden::plugin=trace")
        .with_test_writer()
        .try_init();
}

fn compile(sandbox: &Sandbox, wat: &str) -> CompiledHandler {
    let bytes = wat::parse_str(wat).unwrap();
    sandbox
        .compile(&PluginId::from(PLUGIN), &bytes)
        .unwrap()
}

fn sandbox_with(config: SandboxConfig) -> Sandbox {
    init_tracing();
    Sandbox::new(config).unwrap()
}

fn client(recorder: &Arc<Recorder>, allowlist: &[&str]) -> PluginHttpClient {
    let entries: Vec<String> = allowlist.iter().map(ToString::to_string).collect();
    PluginHttpClient::new(
        PluginId::from(PLUGIN),
        Url::parse(CORE_BASE).unwrap(),
        SecretString::from("invocation-token".to_string()),
        DomainAllowlist::from_entries(&entries).unwrap(),
        Arc::clone(recorder) as Arc<dyn HttpTransport>,
    )
}

/// A guest whose handler sends `request_json` and returns
/// `(check <result>)`, e.g. `i64.lt_s (i64.const 0)` for "0 < result".
fn http_guest(request_json: &str, check: &str) -> String {
    let escaped = request_json.replace('"', "\\\"");
    let len = request_json.len();
    format!(
        r#"
        (module
            (import "warden" "http_request" (func $http (param i32 i32) (result i64)))
            (memory (export "memory") 1)
            (data (i32.const 0) "{escaped}")
            {ALLOC}
            (func (export "handle") (param i32 i32) (result i32)
                ({check} (call $http (i32.const 0) (i32.const {len})))))
        "#
    )
}

async fn run(
    sandbox: &Sandbox,
    handler: &CompiledHandler,
    context: InvocationContext,
) -> Result<warden_core::ExecutionResult> {
    sandbox
        .execute(handler, context, &WebhookRequest::new("POST", "/hooks/push").with_body("{}"))
        .await
}

fn tenant() -> InvocationContext {
    InvocationContext::new(TenantId::from("acme"))
}

#[tokio::test]
async fn test_cpu_loop_times_out() {
    let sandbox = sandbox_with(
        SandboxConfig::builder()
            .timeout(Duration::from_millis(100))
            .build(),
    );
    let handler = compile(
        &sandbox,
        &format!(
            r#"(module
                (memory (export "memory") 1)
                {ALLOC}
                (func (export "handle") (param i32 i32) (result i32)
                    (loop $spin (br $spin))
                    (i32.const 1)))"#
        ),
    );

    let outcome = run(&sandbox, &handler, tenant()).await;

    assert_eq!(InvocationState::for_outcome(&outcome), InvocationState::TimedOut);
    assert!(matches!(outcome, Err(Error::Timeout { .. })));
    let stats = sandbox.collect_stats();
    assert_eq!(stats.timeouts, 1);
    assert_eq!(stats.execution_failures, 1);
}

#[tokio::test]
async fn test_sleep_past_timeout_times_out() {
    let sandbox = sandbox_with(
        SandboxConfig::builder()
            .timeout(Duration::from_millis(100))
            .build(),
    );
    let handler = compile(
        &sandbox,
        &format!(
            r#"(module
                (import "warden" "sleep" (func $sleep (param i32)))
                (memory (export "memory") 1)
                {ALLOC}
                (func (export "handle") (param i32 i32) (result i32)
                    (call $sleep (i32.const 10000))
                    (i32.const 1)))"#
        ),
    );

    let outcome = run(&sandbox, &handler, tenant()).await;
    assert!(outcome.unwrap_err().is_timeout());
}

#[tokio::test]
async fn test_short_sleep_completes() {
    let sandbox = sandbox_with(SandboxConfig::default());
    let handler = compile(
        &sandbox,
        &format!(
            r#"(module
                (import "warden" "sleep" (func $sleep (param i32)))
                (memory (export "memory") 1)
                {ALLOC}
                (func (export "handle") (param i32 i32) (result i32)
                    (call $sleep (i32.const 5))
                    (i32.const 0)))"#
        ),
    );

    let result = run(&sandbox, &handler, tenant()).await.unwrap();
    assert!(!result.value);
    assert_eq!(result.host_calls, 1);
}

#[tokio::test]
async fn test_non_boolean_return_is_contract_error() {
    let sandbox = sandbox_with(SandboxConfig::default());
    let handler = compile(
        &sandbox,
        &format!(
            r#"(module
                (memory (export "memory") 1)
                {ALLOC}
                (func (export "handle") (param i32 i32) (result i32) (i32.const 42)))"#
        ),
    );

    let err = run(&sandbox, &handler, tenant()).await.unwrap_err();
    assert!(err.is_contract_error());
    assert!(err.to_string().contains("handler must return boolean"));
}

#[tokio::test]
async fn test_wrong_handler_signature_is_contract_error() {
    let sandbox = sandbox_with(SandboxConfig::default());
    let handler = compile(
        &sandbox,
        &format!(
            r#"(module
                (memory (export "memory") 1)
                {ALLOC}
                (func (export "handle") (param i32 i32) (result i64) (i64.const 1)))"#
        ),
    );

    let err = run(&sandbox, &handler, tenant()).await.unwrap_err();
    assert!(err.to_string().contains("handler must return boolean"));
}

#[tokio::test]
async fn test_missing_handle_export_is_contract_error() {
    let sandbox = sandbox_with(SandboxConfig::default());
    let handler = compile(
        &sandbox,
        &format!(r#"(module (memory (export "memory") 1) {ALLOC})"#),
    );

    let err = run(&sandbox, &handler, tenant()).await.unwrap_err();
    assert!(err.is_contract_error());
}

#[tokio::test]
async fn test_handler_receives_request_json() {
    let sandbox = sandbox_with(SandboxConfig::default());
    // Returns whether the first request byte is '{'.
    let handler = compile(
        &sandbox,
        &format!(
            r#"(module
                (memory (export "memory") 1)
                {ALLOC}
                (func (export "handle") (param $ptr i32) (param $len i32) (result i32)
                    (i32.eq (i32.load8_u (local.get $ptr)) (i32.const 123))))"#
        ),
    );

    let result = run(&sandbox, &handler, tenant()).await.unwrap();
    assert!(result.value);
}

#[tokio::test]
async fn test_trap_fails_invocation() {
    let sandbox = sandbox_with(SandboxConfig::default());
    let handler = compile(
        &sandbox,
        &format!(
            r#"(module
                (memory (export "memory") 1)
                {ALLOC}
                (func (export "handle") (param i32 i32) (result i32) unreachable))"#
        ),
    );

    let outcome = run(&sandbox, &handler, tenant()).await;
    assert_eq!(InvocationState::for_outcome(&outcome), InvocationState::Failed);
    assert!(matches!(outcome, Err(Error::ExecutionError { .. })));
}

#[tokio::test]
async fn test_denied_origin_makes_no_network_call() {
    let sandbox = sandbox_with(SandboxConfig::default());
    let recorder = Arc::new(Recorder::default());
    let handler = compile(
        &sandbox,
        &http_guest(
            r#"{"url":"https://api.github.com.evil.example/x"}"#,
            &format!("i64.eq (i64.const {HTTP_DOMAIN_NOT_ALLOWED})"),
        ),
    );

    let context = tenant().with_http_client(client(&recorder, &["https://api.github.com"]));
    let result = run(&sandbox, &handler, context).await.unwrap();

    assert!(result.value);
    assert!(recorder.sent().is_empty());
}

#[tokio::test]
async fn test_no_client_denies_everything() {
    let sandbox = sandbox_with(SandboxConfig::default());
    let handler = compile(
        &sandbox,
        &http_guest(
            r#"{"url":"http://127.0.0.1:8080/api/ping"}"#,
            &format!("i64.eq (i64.const {HTTP_DOMAIN_NOT_ALLOWED})"),
        ),
    );

    let result = run(&sandbox, &handler, tenant()).await.unwrap();
    assert!(result.value);
}

#[tokio::test]
async fn test_core_call_carries_bearer_token() {
    let sandbox = sandbox_with(SandboxConfig::default());
    let recorder = Arc::new(Recorder::default());
    let handler = compile(
        &sandbox,
        &http_guest(
            r#"{"method":"POST","url":"http://127.0.0.1:8080/api/v1/events","body":"{}"}"#,
            "i64.lt_s (i64.const 0)",
        ),
    );

    let context = tenant().with_http_client(client(&recorder, &[]));
    let result = run(&sandbox, &handler, context).await.unwrap();

    assert!(result.value);
    let sent = recorder.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].method, "POST");
    assert_eq!(
        sent[0].header("authorization"),
        Some("Bearer invocation-token")
    );
}

#[tokio::test]
async fn test_third_party_call_has_no_token() {
    let sandbox = sandbox_with(SandboxConfig::default());
    let recorder = Arc::new(Recorder::default());
    let handler = compile(
        &sandbox,
        &http_guest(
            r#"{"url":"https://api.github.com/zen","headers":{"accept":"text/plain"}}"#,
            "i64.lt_s (i64.const 0)",
        ),
    );

    let context = tenant().with_http_client(client(&recorder, &["https://api.github.com"]));
    let result = run(&sandbox, &handler, context).await.unwrap();

    assert!(result.value);
    let sent = recorder.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].header("authorization"), None);
    assert_eq!(sent[0].header("accept"), Some("text/plain"));
}

#[tokio::test]
async fn test_malformed_request_json() {
    let sandbox = sandbox_with(SandboxConfig::default());
    let recorder = Arc::new(Recorder::default());
    let handler = compile(
        &sandbox,
        &http_guest(
            "not json",
            &format!("i64.eq (i64.const {HTTP_MALFORMED_REQUEST})"),
        ),
    );

    let context = tenant().with_http_client(client(&recorder, &[]));
    assert!(run(&sandbox, &handler, context).await.unwrap().value);
    assert!(recorder.sent().is_empty());
}

#[tokio::test]
async fn test_oversized_response_is_withheld() {
    let sandbox = sandbox_with(SandboxConfig::builder().max_response_bytes(10).build());
    let recorder = Arc::new(Recorder::default());
    let handler = compile(
        &sandbox,
        &http_guest(
            r#"{"url":"http://127.0.0.1:8080/api/big"}"#,
            &format!("i64.eq (i64.const {HTTP_RESPONSE_TOO_LARGE})"),
        ),
    );

    let context = tenant().with_http_client(client(&recorder, &[]));
    assert!(run(&sandbox, &handler, context).await.unwrap().value);
}

#[tokio::test]
async fn test_host_call_limit_traps() {
    let sandbox = sandbox_with(SandboxConfig::builder().max_host_calls(3).build());
    let handler = compile(
        &sandbox,
        &format!(
            r#"(module
                (import "warden" "log" (func $log (param i32 i32 i32)))
                (memory (export "memory") 1)
                (data (i32.const 0) "tick")
                {ALLOC}
                (func (export "handle") (param i32 i32) (result i32)
                    (loop $again
                        (call $log (i32.const 2) (i32.const 0) (i32.const 4))
                        (br $again))
                    (i32.const 1)))"#
        ),
    );

    let err = run(&sandbox, &handler, tenant()).await.unwrap_err();
    assert!(matches!(err, Error::ExecutionError { .. }));
    assert!(err.to_string().contains("host call limit"));
}

#[tokio::test]
async fn test_memory_growth_is_refused() {
    let sandbox = sandbox_with(SandboxConfig::builder().memory_limit_mb(1).build());
    // memory.grow yields -1 when the limiter refuses.
    let handler = compile(
        &sandbox,
        &format!(
            r#"(module
                (memory (export "memory") 1)
                {ALLOC}
                (func (export "handle") (param i32 i32) (result i32)
                    (i32.eq (memory.grow (i32.const 100)) (i32.const -1))))"#
        ),
    );

    assert!(run(&sandbox, &handler, tenant()).await.unwrap().value);
}

#[tokio::test]
async fn test_oversized_initial_memory_fails_instantiation() {
    let sandbox = sandbox_with(SandboxConfig::builder().memory_limit_mb(1).build());
    let handler = compile(
        &sandbox,
        &format!(
            r#"(module
                (memory (export "memory") 100)
                {ALLOC}
                (func (export "handle") (param i32 i32) (result i32) (i32.const 1)))"#
        ),
    );

    let outcome = run(&sandbox, &handler, tenant()).await;
    assert_eq!(InvocationState::for_outcome(&outcome), InvocationState::Failed);
}

#[tokio::test]
async fn test_no_state_leaks_between_invocations() {
    let sandbox = sandbox_with(SandboxConfig::default());
    // Returns true only on the first call within an instance.
    let handler = compile(
        &sandbox,
        &format!(
            r#"(module
                (memory (export "memory") 1)
                (global $calls (mut i32) (i32.const 0))
                {ALLOC}
                (func (export "handle") (param i32 i32) (result i32)
                    (global.set $calls (i32.add (global.get $calls) (i32.const 1)))
                    (i32.eq (global.get $calls) (i32.const 1))))"#
        ),
    );

    for _ in 0..3 {
        assert!(run(&sandbox, &handler, tenant()).await.unwrap().value);
    }
}

#[tokio::test]
async fn test_no_wasi_imports_available() {
    let sandbox = sandbox_with(SandboxConfig::default());
    let handler = compile(
        &sandbox,
        &format!(
            r#"(module
                (import "wasi_snapshot_preview1" "fd_write"
                    (func (param i32 i32 i32 i32) (result i32)))
                (memory (export "memory") 1)
                {ALLOC}
                (func (export "handle") (param i32 i32) (result i32) (i32.const 1)))"#
        ),
    );

    assert!(run(&sandbox, &handler, tenant()).await.is_err());
}
