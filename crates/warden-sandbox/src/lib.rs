//! WebAssembly sandbox for Warden plugin handlers.
//!
//! A handler runs in a fresh Wasmtime store per invocation with no WASI
//! linked. Its only capabilities are the `warden` host imports: a
//! plugin-tagged logger, an allowlisted HTTP client and a timer. Execution is
//! bounded by a wall-clock timeout, a linear memory ceiling and a host call
//! budget.

#![warn(missing_docs, missing_debug_implementations)]

pub mod cache;
mod epoch;
pub mod host_functions;
pub mod http_client;
pub mod sandbox;
pub mod security;
mod stats;

pub use http_client::{
    DomainAllowlist, HttpRequest, HttpResponse, HttpTransport, OutboundRequest,
    PluginHttpClient, ReqwestTransport,
};
pub use sandbox::{CompiledHandler, InvocationContext, Sandbox};
pub use security::{SandboxConfig, SandboxConfigBuilder};
pub use stats::SandboxStats;
