//! Host functions linked into every plugin instance.
//!
//! All imports live in the `warden` module. They are the guest's entire view
//! of the outside world:
//!
//! | import | signature | effect |
//! |---|---|---|
//! | `log` | `(level: i32, ptr: i32, len: i32)` | plugin-tagged log line |
//! | `http_request` | `(ptr: i32, len: i32) -> i64` | request through [`PluginHttpClient`] |
//! | `sleep` | `(ms: i32)` | suspend on the tokio timer |
//!
//! `http_request` takes a JSON [`HttpRequest`] and returns the JSON
//! [`HttpResponse`] packed as `(ptr << 32) | len`, written through the guest's
//! `alloc` export, or a negative status code.
//!
//! Every call counts toward the invocation's host call budget; exceeding it
//! traps the guest.
//!
//! [`HttpRequest`]: crate::http_client::HttpRequest
//! [`HttpResponse`]: crate::http_client::HttpResponse

use crate::http_client::{HttpRequest, PluginHttpClient};
use crate::sandbox::StoreData;
use std::time::Duration;
use warden_core::{Error, PluginId, Result, TenantId};
use wasmtime::{Caller, Extern, Linker, Memory};

/// Import module name.
pub const HOST_MODULE: &str = "warden";

/// `http_request`: request JSON could not be read or parsed.
pub const HTTP_MALFORMED_REQUEST: i64 = -1;
/// `http_request`: origin not allowlisted; nothing was sent.
pub const HTTP_DOMAIN_NOT_ALLOWED: i64 = -2;
/// `http_request`: the transport failed.
pub const HTTP_TRANSPORT_FAILURE: i64 = -3;
/// `http_request`: the response exceeds the configured cap.
pub const HTTP_RESPONSE_TOO_LARGE: i64 = -4;

const MAX_LOG_BYTES: usize = 4 * 1024;
const MAX_REQUEST_BYTES: usize = 256 * 1024;

/// Reasons a host function traps the guest.
#[derive(Debug, thiserror::Error)]
pub enum HostTrap {
    /// The invocation used up its host call budget.
    #[error("host call limit of {max} exceeded")]
    CallLimitExceeded {
        /// Configured budget
        max: usize,
    },
    /// Pointer or length outside guest memory.
    #[error("guest memory access out of bounds")]
    MemoryAccess,
    /// A required export is missing or has the wrong type.
    #[error("guest does not export '{0}'")]
    MissingExport(&'static str),
}

/// Per-invocation state reachable from host functions.
#[derive(Debug, Clone)]
pub struct HostContext {
    plugin_id: PluginId,
    tenant_id: TenantId,
    http: Option<PluginHttpClient>,
    max_calls: usize,
    max_response_bytes: usize,
    calls: usize,
}

impl HostContext {
    /// Creates a context. Without an HTTP client every request is denied.
    #[must_use]
    pub const fn new(
        plugin_id: PluginId,
        tenant_id: TenantId,
        http: Option<PluginHttpClient>,
        max_calls: usize,
        max_response_bytes: usize,
    ) -> Self {
        Self {
            plugin_id,
            tenant_id,
            http,
            max_calls,
            max_response_bytes,
            calls: 0,
        }
    }

    /// Plugin this context belongs to.
    #[must_use]
    pub const fn plugin_id(&self) -> &PluginId {
        &self.plugin_id
    }

    /// Host calls made so far.
    #[must_use]
    pub const fn call_count(&self) -> usize {
        self.calls
    }

    /// Counts a call and fails once the budget is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`HostTrap::CallLimitExceeded`].
    pub fn check_call_limit(&mut self) -> std::result::Result<(), HostTrap> {
        self.calls += 1;
        if self.calls > self.max_calls {
            tracing::warn!(
                plugin_id = %self.plugin_id,
                max = self.max_calls,
                "Host call limit exceeded"
            );
            return Err(HostTrap::CallLimitExceeded {
                max: self.max_calls,
            });
        }
        Ok(())
    }
}

/// Registers the `warden` imports on a linker.
///
/// # Errors
///
/// Returns [`Error::WasmError`] if a definition is rejected.
pub(crate) fn link(linker: &mut Linker<StoreData>) -> Result<()> {
    let link_error = |name: &str, e: &wasmtime::Error| Error::WasmError {
        message: format!("failed to link {HOST_MODULE}::{name}: {e}"),
    };

    linker
        .func_wrap(HOST_MODULE, "log", host_log)
        .map_err(|e| link_error("log", &e))?;

    linker
        .func_wrap_async(
            HOST_MODULE,
            "http_request",
            |mut caller: Caller<'_, StoreData>, (ptr, len): (i32, i32)| {
                Box::new(async move { host_http_request(&mut caller, ptr, len).await })
            },
        )
        .map_err(|e| link_error("http_request", &e))?;

    linker
        .func_wrap_async(
            HOST_MODULE,
            "sleep",
            |mut caller: Caller<'_, StoreData>, (ms,): (i32,)| {
                Box::new(async move { host_sleep(&mut caller, ms).await })
            },
        )
        .map_err(|e| link_error("sleep", &e))?;

    Ok(())
}

fn host_log(mut caller: Caller<'_, StoreData>, level: i32, ptr: i32, len: i32) -> wasmtime::Result<()> {
    caller.data_mut().host.check_call_limit()?;

    let len = len.clamp(0, i32::try_from(MAX_LOG_BYTES).unwrap_or(i32::MAX));
    let bytes = read_guest(&mut caller, ptr, len)?;
    let message = String::from_utf8_lossy(&bytes);
    let host = &caller.data().host;
    let plugin_id = host.plugin_id.as_str();
    let tenant_id = host.tenant_id.as_str();

    match level {
        i32::MIN..=0 => tracing::trace!(target: "warden::plugin", plugin_id, tenant_id, "{message}"),
        1 => tracing::debug!(target: "warden::plugin", plugin_id, tenant_id, "{message}"),
        2 => tracing::info!(target: "warden::plugin", plugin_id, tenant_id, "{message}"),
        3 => tracing::warn!(target: "warden::plugin", plugin_id, tenant_id, "{message}"),
        _ => tracing::error!(target: "warden::plugin", plugin_id, tenant_id, "{message}"),
    }
    Ok(())
}

async fn host_http_request(
    caller: &mut Caller<'_, StoreData>,
    ptr: i32,
    len: i32,
) -> wasmtime::Result<i64> {
    caller.data_mut().host.check_call_limit()?;

    if usize::try_from(len).map_or(true, |len| len > MAX_REQUEST_BYTES) {
        return Ok(HTTP_MALFORMED_REQUEST);
    }
    let Ok(bytes) = read_guest(caller, ptr, len) else {
        return Ok(HTTP_MALFORMED_REQUEST);
    };
    let Ok(request) = serde_json::from_slice::<HttpRequest>(&bytes) else {
        return Ok(HTTP_MALFORMED_REQUEST);
    };

    let host = &caller.data().host;
    let max_response_bytes = host.max_response_bytes;
    let Some(client) = host.http.clone() else {
        tracing::warn!(plugin_id = %host.plugin_id, "Outbound request without an HTTP client");
        return Ok(HTTP_DOMAIN_NOT_ALLOWED);
    };

    let response = match client.request(request).await {
        Ok(response) => response,
        Err(Error::DomainNotAllowed { .. }) => return Ok(HTTP_DOMAIN_NOT_ALLOWED),
        Err(Error::InvalidArgument(_)) => return Ok(HTTP_MALFORMED_REQUEST),
        Err(e) => {
            tracing::debug!(plugin_id = %client.plugin_id(), error = %e, "Outbound request failed");
            return Ok(HTTP_TRANSPORT_FAILURE);
        }
    };

    let encoded = serde_json::to_vec(&response)?;
    if encoded.len() > max_response_bytes {
        return Ok(HTTP_RESPONSE_TOO_LARGE);
    }
    let out_ptr = write_guest(caller, &encoded).await?;
    Ok(pack_ptr_len(out_ptr, encoded.len()))
}

async fn host_sleep(caller: &mut Caller<'_, StoreData>, ms: i32) -> wasmtime::Result<()> {
    caller.data_mut().host.check_call_limit()?;
    let ms = u64::try_from(ms).unwrap_or(0);
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Ok(())
}

fn guest_memory(caller: &mut Caller<'_, StoreData>) -> std::result::Result<Memory, HostTrap> {
    match caller.get_export("memory") {
        Some(Extern::Memory(memory)) => Ok(memory),
        _ => Err(HostTrap::MissingExport("memory")),
    }
}

fn read_guest(
    caller: &mut Caller<'_, StoreData>,
    ptr: i32,
    len: i32,
) -> std::result::Result<Vec<u8>, HostTrap> {
    let (Ok(offset), Ok(len)) = (usize::try_from(ptr), usize::try_from(len)) else {
        return Err(HostTrap::MemoryAccess);
    };
    let memory = guest_memory(caller)?;
    let mut buf = vec![0; len];
    memory
        .read(&*caller, offset, &mut buf)
        .map_err(|_| HostTrap::MemoryAccess)?;
    Ok(buf)
}

async fn write_guest(caller: &mut Caller<'_, StoreData>, bytes: &[u8]) -> wasmtime::Result<i32> {
    let alloc = match caller.get_export("alloc") {
        Some(Extern::Func(func)) => func
            .typed::<i32, i32>(&*caller)
            .map_err(|_| HostTrap::MissingExport("alloc"))?,
        _ => return Err(HostTrap::MissingExport("alloc").into()),
    };
    let len = i32::try_from(bytes.len())?;
    let ptr = alloc.call_async(&mut *caller, len).await?;

    let offset = usize::try_from(ptr).map_err(|_| HostTrap::MemoryAccess)?;
    let memory = guest_memory(caller)?;
    memory
        .write(&mut *caller, offset, bytes)
        .map_err(|_| HostTrap::MemoryAccess)?;
    Ok(ptr)
}

/// Packs a guest pointer and length into the `http_request` return value.
#[must_use]
pub fn pack_ptr_len(ptr: i32, len: usize) -> i64 {
    let ptr = i64::from(ptr.cast_unsigned());
    let len = u32::try_from(len).map_or(i64::from(u32::MAX), i64::from);
    (ptr << 32) | len
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(max_calls: usize) -> HostContext {
        HostContext::new("warden-plugin-a".into(), "acme".into(), None, max_calls, 1024)
    }

    #[test]
    fn test_call_limit() {
        let mut ctx = context(2);
        assert!(ctx.check_call_limit().is_ok());
        assert!(ctx.check_call_limit().is_ok());
        let err = ctx.check_call_limit().unwrap_err();
        assert!(matches!(err, HostTrap::CallLimitExceeded { max: 2 }));
        assert_eq!(ctx.call_count(), 3);
    }

    #[test]
    fn test_pack_ptr_len() {
        assert_eq!(pack_ptr_len(0, 0), 0);
        assert_eq!(pack_ptr_len(1024, 16), (1024_i64 << 32) | 16);
        assert!(pack_ptr_len(i32::MAX, 1) > 0);
    }

    #[test]
    fn test_error_codes_are_distinct_and_negative() {
        let codes = [
            HTTP_MALFORMED_REQUEST,
            HTTP_DOMAIN_NOT_ALLOWED,
            HTTP_TRANSPORT_FAILURE,
            HTTP_RESPONSE_TOO_LARGE,
        ];
        for (i, a) in codes.iter().enumerate() {
            assert!(*a < 0);
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
