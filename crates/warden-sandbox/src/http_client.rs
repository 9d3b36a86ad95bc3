//! The plugin HTTP client: the only network-capable object a guest can reach.
//!
//! Every request is checked against an exact-origin allowlist before any
//! network activity. The core API origin is implicitly allowed, and only
//! requests under the core base URL carry the invocation's bearer token.
//!
//! # Examples
//!
//! ```no_run
//! use secrecy::SecretString;
//! use std::sync::Arc;
//! use url::Url;
//! use warden_sandbox::http_client::{
//!     DomainAllowlist, HttpRequest, PluginHttpClient, ReqwestTransport,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = PluginHttpClient::new(
//!     "warden-plugin-github".into(),
//!     Url::parse("https://core.example.com/api")?,
//!     SecretString::from("token".to_string()),
//!     DomainAllowlist::from_entries(&["https://api.github.com".to_string()])?,
//!     Arc::new(ReqwestTransport::new(std::time::Duration::from_secs(5), 1024 * 1024)?),
//! );
//!
//! let response = client.request(HttpRequest::get("https://api.github.com/zen")).await?;
//! println!("{}", response.status);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::{Origin, Url};
use warden_core::{Error, PluginId, Result, parse_origin};

/// Request as described by a guest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRequest {
    /// HTTP method, defaults to `GET`
    #[serde(default = "default_method")]
    pub method: String,
    /// Absolute target URL
    pub url: String,
    /// Request headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Request body
    #[serde(default)]
    pub body: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl HttpRequest {
    /// Creates a `GET` request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: default_method(),
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Response returned to a guest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponse {
    /// Status code
    pub status: u16,
    /// Response headers (lowercase names)
    pub headers: BTreeMap<String, String>,
    /// Body, lossily decoded as UTF-8
    pub body: String,
}

/// A request that passed the allowlist and is ready to send.
#[derive(Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    /// HTTP method
    pub method: String,
    /// Target URL
    pub url: Url,
    /// Final header list, including any attached credentials
    pub headers: Vec<(String, String)>,
    /// Request body
    pub body: Option<String>,
}

impl fmt::Debug for OutboundRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header_names: Vec<&str> = self.headers.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("OutboundRequest")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("headers", &header_names)
            .finish_non_exhaustive()
    }
}

impl OutboundRequest {
    /// Returns the first header value with a case-insensitive name match.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Performs outbound requests that already passed policy checks.
#[async_trait]
pub trait HttpTransport: Send + Sync + fmt::Debug {
    /// Sends a request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HttpError`] on transport failure.
    async fn send(&self, request: OutboundRequest) -> Result<HttpResponse>;
}

/// [`HttpTransport`] backed by `reqwest`. Redirects are never followed, so a
/// permitted origin cannot bounce a request to a forbidden one.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    max_response_bytes: usize,
}

impl ReqwestTransport {
    /// Creates a transport with a per-request timeout and response cap.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HttpError`] if the client cannot be built.
    pub fn new(timeout: Duration, max_response_bytes: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::HttpError {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            max_response_bytes,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: OutboundRequest) -> Result<HttpResponse> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| Error::InvalidArgument(format!("invalid HTTP method '{}'", request.method)))?;

        let mut builder = self.client.request(method, request.url);
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| Error::HttpError {
            message: e.to_string(),
        })?;

        let too_large = |len: u64| Error::HttpError {
            message: format!("response of {len} bytes exceeds {}", self.max_response_bytes),
        };
        if let Some(len) = response.content_length()
            && usize::try_from(len).map_or(true, |len| len > self.max_response_bytes)
        {
            return Err(too_large(len));
        }

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let bytes = response.bytes().await.map_err(|e| Error::HttpError {
            message: e.to_string(),
        })?;
        if bytes.len() > self.max_response_bytes {
            return Err(too_large(bytes.len() as u64));
        }

        Ok(HttpResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }
}

/// Explicit set of permitted origins. Matching is exact on scheme, host and
/// port; paths and subdomains never widen an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainAllowlist {
    origins: Vec<Origin>,
}

impl DomainAllowlist {
    /// Parses a list of `scheme://host[:port]` entries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] for an entry that is not a bare http(s)
    /// origin.
    pub fn from_entries(entries: &[String]) -> Result<Self> {
        let origins = entries
            .iter()
            .map(|entry| {
                parse_origin(entry).map_err(|reason| Error::ConfigError {
                    message: format!("invalid allowlist entry '{entry}': {reason}"),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { origins })
    }

    /// Returns whether `url`'s origin is listed.
    #[must_use]
    pub fn allows(&self, url: &Url) -> bool {
        let origin = url.origin();
        origin.is_tuple() && self.origins.contains(&origin)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.origins.len()
    }

    /// Returns whether the allowlist is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }
}

/// Per-invocation HTTP client handed to a guest.
///
/// Cheap to clone; the transport is shared.
#[derive(Clone)]
pub struct PluginHttpClient {
    plugin_id: PluginId,
    core_base: Url,
    token: SecretString,
    allowlist: DomainAllowlist,
    transport: Arc<dyn HttpTransport>,
}

impl fmt::Debug for PluginHttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginHttpClient")
            .field("plugin_id", &self.plugin_id)
            .field("core_base", &self.core_base.as_str())
            .field("allowlist", &self.allowlist)
            .finish_non_exhaustive()
    }
}

impl PluginHttpClient {
    /// Creates a client for one invocation.
    #[must_use]
    pub fn new(
        plugin_id: PluginId,
        core_base: Url,
        token: SecretString,
        allowlist: DomainAllowlist,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            plugin_id,
            core_base,
            token,
            allowlist,
            transport,
        }
    }

    /// Plugin the client acts for.
    #[must_use]
    pub const fn plugin_id(&self) -> &PluginId {
        &self.plugin_id
    }

    /// Sends a request after the egress check.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if the URL does not parse
    /// - [`Error::DomainNotAllowed`] if its origin is neither the core origin
    ///   nor allowlisted; no network activity happens in that case
    /// - [`Error::HttpError`] on transport failure
    pub async fn request(&self, request: HttpRequest) -> Result<HttpResponse> {
        let outbound = self.authorize(request)?;
        tracing::debug!(
            plugin_id = %self.plugin_id,
            method = %outbound.method,
            origin = %outbound.url.origin().ascii_serialization(),
            "Plugin outbound request"
        );
        self.transport.send(outbound).await
    }

    /// Applies the egress policy and credential rules without sending.
    ///
    /// # Errors
    ///
    /// Same policy errors as [`PluginHttpClient::request`].
    pub fn authorize(&self, request: HttpRequest) -> Result<OutboundRequest> {
        let url = Url::parse(&request.url)
            .map_err(|e| Error::InvalidArgument(format!("invalid URL '{}': {e}", request.url)))?;
        let origin = url.origin();

        let is_core = origin == self.core_base.origin();
        if !matches!(url.scheme(), "http" | "https") || !(is_core || self.allowlist.allows(&url)) {
            let origin = origin.ascii_serialization();
            tracing::warn!(plugin_id = %self.plugin_id, %origin, "Outbound request denied");
            return Err(Error::DomainNotAllowed { origin });
        }

        // Guests never choose the credential sent to core, and never forward it.
        let mut headers: Vec<(String, String)> = request
            .headers
            .into_iter()
            .filter(|(name, _)| !(is_core && name.eq_ignore_ascii_case("authorization")))
            .collect();
        if is_core && self.is_under_core_base(&url) {
            headers.push((
                "authorization".to_string(),
                format!("Bearer {}", self.token.expose_secret()),
            ));
        }

        Ok(OutboundRequest {
            method: request.method.to_ascii_uppercase(),
            url,
            headers,
            body: request.body,
        })
    }

    fn is_under_core_base(&self, url: &Url) -> bool {
        let base = self.core_base.path().trim_end_matches('/');
        let path = url.path();
        base.is_empty()
            || path == base
            || path
                .strip_prefix(base)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct Recorder {
        sent: Mutex<Vec<OutboundRequest>>,
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

    fn client(recorder: Arc<Recorder>, allow: &[&str]) -> PluginHttpClient {
        let entries: Vec<String> = allow.iter().map(ToString::to_string).collect();
        PluginHttpClient::new(
            "warden-plugin-a".into(),
            Url::parse("https://core.example.com/api").unwrap(),
            SecretString::from("t0ken".to_string()),
            DomainAllowlist::from_entries(&entries).unwrap(),
            recorder,
        )
    }

    #[tokio::test]
    async fn test_denied_origin_issues_no_request() {
        let recorder = Arc::new(Recorder::default());
        let client = client(Arc::clone(&recorder), &["https://api.github.com"]);

        for url in [
            "https://evil.example/x",
            "https://api.github.com.evil.example/",
            "https://evil.api.github.com/",
            "http://api.github.com/",
            "https://api.github.com:8443/",
            "file:///etc/passwd",
            "data:text/plain,hi",
        ] {
            let err = client.request(HttpRequest::get(url)).await.unwrap_err();
            assert!(matches!(err, Error::DomainNotAllowed { .. }), "{url}: {err:?}");
        }
        assert!(recorder.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_core_requests_carry_bearer_token() {
        let recorder = Arc::new(Recorder::default());
        let client = client(Arc::clone(&recorder), &[]);

        client
            .request(HttpRequest::get("https://core.example.com/api/activities"))
            .await
            .unwrap();

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].header("Authorization"), Some("Bearer t0ken"));
    }

    #[tokio::test]
    async fn test_third_party_requests_never_carry_token() {
        let recorder = Arc::new(Recorder::default());
        let client = client(Arc::clone(&recorder), &["https://api.github.com"]);

        client
            .request(HttpRequest::get("https://api.github.com/repos").with_header("x-a", "1"))
            .await
            .unwrap();

        let sent = recorder.sent.lock().unwrap();
        assert!(sent[0].header("authorization").is_none());
        assert_eq!(sent[0].header("x-a"), Some("1"));
    }

    #[test]
    fn test_guest_cannot_override_core_credentials() {
        let client = client(Arc::new(Recorder::default()), &[]);
        let outbound = client
            .authorize(
                HttpRequest::get("https://core.example.com/api/x")
                    .with_header("AUTHORIZATION", "Bearer forged"),
            )
            .unwrap();
        let auth: Vec<_> = outbound
            .headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case("authorization"))
            .collect();
        assert_eq!(auth.len(), 1);
        assert_eq!(auth[0].1, "Bearer t0ken");
    }

    #[test]
    fn test_token_only_under_core_base_path() {
        let client = client(Arc::new(Recorder::default()), &[]);
        for (url, expected) in [
            ("https://core.example.com/api", true),
            ("https://core.example.com/api/", true),
            ("https://core.example.com/api/v1/x", true),
            ("https://core.example.com/apix", false),
            ("https://core.example.com/admin", false),
        ] {
            let outbound = client.authorize(HttpRequest::get(url)).unwrap();
            assert_eq!(outbound.header("authorization").is_some(), expected, "{url}");
        }
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let client = client(Arc::new(Recorder::default()), &[]);
        let err = client.authorize(HttpRequest::get("not a url")).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_debug_hides_token() {
        let client = client(Arc::new(Recorder::default()), &[]);
        assert!(!format!("{client:?}").contains("t0ken"));

        let outbound = client
            .authorize(HttpRequest::get("https://core.example.com/api"))
            .unwrap();
        assert!(!format!("{outbound:?}").contains("t0ken"));
    }

    #[test]
    fn test_allowlist_rejects_paths() {
        assert!(DomainAllowlist::from_entries(&["https://a.example/path".to_string()]).is_err());
        let list = DomainAllowlist::from_entries(&["https://a.example".to_string()]).unwrap();
        assert_eq!(list.len(), 1);
        assert!(list.allows(&Url::parse("https://a.example/any/path?q=1").unwrap()));
    }
}
