//! Request description and preparation.
//!
//! # Responsibilities
//! - Describe one logical request (`RequestContext`)
//! - Generate the correlation id once per logical request
//! - Build the concrete `OutgoingRequest` for each attempt
//!
//! # Design Decisions
//! - The correlation id is stable across retries and the auth replay
//! - Every attempt is rebuilt from the context, so layers never see state
//!   left over from a previous attempt

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use crate::error::ApiError;
use crate::http::middleware::RequestLayer;

/// Default correlation header.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Correlation id of a logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// One logical request, including its retries and auth replay.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    /// Path relative to the API base URL, or an absolute URL.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub headers: HeaderMap,
    /// Per-attempt deadline overriding the configured timeout.
    pub timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
    pub request_id: RequestId,
    pub(crate) auth_replayed: bool,
}

impl RequestContext {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            headers: HeaderMap::new(),
            timeout: None,
            cancel: None,
            request_id: RequestId::new(),
            auth_replayed: false,
        }
    }

    pub fn with_json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| ApiError::InvalidRequest(format!("body is not serializable: {e}")))?;
        self.body = Some(bytes);
        Ok(self)
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Resolve the target of this request against `base_url`.
    pub fn endpoint(&self, base_url: &str) -> Result<Endpoint, ApiError> {
        Endpoint::resolve(base_url, &self.path)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Whether this request already went through a refresh-and-replay.
    pub fn auth_replayed(&self) -> bool {
        self.auth_replayed
    }
}

/// Where a request goes, relative to the API base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub url: Url,
    /// Breaker and public-prefix key. The path below the base URL for API
    /// requests, `host[:port]/path` for any other origin. Never has a query.
    pub key: String,
    /// Whether the URL shares the base URL's origin.
    pub same_origin: bool,
}

impl Endpoint {
    pub fn resolve(base_url: &str, path: &str) -> Result<Self, ApiError> {
        let base = Url::parse(base_url)
            .map_err(|e| ApiError::InvalidRequest(format!("invalid base URL '{base_url}': {e}")))?;
        let url = join_url(base_url, path)?;
        let same_origin = url.origin() == base.origin();

        let key = if same_origin {
            let base_path = base.path().trim_end_matches('/');
            match url.path().strip_prefix(base_path) {
                Some("") => "/".to_string(),
                Some(rest) if rest.starts_with('/') => rest.to_string(),
                _ => url.path().to_string(),
            }
        } else {
            let host = url.host_str().unwrap_or_default();
            match url.port() {
                Some(port) => format!("{host}:{port}{}", url.path()),
                None => format!("{host}{}", url.path()),
            }
        };

        Ok(Self {
            url,
            key,
            same_origin,
        })
    }
}

/// Append `path` to `base_url`. Absolute URLs are used as they are.
pub fn join_url(base_url: &str, path: &str) -> Result<Url, ApiError> {
    let raw = if path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else if path.starts_with('/') {
        format!("{}{}", base_url.trim_end_matches('/'), path)
    } else {
        format!("{}/{}", base_url.trim_end_matches('/'), path)
    };
    Url::parse(&raw).map_err(|e| ApiError::InvalidRequest(format!("invalid URL '{raw}': {e}")))
}

/// A single attempt, as seen by the middleware pipeline.
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    pub method: Method,
    pub url: Url,
    /// Endpoint key used for public-prefix matching and logging.
    pub path: String,
    /// Credentials are only ever attached when this is set.
    pub same_origin: bool,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
    pub request_id: RequestId,
    /// 1-based attempt number within the logical request.
    pub attempt: u32,
    /// Access token attached by the auth layer, if any.
    pub credential: Option<String>,
    pub started_at: Instant,
}

impl OutgoingRequest {
    pub fn from_context(ctx: &RequestContext, base_url: &str, attempt: u32) -> Result<Self, ApiError> {
        let endpoint = ctx.endpoint(base_url)?;
        let mut url = endpoint.url;
        if !ctx.query.is_empty() {
            url.query_pairs_mut().extend_pairs(ctx.query.iter());
        }

        Ok(Self {
            method: ctx.method.clone(),
            url,
            path: endpoint.key,
            same_origin: endpoint.same_origin,
            headers: ctx.headers.clone(),
            body: ctx.body.clone(),
            request_id: ctx.request_id,
            attempt,
            credential: None,
            started_at: Instant::now(),
        })
    }
}

/// Stamps the correlation id on every attempt.
#[derive(Debug, Clone)]
pub struct RequestIdLayer {
    header: HeaderName,
}

impl RequestIdLayer {
    pub fn new(header: HeaderName) -> Self {
        Self { header }
    }
}

impl Default for RequestIdLayer {
    fn default() -> Self {
        Self::new(HeaderName::from_static(X_REQUEST_ID))
    }
}

impl RequestLayer for RequestIdLayer {
    fn on_request(&self, request: &mut OutgoingRequest) -> Result<(), ApiError> {
        let value = HeaderValue::from_str(&request.request_id.to_string())
            .map_err(|_| ApiError::InvalidRequest("request id is not a valid header value".into()))?;
        request.headers.insert(self.header.clone(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_keeps_base_path() {
        let url = join_url("https://api.shop.test/api/v1/", "/products").unwrap();
        assert_eq!(url.as_str(), "https://api.shop.test/api/v1/products");

        let url = join_url("https://api.shop.test/api/v1", "orders/7").unwrap();
        assert_eq!(url.as_str(), "https://api.shop.test/api/v1/orders/7");
    }

    #[test]
    fn test_absolute_path_is_used_verbatim() {
        let url = join_url("https://api.shop.test", "https://cdn.shop.test/banner.json").unwrap();
        assert_eq!(url.host_str(), Some("cdn.shop.test"));
    }

    #[test]
    fn test_endpoint_key_drops_query() {
        let ctx = RequestContext::new(Method::GET, "/products?page=2&sort=price");
        let endpoint = ctx.endpoint("https://api.shop.test/api/v1").unwrap();
        assert_eq!(endpoint.key, "/products");
        assert!(endpoint.same_origin);
    }

    #[test]
    fn test_endpoint_key_always_has_leading_slash() {
        let base = "https://api.shop.test/api/v1/";
        assert_eq!(Endpoint::resolve(base, "products/1").unwrap().key, "/products/1");
        assert_eq!(Endpoint::resolve(base, "/products/1").unwrap().key, "/products/1");
        assert_eq!(
            Endpoint::resolve(base, "https://api.shop.test/api/v1/orders?page=3").unwrap().key,
            "/orders"
        );
        assert_eq!(Endpoint::resolve("https://api.shop.test", "cart").unwrap().key, "/cart");
    }

    #[test]
    fn test_foreign_hosts_are_keyed_by_host() {
        let base = "https://api.shop.test/api/v1";
        let a = Endpoint::resolve(base, "https://cdn.shop.test/banners/home?v=3").unwrap();
        let b = Endpoint::resolve(base, "http://127.0.0.1:9000/banners/home").unwrap();

        assert!(!a.same_origin);
        assert!(!b.same_origin);
        assert_eq!(a.key, "cdn.shop.test/banners/home");
        assert_eq!(b.key, "127.0.0.1:9000/banners/home");

        let other_scheme = Endpoint::resolve(base, "http://api.shop.test/api/v1/cart").unwrap();
        assert!(!other_scheme.same_origin);
    }

    #[test]
    fn test_query_params_are_encoded() {
        let ctx = RequestContext::new(Method::GET, "/search")
            .with_query("q", "red shoes")
            .with_query("page", "2");
        let request = OutgoingRequest::from_context(&ctx, "https://api.shop.test", 1).unwrap();
        assert_eq!(request.url.query(), Some("q=red+shoes&page=2"));
        assert_eq!(request.path, "/search");
    }

    #[test]
    fn test_request_id_is_stable_across_attempts() {
        let ctx = RequestContext::new(Method::GET, "/cart");
        let layer = RequestIdLayer::default();

        let mut first = OutgoingRequest::from_context(&ctx, "https://api.shop.test", 1).unwrap();
        let mut second = OutgoingRequest::from_context(&ctx, "https://api.shop.test", 2).unwrap();
        layer.on_request(&mut first).unwrap();
        layer.on_request(&mut second).unwrap();

        assert_eq!(first.headers.get(X_REQUEST_ID), second.headers.get(X_REQUEST_ID));
        assert_eq!(
            first.headers.get(X_REQUEST_ID).unwrap().to_str().unwrap(),
            ctx.request_id.to_string()
        );
    }

    #[test]
    fn test_cancellation_flag() {
        let token = CancellationToken::new();
        let ctx = RequestContext::new(Method::DELETE, "/wishlist/3").with_cancellation(token.clone());
        assert!(!ctx.is_cancelled());
        token.cancel();
        assert!(ctx.is_cancelled());
    }
}
