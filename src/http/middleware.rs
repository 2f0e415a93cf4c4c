//! Request/response middleware pipeline.
//!
//! # Data Flow
//! ```text
//! OutgoingRequest
//!     → request layers, in order (request id, JSON headers, auth, custom)
//!     → transport
//!     → response layers, in order (status check, custom, trace)
//!     → Result<RawResponse, ApiError>
//! ```
//!
//! # Design Decisions
//! - Layers are plain trait objects in an ordered list; order is the contract
//! - Request layers mutate the attempt in place; response layers map the
//!   outcome to a new outcome
//! - A failing request layer aborts the attempt before anything is sent

use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use std::sync::Arc;

use crate::error::ApiError;
use crate::http::request::OutgoingRequest;
use crate::http::response::RawResponse;
use crate::observability::metrics;

/// Transforms an attempt before it is sent.
pub trait RequestLayer: Send + Sync {
    fn on_request(&self, request: &mut OutgoingRequest) -> Result<(), ApiError>;
}

/// Transforms the outcome of an attempt.
pub trait ResponseLayer: Send + Sync {
    fn on_response(
        &self,
        request: &OutgoingRequest,
        outcome: Result<RawResponse, ApiError>,
    ) -> Result<RawResponse, ApiError>;
}

/// Ordered request and response layers.
#[derive(Clone, Default)]
pub struct Pipeline {
    request_layers: Vec<Arc<dyn RequestLayer>>,
    response_layers: Vec<Arc<dyn ResponseLayer>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request_layer(mut self, layer: Arc<dyn RequestLayer>) -> Self {
        self.request_layers.push(layer);
        self
    }

    pub fn with_response_layer(mut self, layer: Arc<dyn ResponseLayer>) -> Self {
        self.response_layers.push(layer);
        self
    }

    /// Run every request layer over `request`.
    pub fn prepare(&self, request: &mut OutgoingRequest) -> Result<(), ApiError> {
        self.request_layers
            .iter()
            .try_for_each(|layer| layer.on_request(request))
    }

    /// Fold `outcome` through every response layer.
    pub fn complete(
        &self,
        request: &OutgoingRequest,
        outcome: Result<RawResponse, ApiError>,
    ) -> Result<RawResponse, ApiError> {
        self.response_layers
            .iter()
            .fold(outcome, |outcome, layer| layer.on_response(request, outcome))
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("request_layers", &self.request_layers.len())
            .field("response_layers", &self.response_layers.len())
            .finish()
    }
}

/// Sets JSON content negotiation and the User-Agent unless already present.
#[derive(Debug, Clone)]
pub struct JsonHeadersLayer {
    user_agent: HeaderValue,
}

impl JsonHeadersLayer {
    pub fn new(user_agent: &str) -> Result<Self, ApiError> {
        let user_agent = HeaderValue::from_str(user_agent)
            .map_err(|_| ApiError::InvalidRequest(format!("invalid user agent '{user_agent}'")))?;
        Ok(Self { user_agent })
    }
}

impl RequestLayer for JsonHeadersLayer {
    fn on_request(&self, request: &mut OutgoingRequest) -> Result<(), ApiError> {
        let json = HeaderValue::from_static("application/json");
        request.headers.entry(ACCEPT).or_insert_with(|| json.clone());
        if request.body.is_some() {
            request.headers.entry(CONTENT_TYPE).or_insert(json);
        }
        request
            .headers
            .entry(USER_AGENT)
            .or_insert_with(|| self.user_agent.clone());
        Ok(())
    }
}

/// Turns non-2xx responses into `ApiError::Status`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusLayer;

impl ResponseLayer for StatusLayer {
    fn on_response(
        &self,
        _request: &OutgoingRequest,
        outcome: Result<RawResponse, ApiError>,
    ) -> Result<RawResponse, ApiError> {
        let response = outcome?;
        if response.status.is_success() {
            Ok(response)
        } else {
            Err(ApiError::Status {
                status: response.status,
                body: response.body,
            })
        }
    }
}

/// Logs and records metrics for every attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceLayer;

impl ResponseLayer for TraceLayer {
    fn on_response(
        &self,
        request: &OutgoingRequest,
        outcome: Result<RawResponse, ApiError>,
    ) -> Result<RawResponse, ApiError> {
        let method = request.method.as_str();
        let elapsed = request.started_at.elapsed();

        match &outcome {
            Ok(response) => {
                tracing::debug!(
                    request_id = %request.request_id,
                    method,
                    path = %request.path,
                    attempt = request.attempt,
                    status = %response.status,
                    ?elapsed,
                    "Request completed"
                );
                metrics::record_request(method, response.status.as_str(), request.started_at);
            }
            Err(err) => {
                tracing::warn!(
                    request_id = %request.request_id,
                    method,
                    path = %request.path,
                    attempt = request.attempt,
                    error = %err,
                    ?elapsed,
                    "Request failed"
                );
                let status = err
                    .status()
                    .map(|s| s.as_str().to_string())
                    .unwrap_or_else(|| err.kind().code().to_ascii_lowercase());
                metrics::record_request(method, &status, request.started_at);
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::RequestContext;
    use reqwest::header::HeaderMap;
    use reqwest::{Method, StatusCode};

    fn request(body: bool) -> OutgoingRequest {
        let mut ctx = RequestContext::new(Method::POST, "/cart/items");
        if body {
            ctx = ctx.with_json(&serde_json::json!({"sku": "A-1"})).unwrap();
        }
        OutgoingRequest::from_context(&ctx, "https://api.shop.test", 1).unwrap()
    }

    fn response(status: StatusCode) -> RawResponse {
        RawResponse {
            status,
            headers: HeaderMap::new(),
            body: r#"{"message":"nope"}"#.into(),
        }
    }

    struct Tag(&'static str);

    impl RequestLayer for Tag {
        fn on_request(&self, request: &mut OutgoingRequest) -> Result<(), ApiError> {
            let previous = request
                .headers
                .get("x-order")
                .map(|v| v.to_str().unwrap().to_string())
                .unwrap_or_default();
            request
                .headers
                .insert("x-order", HeaderValue::from_str(&format!("{previous}{}", self.0)).unwrap());
            Ok(())
        }
    }

    struct Reject;

    impl RequestLayer for Reject {
        fn on_request(&self, _request: &mut OutgoingRequest) -> Result<(), ApiError> {
            Err(ApiError::InvalidRequest("blocked".into()))
        }
    }

    #[test]
    fn test_request_layers_run_in_order() {
        let pipeline = Pipeline::new()
            .with_request_layer(Arc::new(Tag("a")))
            .with_request_layer(Arc::new(Tag("b")));
        let mut req = request(false);
        pipeline.prepare(&mut req).unwrap();
        assert_eq!(req.headers.get("x-order").unwrap(), "ab");
    }

    #[test]
    fn test_failing_layer_stops_the_chain() {
        let pipeline = Pipeline::new()
            .with_request_layer(Arc::new(Reject))
            .with_request_layer(Arc::new(Tag("never")));
        let mut req = request(false);
        assert!(pipeline.prepare(&mut req).is_err());
        assert!(req.headers.get("x-order").is_none());
    }

    #[test]
    fn test_json_headers() {
        let layer = JsonHeadersLayer::new("storefront-test").unwrap();

        let mut with_body = request(true);
        layer.on_request(&mut with_body).unwrap();
        assert_eq!(with_body.headers.get(CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(with_body.headers.get(USER_AGENT).unwrap(), "storefront-test");

        let mut without_body = request(false);
        layer.on_request(&mut without_body).unwrap();
        assert!(without_body.headers.get(CONTENT_TYPE).is_none());
        assert_eq!(without_body.headers.get(ACCEPT).unwrap(), "application/json");
    }

    #[test]
    fn test_status_layer_maps_errors() {
        let pipeline = Pipeline::new()
            .with_response_layer(Arc::new(StatusLayer))
            .with_response_layer(Arc::new(TraceLayer));
        let req = request(false);

        assert!(pipeline.complete(&req, Ok(response(StatusCode::CREATED))).is_ok());

        let err = pipeline
            .complete(&req, Ok(response(StatusCode::CONFLICT)))
            .unwrap_err();
        match err {
            ApiError::Status { status, body } => {
                assert_eq!(status, StatusCode::CONFLICT);
                assert!(body.contains("nope"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
