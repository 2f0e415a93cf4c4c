//! HTTP request handling subsystem.
//!
//! # Data Flow
//! ```text
//! ApiClient::get / post / send
//!     → request.rs (RequestContext, correlation id, per-attempt request)
//!     → middleware.rs (request layers, transport, response layers)
//!     → response.rs (envelope decoding)
//!     → client.rs (breaker, retries, refresh-and-replay, normalization)
//! ```

pub mod client;
pub mod middleware;
pub mod request;
pub mod response;

pub use client::{ApiClient, ApiClientBuilder};
pub use middleware::{JsonHeadersLayer, Pipeline, RequestLayer, ResponseLayer, StatusLayer, TraceLayer};
pub use request::{
    join_url, Endpoint, OutgoingRequest, RequestContext, RequestId, RequestIdLayer, X_REQUEST_ID,
};
pub use response::{decode_body, Envelope, RawResponse};
