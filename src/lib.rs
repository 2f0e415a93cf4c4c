//! Resilient client for the storefront REST API.

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod observability;
pub mod resilience;

pub use auth::{TokenPair, TokenStore};
pub use config::ClientConfig;
pub use error::{ApiError, ErrorKind, NormalizedError};
pub use http::{ApiClient, ApiClientBuilder, RequestContext};
pub use resilience::{CircuitBreaker, CircuitState, RetryPolicy};
