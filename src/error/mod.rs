//! Error types for the API client.
//!
//! # Data Flow
//! ```text
//! transport / status / breaker failure
//!     → ApiError (internal, drives retry and breaker decisions)
//!     → normalize.rs
//!     → NormalizedError (the only error a caller ever sees)
//! ```

pub mod normalize;

pub use normalize::{normalize, normalize_body, NormalizedError};

use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single request attempt.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No response was received.
    #[error("Network error: {0}")]
    Network(String),

    /// The attempt exceeded its deadline.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The caller cancelled the logical request.
    #[error("Request cancelled")]
    Cancelled,

    /// Synthetic failure produced by the circuit breaker without a network call.
    #[error("Circuit open for '{key}', next trial in {retry_in:?}")]
    CircuitOpen { key: String, retry_in: Duration },

    /// The server answered with a non-2xx status.
    #[error("Request failed with status code {}", .status.as_u16())]
    Status { status: StatusCode, body: String },

    /// The server answered 2xx but the envelope reported `success: false`.
    #[error("Request rejected: {message}")]
    Rejected {
        status: StatusCode,
        message: String,
        body: String,
    },

    /// The response body did not match the expected shape.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The request could not be built.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Classification of a failure, independent of its source shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    Timeout,
    Cancelled,
    CircuitOpen,
    Server,
    BadRequest,
    Authentication,
    Authorization,
    NotFound,
    Conflict,
    Validation,
    RateLimited,
    Client,
    Decode,
}

impl ErrorKind {
    /// Classify an HTTP error status.
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => ErrorKind::BadRequest,
            401 => ErrorKind::Authentication,
            403 => ErrorKind::Authorization,
            404 => ErrorKind::NotFound,
            408 => ErrorKind::Timeout,
            409 => ErrorKind::Conflict,
            422 => ErrorKind::Validation,
            429 => ErrorKind::RateLimited,
            500..=599 => ErrorKind::Server,
            _ => ErrorKind::Client,
        }
    }

    /// Stable code for failures that carry no backend payload.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Network => "NETWORK_ERROR",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::CircuitOpen => "CIRCUIT_OPEN",
            ErrorKind::Server => "SERVER_ERROR",
            ErrorKind::BadRequest => "BAD_REQUEST",
            ErrorKind::Authentication => "UNAUTHENTICATED",
            ErrorKind::Authorization => "FORBIDDEN",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::RateLimited => "RATE_LIMITED",
            ErrorKind::Client => "CLIENT_ERROR",
            ErrorKind::Decode => "DECODE_ERROR",
        }
    }
}

impl ApiError {
    /// Map a transport error from reqwest.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }

    /// HTTP status if a response was received.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } | ApiError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Network(_) => ErrorKind::Network,
            ApiError::Timeout(_) => ErrorKind::Timeout,
            ApiError::Cancelled => ErrorKind::Cancelled,
            ApiError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            ApiError::Status { status, .. } => ErrorKind::from_status(status.as_u16()),
            ApiError::Rejected { .. } => ErrorKind::BadRequest,
            ApiError::Decode(_) => ErrorKind::Decode,
            ApiError::InvalidRequest(_) => ErrorKind::Client,
        }
    }

    /// Failures that may succeed if attempted again.
    ///
    /// Network errors, timeouts, 5xx, 408 and 429. 401, 403, 422 and every
    /// other 4xx are final.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Network(_) | ApiError::Timeout(_) => true,
            ApiError::Status { status, .. } => {
                status.is_server_error()
                    || *status == StatusCode::REQUEST_TIMEOUT
                    || *status == StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }

    /// Failures that say the endpoint itself is unhealthy.
    ///
    /// A 4xx proves the endpoint answered, so it does not count against the
    /// breaker.
    pub fn trips_breaker(&self) -> bool {
        match self {
            ApiError::Network(_) | ApiError::Timeout(_) => true,
            ApiError::Status { status, .. } => status.is_server_error(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> ApiError {
        ApiError::Status {
            status: StatusCode::from_u16(code).unwrap(),
            body: String::new(),
        }
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(status(401).kind(), ErrorKind::Authentication);
        assert_eq!(status(403).kind(), ErrorKind::Authorization);
        assert_eq!(status(404).kind(), ErrorKind::NotFound);
        assert_eq!(status(409).kind(), ErrorKind::Conflict);
        assert_eq!(status(422).kind(), ErrorKind::Validation);
        assert_eq!(status(429).kind(), ErrorKind::RateLimited);
        assert_eq!(status(503).kind(), ErrorKind::Server);
        assert_eq!(status(418).kind(), ErrorKind::Client);
    }

    #[test]
    fn test_transient_statuses() {
        for code in [408, 429, 500, 502, 503, 504] {
            assert!(status(code).is_transient(), "{code} should be transient");
        }
        for code in [400, 401, 403, 404, 409, 422] {
            assert!(!status(code).is_transient(), "{code} should be final");
        }
        assert!(ApiError::Network("refused".into()).is_transient());
        assert!(!ApiError::Cancelled.is_transient());
    }

    #[test]
    fn test_client_errors_do_not_trip_breaker() {
        assert!(status(500).trips_breaker());
        assert!(!status(429).trips_breaker());
        assert!(!status(404).trips_breaker());
        assert!(ApiError::Timeout("deadline".into()).trips_breaker());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(status(422).to_string(), "Request failed with status code 422");
        let err = ApiError::CircuitOpen {
            key: "/checkout".into(),
            retry_in: Duration::from_secs(29),
        };
        assert!(err.to_string().contains("/checkout"));
    }
}
