//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request attempt:
//!     → circuit_breaker.rs (fail fast if the endpoint is open)
//!     → timeouts.rs (enforce per-attempt deadline, honor cancellation)
//!     → On failure: retries.rs (check if retryable, wait with backoff.rs)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every attempt has a deadline
//! - Retries only for idempotent requests (GET, HEAD, OPTIONS, PUT, DELETE)
//! - Circuit breaker state is per endpoint key, never global

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{BreakerEntry, CircuitBreaker, CircuitState};
pub use retries::{is_idempotent, RetryPolicy};
