//! Retry logic.
//!
//! # Responsibilities
//! - Determine if a failed attempt is retryable
//! - Compute the exponential backoff before the next attempt
//!
//! # Design Decisions
//! - Never retry POST/PATCH (non-idempotent)
//! - Only network errors, timeouts, 5xx, 408 and 429 are retried
//! - 401 is left to the auth refresh path, never to this policy

use reqwest::Method;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::ApiError;
use crate::resilience::backoff::calculate_backoff;

/// Methods whose repetition has the same effect as a single call.
pub fn is_idempotent(method: &Method) -> bool {
    [Method::GET, Method::HEAD, Method::OPTIONS, Method::PUT, Method::DELETE].contains(method)
}

/// Per-failure retry decision.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter: bool,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_retries: if config.enabled { config.max_retries } else { 0 },
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
            jitter: config.jitter,
        }
    }

    /// A policy that never retries.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter: false,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Decide whether to retry after `retries_done` retries have already run.
    pub fn should_retry(&self, method: &Method, err: &ApiError, retries_done: u32) -> bool {
        retries_done < self.max_retries && is_idempotent(method) && err.is_transient()
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        calculate_backoff(retry, self.base_delay_ms, self.max_delay_ms, self.jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}
