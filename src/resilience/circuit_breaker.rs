//! Circuit breaker for endpoint protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: endpoint assumed down, requests fail fast
//! - Half-Open: trial calls test whether the endpoint recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= failure_threshold
//! Open → Half-Open: first consultation after reset_timeout since last failure
//! Half-Open → Closed: half_open_max_successes consecutive successes
//! Half-Open → Open: any failure
//! ```
//!
//! # Design Decisions
//! - One entry per endpoint key, created lazily, never removed
//! - Open → Half-Open is evaluated at read time; there is no background timer
//! - The entry lock is never held across the guarded call

use dashmap::DashMap;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::error::ApiError;
use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Breaker bookkeeping for a single endpoint key.
#[derive(Debug, Clone)]
pub struct BreakerEntry {
    pub state: CircuitState,
    pub failures: u32,
    pub last_failure_at: Option<Instant>,
    pub success_count: u32,
}

impl BreakerEntry {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: 0,
            last_failure_at: None,
            success_count: 0,
        }
    }
}

/// Per-endpoint circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    entries: DashMap<String, BreakerEntry>,
    enabled: bool,
    failure_threshold: u32,
    reset_timeout: Duration,
    half_open_max_successes: u32,
}

impl CircuitBreaker {
    pub fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            entries: DashMap::new(),
            enabled: config.enabled,
            failure_threshold: config.failure_threshold.max(1),
            reset_timeout: config.reset_timeout(),
            half_open_max_successes: config.half_open_max_successes.max(1),
        }
    }

    /// A breaker that lets every call through and records nothing.
    pub fn disabled() -> Self {
        Self::new(&CircuitBreakerConfig {
            enabled: false,
            ..CircuitBreakerConfig::default()
        })
    }

    /// Stored state for `key`. Unknown keys are closed.
    pub fn state(&self, key: &str) -> CircuitState {
        self.entries
            .get(key)
            .map(|entry| entry.state)
            .unwrap_or(CircuitState::Closed)
    }

    /// Copy of every entry, for diagnostics.
    pub fn snapshot(&self) -> Vec<(String, BreakerEntry)> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Run `f` under the breaker for `key`, counting every error as a failure.
    pub async fn execute<T, F, Fut>(&self, key: &str, f: F) -> Result<T, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        self.execute_with(key, f, |_| true).await
    }

    /// Run `f` under the breaker for `key`.
    ///
    /// Errors for which `is_failure` returns false pass through to the caller
    /// and count as a success for the endpoint.
    pub async fn execute_with<T, F, Fut, P>(
        &self,
        key: &str,
        f: F,
        is_failure: P,
    ) -> Result<T, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
        P: Fn(&ApiError) -> bool,
    {
        if !self.enabled {
            return f().await;
        }

        self.acquire(key)?;

        let result = f().await;
        match &result {
            Err(err) if is_failure(err) => self.on_failure(key),
            _ => self.on_success(key),
        }
        result
    }

    fn acquire(&self, key: &str) -> Result<(), ApiError> {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(BreakerEntry::new);

        if entry.state != CircuitState::Open {
            return Ok(());
        }

        let elapsed = entry
            .last_failure_at
            .map(|at| at.elapsed())
            .unwrap_or(self.reset_timeout);

        if elapsed >= self.reset_timeout {
            entry.state = CircuitState::HalfOpen;
            entry.success_count = 0;
            drop(entry);
            self.transitioned(key, CircuitState::Open, CircuitState::HalfOpen);
            return Ok(());
        }

        Err(ApiError::CircuitOpen {
            key: key.to_string(),
            retry_in: self.reset_timeout - elapsed,
        })
    }

    fn on_success(&self, key: &str) {
        let Some(mut entry) = self.entries.get_mut(key) else {
            return;
        };

        match entry.state {
            CircuitState::Closed => entry.failures = 0,
            CircuitState::HalfOpen => {
                entry.success_count += 1;
                if entry.success_count >= self.half_open_max_successes {
                    entry.state = CircuitState::Closed;
                    entry.failures = 0;
                    entry.success_count = 0;
                    drop(entry);
                    self.transitioned(key, CircuitState::HalfOpen, CircuitState::Closed);
                }
            }
            // A call admitted before the circuit opened; the open period stands.
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self, key: &str) {
        let Some(mut entry) = self.entries.get_mut(key) else {
            return;
        };

        entry.last_failure_at = Some(Instant::now());
        entry.failures = entry.failures.saturating_add(1);

        let from = entry.state;
        match from {
            CircuitState::Closed if entry.failures >= self.failure_threshold => {
                entry.state = CircuitState::Open;
            }
            CircuitState::HalfOpen => {
                entry.state = CircuitState::Open;
                entry.success_count = 0;
            }
            _ => return,
        }

        let failures = entry.failures;
        drop(entry);
        tracing::warn!(
            key = %key,
            failures,
            reset_timeout = ?self.reset_timeout,
            "Circuit opened"
        );
        self.transitioned(key, from, CircuitState::Open);
    }

    fn transitioned(&self, key: &str, from: CircuitState, to: CircuitState) {
        tracing::info!(key = %key, from = from.as_str(), to = to.as_str(), "Circuit state change");
        metrics::record_circuit_transition(from.as_str(), to.as_str());
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(&CircuitBreakerConfig::default())
    }
}
