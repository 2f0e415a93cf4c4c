//! Metrics collection.
//!
//! # Metrics
//! - `api_client_requests_total` (counter): attempts by method, status
//! - `api_client_request_duration_seconds` (histogram): attempt latency
//! - `api_client_retries_total` (counter): scheduled retries by method, reason
//! - `api_client_circuit_transitions_total` (counter): breaker state changes
//!   by from/to state; the endpoint key stays in logs, out of labels
//! - `api_client_token_refresh_total` (counter): refresh outcomes
//!
//! # Design Decisions
//! - The library only emits through the `metrics` facade
//! - A binary that wants to see the numbers installs the Prometheus recorder

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Install the global Prometheus recorder and return a handle for rendering.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Record a finished attempt. `status` is the HTTP status or a failure label.
pub fn record_request(method: &str, status: &str, start: Instant) {
    ::metrics::counter!(
        "api_client_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    ::metrics::histogram!(
        "api_client_request_duration_seconds",
        "method" => method.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_retry(method: &str, reason: &'static str) {
    ::metrics::counter!(
        "api_client_retries_total",
        "method" => method.to_string(),
        "reason" => reason
    )
    .increment(1);
}

pub fn record_circuit_transition(from: &'static str, to: &'static str) {
    ::metrics::counter!(
        "api_client_circuit_transitions_total",
        "from" => from,
        "to" => to
    )
    .increment(1);
}

pub fn record_token_refresh(outcome: &'static str) {
    ::metrics::counter!("api_client_token_refresh_total", "outcome" => outcome).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_transitions_are_labelled_by_state_only() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        ::metrics::with_local_recorder(&recorder, || {
            record_circuit_transition("closed", "open");
            record_circuit_transition("closed", "open");
        });

        let rendered = handle.render();
        let line = rendered
            .lines()
            .find(|l| l.starts_with("api_client_circuit_transitions_total{"))
            .unwrap();
        assert!(line.contains(r#"from="closed""#));
        assert!(line.contains(r#"to="open""#));
        assert!(!line.contains("key="));
        assert!(line.ends_with(" 2"));
    }
}
