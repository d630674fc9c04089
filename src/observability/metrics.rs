//! Metrics collection and exposition.
//!
//! # Metrics
//! - `resilience_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `resilience_breaker_transitions_total` (counter): by breaker, target state
//! - `resilience_breaker_rejections_total` (counter): calls refused by the gate
//! - `resilience_attempts_total` (counter): by breaker, outcome
//! - `resilience_retries_total` (counter): backoff waits started
//! - `resilience_executions_total` (counter): by breaker, decision
//! - `resilience_execution_duration_seconds` (histogram): end-to-end latency
//!
//! # Design Decisions
//! - Uses the `metrics` facade; recording is a no-op without a recorder
//! - Labels are the breaker name plus one low-cardinality dimension

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::circuit_breaker::CircuitState;

/// Install the Prometheus exporter with an HTTP listener on `addr`.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

fn state_value(state: CircuitState) -> f64 {
    match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    }
}

pub fn record_breaker_state(breaker: &str, state: CircuitState) {
    metrics::gauge!("resilience_breaker_state", "breaker" => breaker.to_string())
        .set(state_value(state));
}

pub fn record_breaker_transition(breaker: &str, to: CircuitState) {
    metrics::counter!(
        "resilience_breaker_transitions_total",
        "breaker" => breaker.to_string(),
        "to" => to.as_str()
    )
    .increment(1);
    record_breaker_state(breaker, to);
}

pub fn record_breaker_rejection(breaker: &str) {
    metrics::counter!("resilience_breaker_rejections_total", "breaker" => breaker.to_string())
        .increment(1);
}

pub fn record_attempt(breaker: &str, outcome: &'static str) {
    metrics::counter!(
        "resilience_attempts_total",
        "breaker" => breaker.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_retry(breaker: &str) {
    metrics::counter!("resilience_retries_total", "breaker" => breaker.to_string()).increment(1);
}

pub fn record_execution(breaker: &str, decision: &'static str, elapsed: Duration) {
    metrics::counter!(
        "resilience_executions_total",
        "breaker" => breaker.to_string(),
        "decision" => decision
    )
    .increment(1);
    metrics::histogram!(
        "resilience_execution_duration_seconds",
        "breaker" => breaker.to_string()
    )
    .record(elapsed.as_secs_f64());
}
