//! Configuration schema definitions.
//!
//! This module defines the configuration structure for one protected
//! resource. All types derive Serde traits for deserialization from config
//! files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for a resilient executor.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Resource name; also the circuit breaker name in logs/metrics.
    pub name: String,

    /// Circuit breaker thresholds.
    pub breaker: CircuitBreakerConfig,

    /// Retry and backoff settings.
    pub retry: RetryConfig,

    /// Per-attempt and overall timeouts.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            breaker: CircuitBreakerConfig::default(),
            retry: RetryConfig::default(),
            timeouts: TimeoutConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures while closed before the circuit opens.
    pub max_failures: u32,

    /// Time the circuit stays open before admitting a probe, in milliseconds.
    pub reset_timeout_ms: u64,

    /// Successful probes needed in half-open to close the circuit.
    pub half_open_success_threshold: u32,

    /// Maximum concurrent half-open probes (0 = unbounded).
    pub half_open_max_probes: u32,
}

impl CircuitBreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            reset_timeout_ms: 30_000,
            half_open_success_threshold: 1,
            half_open_max_probes: 0,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt (total attempts = max_retries + 1).
    pub max_retries: u32,

    /// Delay before the first retry in milliseconds.
    pub initial_delay_ms: u64,

    /// Multiplier applied to the delay after each retry.
    pub backoff_factor: f64,

    /// Upper bound for a single delay in milliseconds.
    pub max_delay_ms: u64,

    /// Random extra delay as a fraction of each delay (0.0 - 1.0).
    pub jitter: f64,
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 100,
            backoff_factor: 2.0,
            max_delay_ms: 2000,
            jitter: 0.0,
        }
    }
}

/// Timeout configuration. Zero disables a timeout.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for a single attempt in milliseconds.
    pub per_attempt_ms: u64,

    /// Deadline for the whole retry loop in milliseconds.
    pub overall_ms: u64,
}

impl TimeoutConfig {
    pub fn per_attempt(&self) -> Option<Duration> {
        (self.per_attempt_ms > 0).then(|| Duration::from_millis(self.per_attempt_ms))
    }

    pub fn overall(&self) -> Option<Duration> {
        (self.overall_ms > 0).then(|| Duration::from_millis(self.overall_ms))
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
