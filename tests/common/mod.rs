//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use resilient_exec::config::{CircuitBreakerConfig, RetryConfig};
use resilient_exec::context::ContextError;
use resilient_exec::resilience::{CircuitBreaker, RetryPolicy};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TestError {
    #[error("transient failure")]
    Transient,

    #[error("fatal failure")]
    Fatal,

    #[error("fallback unavailable")]
    FallbackUnavailable,

    #[error("interrupted")]
    Interrupted(#[from] ContextError),
}

/// Breaker with explicit thresholds and unbounded half-open probes.
pub fn breaker(max_failures: u32, reset_timeout_ms: u64, success_threshold: u32) -> Arc<CircuitBreaker> {
    Arc::new(CircuitBreaker::new(
        "test-backend",
        &CircuitBreakerConfig {
            max_failures,
            reset_timeout_ms,
            half_open_success_threshold: success_threshold,
            half_open_max_probes: 0,
        },
    ))
}

/// Exact (jitter-free) retry policy.
pub fn retry_policy(max_retries: u32, initial_delay_ms: u64, backoff_factor: f64) -> RetryPolicy {
    RetryPolicy::new(&RetryConfig {
        max_retries,
        initial_delay_ms,
        backoff_factor,
        max_delay_ms: 60_000,
        jitter: 0.0,
    })
}

/// Counts operation invocations across clones.
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicU32>);

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one call and return its 0-based index.
    pub fn hit(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}
