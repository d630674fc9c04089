//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Operation call:
//!     → circuit_breaker.rs (gate: fail fast while the resource is down)
//!     → timeouts.rs (bound each attempt with a deadline)
//!     → On failure: retries.rs (check if retryable, wait per backoff.rs)
//!     → circuit_breaker.rs (record every attempt outcome)
//!     → On terminal failure: fallback.rs (optional substitute value)
//! ```
//!
//! `executor.rs` owns that ordering; the other modules know nothing about
//! each other.
//!
//! # Design Decisions
//! - Deadlines are non-negotiable; every attempt runs under a context
//! - Retries only for errors the policy classifies as retryable
//! - Circuit breaker prevents cascading failures
//! - Breakers are owned by callers, optionally via `registry.rs`

pub mod backoff;
pub mod circuit_breaker;
pub mod executor;
pub mod fallback;
pub mod registry;
pub mod retries;
pub mod timeouts;

pub use backoff::Backoff;
pub use circuit_breaker::{BreakerStats, CircuitBreaker, CircuitState, Permit};
pub use executor::{Decision, ExecutionOutcome, ExecutorBuilder, ResilienceExecutor};
pub use fallback::{Fallback, FallbackHandler};
pub use registry::BreakerRegistry;
pub use retries::{error_is, error_matches, RetryPolicy, RetryPredicate};
pub use timeouts::{AttemptOutcome, TimeoutGuard};
