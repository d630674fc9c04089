//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! CircuitBreaker / ResilienceExecutor produce:
//!     → tracing events (transitions, retries, terminal failures)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields on every event (breaker name, attempt, delay)
//! - Execution ID flows through the `resilient_execute` span
//! - Metrics are cheap and no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
