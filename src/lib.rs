//! Resilient execution for fallible async operations: circuit breaking,
//! timeouts, retry with backoff, and fallback.

pub mod config;
pub mod context;
pub mod error;
pub mod observability;
pub mod resilience;

pub use config::schema::ResilienceConfig;
pub use context::{Context, ContextError};
pub use error::{CallError, CircuitOpenError, ErrorKind, ResilienceError, TimeoutScope};
pub use resilience::{
    BreakerRegistry, CircuitBreaker, CircuitState, ExecutorBuilder, FallbackHandler,
    ResilienceExecutor, RetryPolicy,
};
