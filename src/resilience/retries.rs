//! Retry logic.
//!
//! # Responsibilities
//! - Bound the number of attempts (`max_retries + 1`)
//! - Classify failures as retryable or fatal
//! - Produce the backoff schedule for one execution
//!
//! # Design Decisions
//! - No predicates configured means every failure is retryable
//! - Predicates see the whole `source()` chain, so wrapped errors match
//! - Context cancellation and deadline errors are never retried
//! - The policy is immutable and shared between concurrent executions

use std::error::Error as StdError;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::context::ContextError;
use crate::resilience::backoff::Backoff;

/// Walk an error and its `source()` chain.
pub fn error_chain<'a>(
    err: &'a (dyn StdError + 'static),
) -> impl Iterator<Item = &'a (dyn StdError + 'static)> {
    std::iter::successors(Some(err), |&e| e.source())
}

/// True if a `ContextError` appears anywhere in the chain.
pub fn is_context_error(err: &(dyn StdError + 'static)) -> bool {
    error_chain(err).any(|e| e.is::<ContextError>())
}

/// Decides whether a failure may be retried.
pub trait RetryPredicate: Send + Sync {
    fn matches(&self, err: &(dyn StdError + 'static)) -> bool;
}

impl<F> RetryPredicate for F
where
    F: Fn(&(dyn StdError + 'static)) -> bool + Send + Sync,
{
    fn matches(&self, err: &(dyn StdError + 'static)) -> bool {
        self(err)
    }
}

/// Matches when an error of type `T` appears in the chain.
pub struct ErrorIs<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> RetryPredicate for ErrorIs<T>
where
    T: StdError + 'static,
{
    fn matches(&self, err: &(dyn StdError + 'static)) -> bool {
        error_chain(err).any(|e| e.is::<T>())
    }
}

/// Retry errors of type `T`, wherever they sit in the chain.
pub fn error_is<T: StdError + 'static>() -> ErrorIs<T> {
    ErrorIs {
        _marker: PhantomData,
    }
}

/// Matches when an error of type `T` in the chain satisfies `check`.
pub struct ErrorMatches<T, F> {
    check: F,
    _marker: PhantomData<fn() -> T>,
}

impl<T, F> RetryPredicate for ErrorMatches<T, F>
where
    T: StdError + 'static,
    F: Fn(&T) -> bool + Send + Sync,
{
    fn matches(&self, err: &(dyn StdError + 'static)) -> bool {
        error_chain(err)
            .filter_map(|e| e.downcast_ref::<T>())
            .any(|e| (self.check)(e))
    }
}

/// Retry errors of type `T` for which `check` returns true.
pub fn error_matches<T, F>(check: F) -> ErrorMatches<T, F>
where
    T: StdError + 'static,
    F: Fn(&T) -> bool + Send + Sync,
{
    ErrorMatches {
        check,
        _marker: PhantomData,
    }
}

/// Bounded retry with exponential backoff and error classification.
#[derive(Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_delay: Duration,
    backoff_factor: f64,
    max_delay: Duration,
    jitter: f64,
    retryable: Vec<Arc<dyn RetryPredicate>>,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: config.initial_delay(),
            backoff_factor: config.backoff_factor.max(1.0),
            max_delay: config.max_delay().max(config.initial_delay()),
            jitter: config.jitter,
            retryable: Vec::new(),
        }
    }

    /// A policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self::new(&RetryConfig {
            max_retries: 0,
            ..RetryConfig::default()
        })
    }

    /// Restrict retries to errors matching any registered predicate.
    pub fn retry_if(mut self, predicate: impl RetryPredicate + 'static) -> Self {
        self.retryable.push(Arc::new(predicate));
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total attempts permitted, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn is_retryable(&self, err: &(dyn StdError + 'static)) -> bool {
        if is_context_error(err) {
            return false;
        }
        self.retryable.is_empty() || self.retryable.iter().any(|p| p.matches(err))
    }

    /// Fresh delay schedule for one execution.
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.initial_delay, self.backoff_factor, self.max_delay)
            .with_jitter(self.jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("initial_delay", &self.initial_delay)
            .field("backoff_factor", &self.backoff_factor)
            .field("max_delay", &self.max_delay)
            .field("jitter", &self.jitter)
            .field("predicates", &self.retryable.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thiserror::Error;

    #[derive(Debug, Error)]
    #[error("connection reset")]
    struct ConnectionReset;

    #[derive(Debug, Error)]
    #[error("status {0}")]
    struct Status(u16);

    #[derive(Debug, Error)]
    #[error("request failed")]
    struct RequestFailed(#[source] Box<dyn StdError + Send + Sync>);

    #[test]
    fn test_empty_predicates_retry_everything() {
        let policy = RetryPolicy::default();
        assert!(policy.is_retryable(&ConnectionReset));
        assert!(policy.is_retryable(&Status(400)));
    }

    #[test]
    fn test_context_errors_never_retried() {
        let policy = RetryPolicy::default();
        assert!(!policy.is_retryable(&ContextError::DeadlineExceeded));
        let wrapped = RequestFailed(Box::new(ContextError::Canceled));
        assert!(!policy.is_retryable(&wrapped));
    }

    #[test]
    fn test_error_is_walks_chain() {
        let policy = RetryPolicy::default().retry_if(error_is::<ConnectionReset>());
        assert!(policy.is_retryable(&ConnectionReset));
        assert!(policy.is_retryable(&RequestFailed(Box::new(ConnectionReset))));
        assert!(!policy.is_retryable(&Status(503)));
    }

    #[test]
    fn test_error_matches_and_closures() {
        let policy = RetryPolicy::default()
            .retry_if(error_matches(|s: &Status| s.0 >= 500))
            .retry_if(|e: &(dyn StdError + 'static)| e.to_string().contains("reset"));

        assert!(policy.is_retryable(&Status(503)));
        assert!(!policy.is_retryable(&Status(404)));
        assert!(policy.is_retryable(&ConnectionReset));
        assert!(policy.is_retryable(&RequestFailed(Box::new(Status(502)))));
    }

    #[test]
    fn test_attempt_bounds() {
        assert_eq!(RetryPolicy::no_retry().max_attempts(), 1);
        let policy = RetryPolicy::new(&RetryConfig {
            max_retries: 2,
            ..RetryConfig::default()
        });
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(
            policy.backoff().take(2).collect::<Vec<_>>(),
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
    }
}
