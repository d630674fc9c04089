//! Policy composition.
//!
//! # Responsibilities
//! - Own the order in which breaker, timeout, retry and fallback apply
//! - Feed every attempt outcome into the breaker
//! - Classify the terminal failure by stage
//!
//! # Data Flow
//! ```text
//! execute(ctx, op)
//!     → breaker gate (rejected → CircuitOpen)
//!     → overall timeout applied to ctx
//!     → loop:
//!         timeout guard → op(attempt_ctx) → breaker.record_*
//!         success → return
//!         ctx done → Timeout / Canceled
//!         not retryable → NonRetryable
//!         budget spent → RetriesExhausted
//!         else sleep(backoff) and retry
//!     → fallback (if any) on the terminal error
//! ```
//!
//! # Design Decisions
//! - The gate is consulted once per execution, not per retry; the breaker
//!   permit lives as long as the execution future
//! - Timeouts end the execution; they are never retried
//! - The fallback result is never recorded in the breaker
//! - The fallback receives the caller's context, not the overall-timeout one

use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::ResilienceConfig;
use crate::context::{Context, ContextError};
use crate::error::{ErrorKind, ResilienceError, TimeoutScope};
use crate::observability::metrics;
use crate::resilience::circuit_breaker::{CircuitBreaker, Permit};
use crate::resilience::fallback::FallbackHandler;
use crate::resilience::retries::{RetryPolicy, RetryPredicate};
use crate::resilience::timeouts::{AttemptOutcome, TimeoutGuard};

/// Which policy produced the final result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// An attempt succeeded.
    Succeeded,
    /// Execution failed and the fallback supplied the value.
    RecoveredByFallback { cause: ErrorKind },
    /// Execution failed; the error is of this kind.
    Failed(ErrorKind),
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Succeeded => "succeeded",
            Decision::RecoveredByFallback { .. } => "recovered",
            Decision::Failed(kind) => kind.as_str(),
        }
    }
}

/// Result of one execution plus how it was reached.
#[derive(Debug)]
pub struct ExecutionOutcome<T, E> {
    pub result: Result<T, ResilienceError<E>>,
    pub decision: Decision,
    pub attempts: u32,
    pub elapsed: Duration,
}

impl<T, E> ExecutionOutcome<T, E> {
    pub fn into_result(self) -> Result<T, ResilienceError<E>> {
        self.result
    }
}

/// Runs operations under a circuit breaker, timeout, retry and fallback.
///
/// Executions are independent; the breaker is the only shared state.
pub struct ResilienceExecutor<T, E> {
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    timeout: TimeoutGuard,
    overall_timeout: Option<Duration>,
    fallback: Option<FallbackHandler<T, E>>,
}

impl<T, E> Clone for ResilienceExecutor<T, E> {
    fn clone(&self) -> Self {
        Self {
            breaker: Arc::clone(&self.breaker),
            retry: self.retry.clone(),
            timeout: self.timeout,
            overall_timeout: self.overall_timeout,
            fallback: self.fallback.clone(),
        }
    }
}

impl<T, E> fmt::Debug for ResilienceExecutor<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilienceExecutor")
            .field("breaker", &self.breaker.name())
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .field("overall_timeout", &self.overall_timeout)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

impl<T, E> ResilienceExecutor<T, E>
where
    T: Send + 'static,
    E: StdError + Send + Sync + 'static,
{
    pub fn builder(breaker: Arc<CircuitBreaker>) -> ExecutorBuilder<T, E> {
        ExecutorBuilder::new(breaker)
    }

    /// Executor with its own breaker, built entirely from `config`.
    pub fn from_config(config: &ResilienceConfig) -> Self {
        ExecutorBuilder::from_config(config).build()
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Run `op` and return its value or the terminal error.
    pub async fn execute<F, Fut>(&self, ctx: &Context, op: F) -> Result<T, ResilienceError<E>>
    where
        F: FnMut(Context) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with_outcome(ctx, op).await.result
    }

    /// Like [`execute`](Self::execute), also reporting the decision, attempt
    /// count and elapsed time.
    pub async fn execute_with_outcome<F, Fut>(&self, ctx: &Context, op: F) -> ExecutionOutcome<T, E>
    where
        F: FnMut(Context) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let execution_id = Uuid::new_v4();
        let span = tracing::debug_span!(
            "resilient_execute",
            breaker = %self.breaker.name(),
            execution_id = %execution_id
        );
        self.run(ctx, op).instrument(span).await
    }

    async fn run<F, Fut>(&self, ctx: &Context, mut op: F) -> ExecutionOutcome<T, E>
    where
        F: FnMut(Context) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let started = Instant::now();
        let mut attempts = 0;

        let failure = match self.breaker.acquire() {
            Err(rejected) => ResilienceError::CircuitOpen(rejected),
            Ok(mut permit) => {
                let run_ctx = match self.overall_timeout {
                    Some(timeout) => ctx.with_timeout(timeout),
                    None => ctx.with_cancel(),
                };
                let result = self
                    .attempt_loop(&run_ctx, &mut permit, &mut op, &mut attempts, started)
                    .await;
                run_ctx.cancel();
                drop(permit);

                match result {
                    Ok(value) => {
                        return self.finish(Ok(value), Decision::Succeeded, attempts, started);
                    }
                    Err(failure) => failure,
                }
            }
        };

        self.settle(ctx, failure, attempts, started).await
    }

    async fn attempt_loop<F, Fut>(
        &self,
        run_ctx: &Context,
        permit: &mut Permit<'_>,
        op: &mut F,
        attempts: &mut u32,
        started: Instant,
    ) -> Result<T, ResilienceError<E>>
    where
        F: FnMut(Context) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let name = self.breaker.name();
        let mut backoff = self.retry.backoff();

        loop {
            *attempts += 1;
            let attempt = *attempts;

            let err = match self.timeout.run(run_ctx, |attempt_ctx| op(attempt_ctx)).await {
                AttemptOutcome::Completed(Ok(value)) => {
                    permit.record_success();
                    metrics::record_attempt(name, "success");
                    return Ok(value);
                }
                AttemptOutcome::Completed(Err(err)) => {
                    permit.record_failure();
                    metrics::record_attempt(name, "failure");
                    err
                }
                AttemptOutcome::TimedOut { scope, elapsed, last } => {
                    permit.record_failure();
                    metrics::record_attempt(name, "timeout");
                    tracing::debug!(attempt, scope = %scope, elapsed = ?elapsed, "Attempt timed out");
                    return Err(ResilienceError::Timeout {
                        scope,
                        attempts: attempt,
                        elapsed: started.elapsed(),
                        last,
                    });
                }
                AttemptOutcome::Canceled { last } => {
                    permit.record_failure();
                    metrics::record_attempt(name, "canceled");
                    return Err(ResilienceError::Canceled {
                        attempts: attempt,
                        last,
                    });
                }
            };

            if let Some(ctx_err) = run_ctx.err() {
                return Err(interrupted(ctx_err, attempt, started, err));
            }
            if !self.retry.is_retryable(&err) {
                tracing::debug!(attempt, error = %err, "Error is not retryable");
                return Err(ResilienceError::NonRetryable {
                    attempts: attempt,
                    last: err,
                });
            }
            if attempt > self.retry.max_retries() {
                return Err(ResilienceError::RetriesExhausted {
                    attempts: attempt,
                    last: err,
                });
            }

            let delay = backoff.next_delay();
            tracing::info!(attempt, delay = ?delay, error = %err, "Retrying operation");
            metrics::record_retry(name);

            if let Err(ctx_err) = run_ctx.sleep(delay).await {
                return Err(interrupted(ctx_err, attempt, started, err));
            }
        }
    }

    async fn settle(
        &self,
        ctx: &Context,
        failure: ResilienceError<E>,
        attempts: u32,
        started: Instant,
    ) -> ExecutionOutcome<T, E> {
        let cause = failure.kind();

        let Some(fallback) = &self.fallback else {
            tracing::warn!(kind = %cause, attempts, error = %failure, "Execution failed");
            return self.finish(Err(failure), Decision::Failed(cause), attempts, started);
        };

        match fallback.recover(ctx, &failure).await {
            Ok(value) => {
                tracing::info!(cause = %cause, attempts, "Fallback recovered execution");
                self.finish(
                    Ok(value),
                    Decision::RecoveredByFallback { cause },
                    attempts,
                    started,
                )
            }
            Err(fallback_err) => {
                tracing::warn!(
                    cause = %cause,
                    attempts,
                    error = %fallback_err,
                    "Fallback failed"
                );
                let failure = ResilienceError::FallbackFailed {
                    fallback: fallback_err,
                    cause: Box::new(failure),
                };
                self.finish(
                    Err(failure),
                    Decision::Failed(ErrorKind::FallbackFailed),
                    attempts,
                    started,
                )
            }
        }
    }

    fn finish(
        &self,
        result: Result<T, ResilienceError<E>>,
        decision: Decision,
        attempts: u32,
        started: Instant,
    ) -> ExecutionOutcome<T, E> {
        let elapsed = started.elapsed();
        metrics::record_execution(self.breaker.name(), decision.as_str(), elapsed);
        ExecutionOutcome {
            result,
            decision,
            attempts,
            elapsed,
        }
    }
}

/// Terminal error for a governing context that finished mid-execution.
fn interrupted<E>(err: ContextError, attempts: u32, started: Instant, last: E) -> ResilienceError<E> {
    match err {
        ContextError::DeadlineExceeded => ResilienceError::Timeout {
            scope: TimeoutScope::Overall,
            attempts,
            elapsed: started.elapsed(),
            last: Some(last),
        },
        ContextError::Canceled => ResilienceError::Canceled {
            attempts,
            last: Some(last),
        },
    }
}

/// Assembles a [`ResilienceExecutor`].
pub struct ExecutorBuilder<T, E> {
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    timeout: TimeoutGuard,
    overall_timeout: Option<Duration>,
    fallback: Option<FallbackHandler<T, E>>,
}

impl<T, E> ExecutorBuilder<T, E>
where
    T: Send + 'static,
    E: StdError + Send + Sync + 'static,
{
    /// Defaults: standard retry policy, no timeouts, no fallback.
    pub fn new(breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            breaker,
            retry: RetryPolicy::default(),
            timeout: TimeoutGuard::disabled(),
            overall_timeout: None,
            fallback: None,
        }
    }

    /// Builder with a fresh breaker named `config.name`.
    pub fn from_config(config: &ResilienceConfig) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(config.name.clone(), &config.breaker));
        Self::from_config_with_breaker(config, breaker)
    }

    /// Builder around an existing (typically shared) breaker.
    pub fn from_config_with_breaker(config: &ResilienceConfig, breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            breaker,
            retry: RetryPolicy::new(&config.retry),
            timeout: TimeoutGuard::from_config(&config.timeouts),
            overall_timeout: config.timeouts.overall(),
            fallback: None,
        }
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn retry_if(mut self, predicate: impl RetryPredicate + 'static) -> Self {
        self.retry = self.retry.retry_if(predicate);
        self
    }

    /// Per-attempt timeout; zero disables it.
    pub fn timeout(mut self, per_attempt: Duration) -> Self {
        self.timeout = TimeoutGuard::new(per_attempt);
        self
    }

    /// Deadline for the whole execution, retries and backoff included; zero
    /// disables it.
    pub fn overall_timeout(mut self, timeout: Duration) -> Self {
        self.overall_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    pub fn fallback(mut self, fallback: FallbackHandler<T, E>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn build(self) -> ResilienceExecutor<T, E> {
        ResilienceExecutor {
            breaker: self.breaker,
            retry: self.retry,
            timeout: self.timeout,
            overall_timeout: self.overall_timeout,
            fallback: self.fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CircuitBreakerConfig, RetryConfig, TimeoutConfig};
    use crate::resilience::circuit_breaker::CircuitState;
    use crate::resilience::retries::error_is;
    use std::sync::atomic::{AtomicU32, Ordering};
    use thiserror::Error;

    #[derive(Debug, Error, PartialEq)]
    enum TestError {
        #[error("temporary failure")]
        Transient,
        #[error("invalid request")]
        Fatal,
    }

    fn breaker(max_failures: u32) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(
            "test",
            &CircuitBreakerConfig {
                max_failures,
                ..CircuitBreakerConfig::default()
            },
        ))
    }

    fn retries(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(&RetryConfig {
            max_retries,
            initial_delay_ms: 10,
            backoff_factor: 2.0,
            max_delay_ms: 1000,
            jitter: 0.0,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_attempt() {
        let executor = ResilienceExecutor::<u32, TestError>::builder(breaker(3))
            .retry(retries(2))
            .build();
        let outcome = executor
            .execute_with_outcome(&Context::background(), |_ctx| async { Ok(5) })
            .await;

        assert_eq!(outcome.decision, Decision::Succeeded);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.result.ok(), Some(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let executor = ResilienceExecutor::<&str, TestError>::builder(breaker(10))
            .retry(retries(3))
            .build();

        let outcome = executor
            .execute_with_outcome(&Context::background(), |_ctx| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(TestError::Transient)
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(outcome.result.ok(), Some("done"));
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.elapsed, Duration::from_millis(30));
        assert_eq!(executor.breaker().consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_stops_early() {
        let calls = AtomicU32::new(0);
        let executor = ResilienceExecutor::<(), TestError>::builder(breaker(10))
            .retry(retries(5))
            .retry_if(|e: &(dyn StdError + 'static)| {
                e.downcast_ref::<TestError>() == Some(&TestError::Transient)
            })
            .build();

        let err = executor
            .execute(&Context::background(), |_ctx| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError::Fatal) }
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NonRetryable);
        assert_eq!(err.attempts(), 1);
        assert_eq!(err.operation_error(), Some(&TestError::Fatal));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_classification_precedes_budget() {
        let executor = ResilienceExecutor::<(), TestError>::builder(breaker(10))
            .retry(retries(0))
            .retry_if(|e: &(dyn StdError + 'static)| {
                e.downcast_ref::<TestError>() == Some(&TestError::Transient)
            })
            .build();

        let fatal = executor
            .execute(&Context::background(), |_ctx| async { Err(TestError::Fatal) })
            .await
            .unwrap_err();
        assert_eq!(fatal.kind(), ErrorKind::NonRetryable);

        let transient = executor
            .execute(&Context::background(), |_ctx| async { Err(TestError::Transient) })
            .await
            .unwrap_err();
        assert_eq!(transient.kind(), ErrorKind::RetriesExhausted);
        assert_eq!(transient.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_skips_operation() {
        let shared = breaker(1);
        shared.record_failure();
        let executor = ResilienceExecutor::<(), TestError>::builder(shared)
            .retry_if(error_is::<TestError>())
            .build();

        let calls = AtomicU32::new(0);
        let outcome = executor
            .execute_with_outcome(&Context::background(), |_ctx| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert_eq!(outcome.decision, Decision::Failed(ErrorKind::CircuitOpen));
        assert_eq!(outcome.attempts, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_on_open_circuit() {
        let shared = breaker(1);
        shared.record_failure();
        let executor = ResilienceExecutor::<u32, TestError>::builder(Arc::clone(&shared))
            .fallback(FallbackHandler::value(0))
            .build();

        let outcome = executor
            .execute_with_outcome(&Context::background(), |_ctx| async { Ok(1) })
            .await;

        assert_eq!(outcome.result.ok(), Some(0));
        assert_eq!(
            outcome.decision,
            Decision::RecoveredByFallback {
                cause: ErrorKind::CircuitOpen
            }
        );
        assert_eq!(shared.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_from_config() {
        let config = ResilienceConfig {
            name: "inventory".to_string(),
            retry: RetryConfig {
                max_retries: 1,
                initial_delay_ms: 5,
                ..RetryConfig::default()
            },
            timeouts: TimeoutConfig {
                per_attempt_ms: 10,
                overall_ms: 0,
            },
            ..ResilienceConfig::default()
        };
        let executor = ResilienceExecutor::<(), TestError>::from_config(&config);
        assert_eq!(executor.breaker().name(), "inventory");
        assert_eq!(executor.retry_policy().max_attempts(), 2);

        let err = executor
            .execute(&Context::background(), |_ctx| std::future::pending())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ResilienceError::Timeout {
                scope: TimeoutScope::Attempt,
                attempts: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_decision_labels() {
        assert_eq!(Decision::Succeeded.as_str(), "succeeded");
        assert_eq!(
            Decision::RecoveredByFallback {
                cause: ErrorKind::Timeout
            }
            .as_str(),
            "recovered"
        );
        assert_eq!(Decision::Failed(ErrorKind::Canceled).as_str(), "canceled");
    }
}
