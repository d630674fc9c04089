//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap a single attempt in a derived context with a deadline
//! - Return control to the caller as soon as the deadline elapses
//! - Cancel the attempt context so cooperative work stops
//!
//! # Design Decisions
//! - Uses Tokio's timer facilities via `Context::done`
//! - The attempt future is dropped on timeout; work it spawned is expected
//!   to watch its context, it is never force-killed
//! - Timeout outcomes are distinct from operation errors, but keep the error
//!   a cooperative operation returned when its context ended

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::TimeoutConfig;
use crate::context::{Context, ContextError};
use crate::error::TimeoutScope;

/// Outcome of one guarded attempt.
#[derive(Debug)]
pub enum AttemptOutcome<T, E> {
    /// The operation finished on its own.
    Completed(Result<T, E>),
    /// A deadline elapsed first. `last` is the error the operation returned
    /// after observing it, if it returned at all.
    TimedOut {
        scope: TimeoutScope,
        elapsed: Duration,
        last: Option<E>,
    },
    /// The governing context was cancelled first.
    Canceled { last: Option<E> },
}

/// Per-attempt deadline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeoutGuard {
    per_attempt: Option<Duration>,
}

impl TimeoutGuard {
    /// A zero duration disables the per-attempt timeout.
    pub fn new(per_attempt: Duration) -> Self {
        Self {
            per_attempt: (!per_attempt.is_zero()).then_some(per_attempt),
        }
    }

    pub fn disabled() -> Self {
        Self { per_attempt: None }
    }

    pub fn from_config(config: &TimeoutConfig) -> Self {
        Self {
            per_attempt: config.per_attempt(),
        }
    }

    pub fn per_attempt(&self) -> Option<Duration> {
        self.per_attempt
    }

    /// Child of `parent` scoped to one attempt.
    pub fn attempt_context(&self, parent: &Context) -> Context {
        match self.per_attempt {
            Some(timeout) => parent.with_timeout(timeout),
            None => parent.with_cancel(),
        }
    }

    /// Run one attempt of `op` under the guard.
    pub async fn run<T, E, F, Fut>(&self, parent: &Context, op: F) -> AttemptOutcome<T, E>
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let ctx = self.attempt_context(parent);
        let started = Instant::now();
        let attempt = op(ctx.clone());

        let outcome = tokio::select! {
            biased;
            result = attempt => match (result, ctx.err()) {
                // A failure caused by the context ending counts as the interruption.
                (Err(last), Some(err)) => interrupted(parent, err, started, Some(last)),
                (result, _) => AttemptOutcome::Completed(result),
            },
            err = ctx.done() => interrupted(parent, err, started, None),
        };

        // Release anything still watching this attempt.
        ctx.cancel();
        outcome
    }
}

fn interrupted<T, E>(
    parent: &Context,
    err: ContextError,
    started: Instant,
    last: Option<E>,
) -> AttemptOutcome<T, E> {
    match err {
        ContextError::DeadlineExceeded => {
            let scope = if parent.err() == Some(ContextError::DeadlineExceeded) {
                TimeoutScope::Overall
            } else {
                TimeoutScope::Attempt
            };
            AttemptOutcome::TimedOut {
                scope,
                elapsed: started.elapsed(),
                last,
            }
        }
        ContextError::Canceled => AttemptOutcome::Canceled { last },
    }
}
