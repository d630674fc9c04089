//! Terminal error taxonomy for resilient execution.
//!
//! Every terminal path of the executor produces one [`ResilienceError`]
//! variant. The operation's own error (when one exists) stays reachable via
//! [`std::error::Error::source`], and [`ErrorKind`] gives a closed tag for
//! logging and metrics collaborators.

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::context::ContextError;

/// The circuit breaker gate rejected the call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit breaker '{name}' is open")]
pub struct CircuitOpenError {
    pub name: String,
}

/// Which deadline produced a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutScope {
    /// The per-attempt timeout of the timeout guard.
    Attempt,
    /// The overall timeout or the caller's own deadline.
    Overall,
}

impl fmt::Display for TimeoutScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutScope::Attempt => f.write_str("per-attempt"),
            TimeoutScope::Overall => f.write_str("overall"),
        }
    }
}

/// Closed tag over the terminal stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    CircuitOpen,
    Timeout,
    RetriesExhausted,
    NonRetryable,
    Canceled,
    FallbackFailed,
}

impl ErrorKind {
    /// Stable label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RetriesExhausted => "retries_exhausted",
            ErrorKind::NonRetryable => "non_retryable",
            ErrorKind::Canceled => "canceled",
            ErrorKind::FallbackFailed => "fallback_failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal error returned by the resilience executor.
///
/// `E` is the operation's error type. `last` fields hold the final
/// operation error when the operation actually returned one.
#[derive(Debug)]
pub enum ResilienceError<E> {
    /// The breaker rejected the call before any attempt.
    CircuitOpen(CircuitOpenError),

    /// A per-attempt or overall deadline elapsed.
    Timeout {
        scope: TimeoutScope,
        attempts: u32,
        elapsed: Duration,
        last: Option<E>,
    },

    /// Every permitted attempt failed with a retryable error.
    RetriesExhausted { attempts: u32, last: E },

    /// An attempt failed with an error the retry policy does not retry.
    NonRetryable { attempts: u32, last: E },

    /// The governing context was cancelled by the caller.
    Canceled { attempts: u32, last: Option<E> },

    /// The fallback ran after a terminal failure and failed as well.
    FallbackFailed {
        fallback: E,
        cause: Box<ResilienceError<E>>,
    },
}

impl<E> ResilienceError<E> {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResilienceError::CircuitOpen(_) => ErrorKind::CircuitOpen,
            ResilienceError::Timeout { .. } => ErrorKind::Timeout,
            ResilienceError::RetriesExhausted { .. } => ErrorKind::RetriesExhausted,
            ResilienceError::NonRetryable { .. } => ErrorKind::NonRetryable,
            ResilienceError::Canceled { .. } => ErrorKind::Canceled,
            ResilienceError::FallbackFailed { .. } => ErrorKind::FallbackFailed,
        }
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ResilienceError::CircuitOpen(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ResilienceError::Timeout { .. })
    }

    /// Operation attempts made before this error was produced.
    pub fn attempts(&self) -> u32 {
        match self {
            ResilienceError::CircuitOpen(_) => 0,
            ResilienceError::Timeout { attempts, .. }
            | ResilienceError::RetriesExhausted { attempts, .. }
            | ResilienceError::NonRetryable { attempts, .. }
            | ResilienceError::Canceled { attempts, .. } => *attempts,
            ResilienceError::FallbackFailed { cause, .. } => cause.attempts(),
        }
    }

    /// The last error returned by the operation itself, if any.
    ///
    /// For `FallbackFailed` this looks through to the original cause.
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            ResilienceError::CircuitOpen(_) => None,
            ResilienceError::Timeout { last, .. } | ResilienceError::Canceled { last, .. } => {
                last.as_ref()
            }
            ResilienceError::RetriesExhausted { last, .. }
            | ResilienceError::NonRetryable { last, .. } => Some(last),
            ResilienceError::FallbackFailed { cause, .. } => cause.operation_error(),
        }
    }

    /// The fallback's own error, when the fallback failed.
    pub fn fallback_error(&self) -> Option<&E> {
        match self {
            ResilienceError::FallbackFailed { fallback, .. } => Some(fallback),
            _ => None,
        }
    }

    /// Consume the error and return the last operation error, if any.
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            ResilienceError::CircuitOpen(_) => None,
            ResilienceError::Timeout { last, .. } | ResilienceError::Canceled { last, .. } => last,
            ResilienceError::RetriesExhausted { last, .. }
            | ResilienceError::NonRetryable { last, .. } => Some(last),
            ResilienceError::FallbackFailed { cause, .. } => cause.into_operation_error(),
        }
    }
}

impl<E: fmt::Display> fmt::Display for ResilienceError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResilienceError::CircuitOpen(e) => write!(f, "{}", e),
            ResilienceError::Timeout {
                scope,
                attempts,
                elapsed,
                last,
            } => {
                write!(
                    f,
                    "{} timeout after {:?} ({} attempt(s))",
                    scope, elapsed, attempts
                )?;
                if let Some(last) = last {
                    write!(f, ": last error: {}", last)?;
                }
                Ok(())
            }
            ResilienceError::RetriesExhausted { attempts, last } => {
                write!(f, "retries exhausted after {} attempt(s): {}", attempts, last)
            }
            ResilienceError::NonRetryable { attempts, last } => {
                write!(f, "non-retryable failure on attempt {}: {}", attempts, last)
            }
            ResilienceError::Canceled { attempts, last } => {
                write!(f, "canceled after {} attempt(s)", attempts)?;
                if let Some(last) = last {
                    write!(f, ": last error: {}", last)?;
                }
                Ok(())
            }
            ResilienceError::FallbackFailed { fallback, cause } => {
                write!(f, "fallback failed: {} (original failure: {})", fallback, cause)
            }
        }
    }
}

// Source for interruptions that carry no operation error.
static DEADLINE_EXCEEDED: ContextError = ContextError::DeadlineExceeded;
static CANCELED: ContextError = ContextError::Canceled;

impl<E> StdError for ResilienceError<E>
where
    E: StdError + 'static,
{
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ResilienceError::CircuitOpen(e) => Some(e),
            ResilienceError::Timeout { last: Some(e), .. }
            | ResilienceError::Canceled { last: Some(e), .. } => Some(e),
            ResilienceError::Timeout { last: None, .. } => Some(&DEADLINE_EXCEEDED),
            ResilienceError::Canceled { last: None, .. } => Some(&CANCELED),
            ResilienceError::RetriesExhausted { last, .. }
            | ResilienceError::NonRetryable { last, .. } => Some(last),
            ResilienceError::FallbackFailed { cause, .. } => Some(cause.as_ref()),
        }
    }
}

/// Error from [`CircuitBreaker::call`](crate::resilience::circuit_breaker::CircuitBreaker::call).
#[derive(Debug)]
pub enum CallError<E> {
    /// The gate rejected the call; the operation was not invoked.
    Rejected(CircuitOpenError),
    /// The operation ran and failed.
    Failed(E),
}

impl<E> CallError<E> {
    pub fn is_rejected(&self) -> bool {
        matches!(self, CallError::Rejected(_))
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            CallError::Rejected(_) => None,
            CallError::Failed(e) => Some(e),
        }
    }
}

impl<E: fmt::Display> fmt::Display for CallError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::Rejected(e) => write!(f, "{}", e),
            CallError::Failed(e) => write!(f, "{}", e),
        }
    }
}

impl<E> StdError for CallError<E>
where
    E: StdError + 'static,
{
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            CallError::Rejected(e) => Some(e),
            CallError::Failed(e) => Some(e),
        }
    }
}
