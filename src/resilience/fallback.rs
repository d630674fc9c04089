//! Fallback substitution.
//!
//! A fallback is consulted at most once per execution, after the breaker,
//! timeout and retry paths have produced a terminal error. It sees that
//! error and may return a substitute value. Its own failure never replaces
//! the original one; the executor reports both.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::error::ResilienceError;

/// Produces a substitute result for a failed execution.
#[async_trait]
pub trait Fallback<T, E>: Send + Sync {
    async fn recover(&self, ctx: &Context, cause: &ResilienceError<E>) -> Result<T, E>;
}

struct FnFallback<F>(F);

#[async_trait]
impl<T, E, F> Fallback<T, E> for FnFallback<F>
where
    F: Fn(&Context, &ResilienceError<E>) -> Result<T, E> + Send + Sync,
    T: Send + 'static,
    E: Send + Sync + 'static,
{
    async fn recover(&self, ctx: &Context, cause: &ResilienceError<E>) -> Result<T, E> {
        (self.0)(ctx, cause)
    }
}

struct StaticFallback<T>(T);

#[async_trait]
impl<T, E> Fallback<T, E> for StaticFallback<T>
where
    T: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    async fn recover(&self, _ctx: &Context, _cause: &ResilienceError<E>) -> Result<T, E> {
        Ok(self.0.clone())
    }
}

/// Shared handle to a fallback; cheap to clone.
pub struct FallbackHandler<T, E> {
    inner: Arc<dyn Fallback<T, E>>,
}

impl<T, E> FallbackHandler<T, E>
where
    T: Send + 'static,
    E: Send + Sync + 'static,
{
    pub fn new(fallback: impl Fallback<T, E> + 'static) -> Self {
        Self {
            inner: Arc::new(fallback),
        }
    }

    /// Synchronous fallback computed from the terminal error.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&Context, &ResilienceError<E>) -> Result<T, E> + Send + Sync + 'static,
    {
        Self::new(FnFallback(f))
    }

    /// Always substitute `value`.
    pub fn value(value: T) -> Self
    where
        T: Clone + Sync,
    {
        Self::new(StaticFallback(value))
    }

    pub async fn recover(&self, ctx: &Context, cause: &ResilienceError<E>) -> Result<T, E> {
        self.inner.recover(ctx, cause).await
    }
}

impl<T, E> Clone for FallbackHandler<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, E> fmt::Debug for FallbackHandler<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackHandler").finish_non_exhaustive()
    }
}
