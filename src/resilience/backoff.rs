//! Exponential backoff with optional jitter.

use rand::Rng;
use std::time::Duration;

/// Multiply a delay by `factor`, capping at `max`.
///
/// Computed in nanoseconds so integral factors stay exact.
fn scale(delay: Duration, factor: f64, max: Duration) -> Duration {
    let nanos = (delay.as_nanos() as f64 * factor).round();
    if !nanos.is_finite() || nanos >= max.as_nanos() as f64 {
        max
    } else {
        Duration::from_nanos(nanos as u64)
    }
}

/// Delay schedule for one retry loop.
///
/// Yields `min(initial * factor^i, max)` for i = 0, 1, 2, ...; never
/// decreasing.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    factor: f64,
    max: Duration,
    jitter: f64,
}

impl Backoff {
    /// `factor` below 1.0 (or NaN) is treated as 1.0.
    pub fn new(initial: Duration, factor: f64, max: Duration) -> Self {
        let factor = if factor.is_finite() && factor >= 1.0 {
            factor
        } else {
            1.0
        };
        Self {
            next: initial.min(max),
            factor,
            max,
            jitter: 0.0,
        }
    }

    /// Add up to `ratio * delay` of random extra wait to each delay.
    pub fn with_jitter(mut self, ratio: f64) -> Self {
        self.jitter = if ratio.is_finite() { ratio.clamp(0.0, 1.0) } else { 0.0 };
        self
    }

    /// Delay before retry number `retry` (0-based), without jitter.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let mut delay = self.next;
        for _ in 0..retry {
            if delay >= self.max {
                return self.max;
            }
            delay = scale(delay, self.factor, self.max);
        }
        delay
    }

    /// Return the current delay and advance the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.next;
        self.next = scale(self.next, self.factor, self.max);
        base + self.jitter_for(base)
    }

    fn jitter_for(&self, base: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return Duration::ZERO;
        }
        let range = (base.as_nanos() as f64 * self.jitter) as u64;
        if range == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(rand::thread_rng().gen_range(0..range))
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_delay())
    }
}
