//! Contention tests for the circuit breaker.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use resilient_exec::config::CircuitBreakerConfig;
use resilient_exec::context::Context;
use resilient_exec::resilience::{CircuitBreaker, CircuitState, ResilienceExecutor};

mod common;
use common::{breaker, ms, retry_policy, TestError};

const THREADS: usize = 16;

fn on_all_threads<F>(f: F) -> Vec<thread::JoinHandle<u32>>
where
    F: Fn() -> u32 + Send + Sync + 'static,
{
    let barrier = Arc::new(Barrier::new(THREADS));
    let f = Arc::new(f);
    (0..THREADS)
        .map(|_| {
            let barrier = barrier.clone();
            let f = f.clone();
            thread::spawn(move || {
                barrier.wait();
                f()
            })
        })
        .collect()
}

fn join_sum(handles: Vec<thread::JoinHandle<u32>>) -> u32 {
    handles.into_iter().map(|h| h.join().unwrap()).sum()
}

#[test]
fn test_concurrent_failures_are_all_counted() {
    let shared = breaker(10_000, 1000, 1);
    let cb = shared.clone();
    join_sum(on_all_threads(move || {
        for _ in 0..100 {
            cb.record_failure();
        }
        0
    }));

    assert_eq!(shared.consecutive_failures(), 1600);
    assert_eq!(shared.state(), CircuitState::Closed);
}

#[test]
fn test_threshold_crossed_once_under_contention() {
    let shared = breaker(50, 60_000, 1);
    let cb = shared.clone();
    join_sum(on_all_threads(move || {
        for _ in 0..10 {
            cb.record_failure();
        }
        0
    }));

    let stats = shared.stats();
    assert_eq!(stats.state, CircuitState::Open);
    assert_eq!(stats.times_opened, 1);
}

#[test]
fn test_single_half_open_transition_per_window() {
    let shared = breaker(1, 20, 1);
    shared.record_failure();
    assert_eq!(shared.state(), CircuitState::Open);
    thread::sleep(ms(30));

    let cb = shared.clone();
    let admitted = join_sum(on_all_threads(move || cb.allow_request() as u32));

    let stats = shared.stats();
    assert_eq!(stats.state, CircuitState::HalfOpen);
    assert_eq!(stats.half_open_transitions, 1);
    // Probes are unbounded by default.
    assert_eq!(admitted, THREADS as u32);
}

#[test]
fn test_bounded_probes_admit_exactly_limit() {
    let shared = Arc::new(CircuitBreaker::new(
        "bounded",
        &CircuitBreakerConfig {
            max_failures: 1,
            reset_timeout_ms: 20,
            half_open_success_threshold: 1,
            half_open_max_probes: 1,
        },
    ));
    shared.record_failure();
    thread::sleep(ms(30));

    let cb = shared.clone();
    let admitted = join_sum(on_all_threads(move || cb.allow_request() as u32));

    let stats = shared.stats();
    assert_eq!(admitted, 1);
    assert_eq!(stats.half_open_transitions, 1);
    assert_eq!(stats.rejected_requests, THREADS as u64 - 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shared_breaker_across_executors() {
    let shared = breaker(5, 60_000, 1);
    let invoked = Arc::new(AtomicU32::new(0));
    let executor = ResilienceExecutor::<(), TestError>::builder(shared.clone())
        .retry(retry_policy(0, 1, 1.0))
        .build();

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let executor = executor.clone();
            let invoked = invoked.clone();
            tokio::spawn(async move {
                executor
                    .execute(&Context::background(), |_ctx| {
                        invoked.fetch_add(1, Ordering::SeqCst);
                        async { Err(TestError::Transient) }
                    })
                    .await
            })
        })
        .collect();

    let mut rejected = 0;
    for task in tasks {
        if task.await.unwrap().unwrap_err().is_circuit_open() {
            rejected += 1;
        }
    }

    let stats = shared.stats();
    assert_eq!(stats.state, CircuitState::Open);
    assert_eq!(stats.times_opened, 1);
    assert!(invoked.load(Ordering::SeqCst) >= 5);
    assert_eq!(invoked.load(Ordering::SeqCst) + rejected, 32);
    assert_eq!(stats.rejected_requests, u64::from(rejected));
}
