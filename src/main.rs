//! Resilience simulator.
//!
//! Drives a synthetic, unreliable dependency through a
//! [`ResilienceExecutor`] so breaker, retry, timeout and fallback behavior
//! can be observed from the logs and the final stats.
//!
//! # Architecture Overview
//!
//! ```text
//!     ┌───────────────────────────────────────────────────────────┐
//!     │                     resilient-exec                        │
//!     │                                                           │
//!     │   clap args ──▶ config (TOML) ──▶ ResilienceExecutor      │
//!     │                                        │                  │
//!     │   ctrl-c ──▶ root Context ─────────────┤                  │
//!     │                                        ▼                  │
//!     │                              simulated dependency         │
//!     │                       (latency, failures, hangs)          │
//!     │                                        │                  │
//!     │   stdout ◀── JSON summary ◀── outcomes + breaker stats    │
//!     └───────────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use resilient_exec::config::{load_config, ResilienceConfig};
use resilient_exec::context::{Context, ContextError};
use resilient_exec::observability::{logging, metrics};
use resilient_exec::resilience::{
    BreakerStats, Decision, ExecutorBuilder, FallbackHandler, ResilienceExecutor,
};

#[derive(Parser)]
#[command(name = "resilient-exec")]
#[command(about = "Run synthetic calls through a resilient executor", long_about = None)]
struct Cli {
    /// TOML configuration file; built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of executions to run
    #[arg(short = 'n', long, default_value_t = 50)]
    calls: u32,

    /// Probability that an attempt fails
    #[arg(long, default_value_t = 0.3)]
    failure_rate: f64,

    /// Probability that an attempt hangs until its context ends
    #[arg(long, default_value_t = 0.0)]
    hang_rate: f64,

    /// Latency of a successful or failing attempt
    #[arg(long, default_value_t = 20)]
    latency_ms: u64,

    /// Pause between executions
    #[arg(long, default_value_t = 10)]
    interval_ms: u64,

    /// Static value substituted when an execution fails
    #[arg(long)]
    fallback: Option<String>,

    /// Expose Prometheus metrics regardless of the config file
    #[arg(long)]
    metrics: bool,
}

#[derive(Debug, Error)]
enum DependencyError {
    #[error("dependency unavailable")]
    Unavailable,

    #[error("dependency call interrupted")]
    Interrupted(#[from] ContextError),
}

#[derive(Debug, Clone, Copy)]
struct Profile {
    failure_rate: f64,
    hang_rate: f64,
    latency: Duration,
}

async fn simulated_call(ctx: Context, profile: Profile) -> Result<String, DependencyError> {
    let roll: f64 = rand::random();
    if roll < profile.hang_rate {
        return Err(ctx.done().await.into());
    }
    ctx.sleep(profile.latency).await?;
    if roll < profile.hang_rate + profile.failure_rate {
        Err(DependencyError::Unavailable)
    } else {
        Ok(format!("ok ({:.3})", roll))
    }
}

#[derive(Debug, Default, Serialize)]
struct Summary {
    executions: u32,
    succeeded: u32,
    recovered: u32,
    failed: BTreeMap<&'static str, u32>,
    attempts: u64,
    breaker: Option<BreakerStats>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ResilienceConfig::default(),
    };

    logging::init_logging(&config.observability.log_level)?;
    tracing::info!("resilient-exec v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        name = %config.name,
        max_failures = config.breaker.max_failures,
        reset_timeout_ms = config.breaker.reset_timeout_ms,
        max_retries = config.retry.max_retries,
        per_attempt_ms = config.timeouts.per_attempt_ms,
        overall_ms = config.timeouts.overall_ms,
        "Configuration loaded"
    );

    if cli.metrics || config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let mut builder = ExecutorBuilder::<String, DependencyError>::from_config(&config);
    if let Some(value) = cli.fallback.clone() {
        builder = builder.fallback(FallbackHandler::value(value));
    }
    let executor: ResilienceExecutor<String, DependencyError> = builder.build();

    let root = Context::background();
    let on_signal = root.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, cancelling");
            on_signal.cancel();
        }
    });

    let profile = Profile {
        failure_rate: cli.failure_rate.clamp(0.0, 1.0),
        hang_rate: cli.hang_rate.clamp(0.0, 1.0),
        latency: Duration::from_millis(cli.latency_ms),
    };
    let interval = Duration::from_millis(cli.interval_ms);

    let mut summary = Summary::default();
    for call in 1..=cli.calls {
        if root.is_done() {
            break;
        }

        let outcome = executor
            .execute_with_outcome(&root, |ctx| simulated_call(ctx, profile))
            .await;

        summary.executions += 1;
        summary.attempts += u64::from(outcome.attempts);
        match outcome.decision {
            Decision::Succeeded => summary.succeeded += 1,
            Decision::RecoveredByFallback { .. } => summary.recovered += 1,
            Decision::Failed(kind) => *summary.failed.entry(kind.as_str()).or_default() += 1,
        }

        match &outcome.result {
            Ok(value) => tracing::info!(
                call,
                decision = outcome.decision.as_str(),
                attempts = outcome.attempts,
                elapsed = ?outcome.elapsed,
                value = %value,
                "Execution finished"
            ),
            Err(e) => tracing::info!(
                call,
                decision = outcome.decision.as_str(),
                attempts = outcome.attempts,
                elapsed = ?outcome.elapsed,
                error = %e,
                "Execution finished"
            ),
        }

        if root.sleep(interval).await.is_err() {
            break;
        }
    }

    summary.breaker = Some(executor.breaker().stats());
    println!("{}", serde_json::to_string_pretty(&summary)?);

    tracing::info!("Simulation complete");
    Ok(())
}
