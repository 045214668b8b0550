//! Firehose consolidator.
//!
//! Scheduled batch workflow: once a minute, drain the landing bucket into
//! one local CSV file, clean its text columns, upload the result to the
//! consolidated bucket, and append the rows to the warehouse table.
//!
//! Runs never overlap: each takes a Postgres advisory lock first and a
//! tick that finds the lock held is skipped outright — no queueing, no
//! backfill of missed runs.

mod buckets;
mod cleaner;
mod config;
mod warehouse;
mod workflow;

use anyhow::{Context, Result};
use buckets::BucketClient;
use cleaner::TextCleaner;
use config::Config;
use std::sync::Arc;
use tokio::signal;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use warehouse::Warehouse;
use workflow::{Consolidator, RunSummary};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        interval_secs = config.workflow.interval_secs,
        "Starting Firehose consolidator"
    );

    init_metrics(config.service.metrics_port)?;

    let warehouse = Arc::new(
        Warehouse::new(&config.database)
            .await
            .context("Failed to initialize warehouse")?,
    );

    if config.database.run_migrations {
        warehouse
            .run_migrations()
            .await
            .context("Failed to run database migrations")?;
    }

    let buckets = BucketClient::new(&config.s3)
        .await
        .context("Failed to initialize bucket client")?;

    let cleaner = TextCleaner::new().context("Failed to compile cleaning patterns")?;

    let consolidator = Consolidator::new(
        buckets,
        warehouse.clone(),
        cleaner,
        config.s3.clone(),
        config.workflow.clone(),
    );

    // `--once` runs a single consolidation and exits, for external
    // schedulers and smoke tests.
    let run_once = std::env::args().any(|arg| arg == "--once");
    if run_once {
        match run_locked(&consolidator, &warehouse, config.workflow.lock_key).await? {
            Some(summary) => log_summary(&summary),
            None => warn!("Another consolidation run holds the lock; nothing done"),
        }
        return Ok(());
    }

    let mut ticker = tokio::time::interval(config.run_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match run_locked(&consolidator, &warehouse, config.workflow.lock_key).await {
                    Ok(Some(summary)) => log_summary(&summary),
                    Ok(None) => {
                        warn!("Previous consolidation run still in progress; skipping this tick");
                        metrics::counter!("consolidator.runs.skipped").increment(1);
                    }
                    Err(e) => {
                        error!(error = %e, "Consolidation run failed");
                        metrics::counter!("consolidator.runs.failed").increment(1);
                    }
                }
            }
            _ = shutdown_signal() => {
                info!("Shutting down consolidator");
                break;
            }
        }
    }

    Ok(())
}

/// Run one consolidation under the advisory lock.
///
/// Returns `None` when the lock is contended. The lock is released even
/// when the run fails; the failure itself still propagates.
async fn run_locked(
    consolidator: &Consolidator,
    warehouse: &Warehouse,
    lock_key: i64,
) -> Result<Option<RunSummary>> {
    let Some(lock) = warehouse.try_lock_run(lock_key).await? else {
        return Ok(None);
    };

    let result = consolidator.run().await;

    if let Err(e) = lock.release().await {
        warn!(error = %e, "Failed to release run lock");
    }

    result.map(Some)
}

fn log_summary(summary: &RunSummary) {
    metrics::counter!("consolidator.runs.completed").increment(1);
    info!(
        objects = summary.objects_drained,
        rows_cleaned = summary.rows_cleaned,
        rows_loaded = summary.rows_loaded,
        "Consolidation run complete"
    );
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
