//! Firehose lander.
//!
//! Queue-to-storage handler: consumes raw stream messages from the Kafka
//! topic, flattens each accepted message into the fixed 16-column row, and
//! writes it as a one-row CSV object into the landing bucket. Retweets are
//! skipped; extraction and upload failures leave the offset uncommitted so
//! the broker redelivers.

mod config;
mod consumer;
mod landing;

use anyhow::{Context, Result};
use config::Config;
use consumer::LanderConsumer;
use landing::LandingStore;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting Firehose lander"
    );

    init_metrics(config.service.metrics_port)?;

    let landing = Arc::new(
        LandingStore::new(&config.s3)
            .await
            .context("Failed to initialize landing store")?,
    );

    let consumer = LanderConsumer::new(&config.kafka, landing)
        .await
        .context("Failed to initialize Kafka consumer")?;

    let consumer_handle = tokio::spawn(async move {
        if let Err(e) = consumer.run().await {
            error!(error = %e, "Kafka consumer error");
        }
    });

    info!("Lander started successfully");

    shutdown_signal().await;

    info!("Shutting down lander");

    consumer_handle.abort();

    info!("Lander stopped");

    Ok(())
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
