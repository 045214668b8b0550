//! Firehose stream publisher.
//!
//! Long-lived process that listens to the filtered status stream and
//! republishes every received message onto the Kafka topic, waiting for
//! each delivery acknowledgment before accepting the next message.
//!
//! ```text
//! Status stream -> StatusStream -> PublishHandler -> TopicPublisher -> Kafka
//! ```

mod config;
mod credentials;
mod publish;
mod stream;

use anyhow::{Context, Result};
use async_trait::async_trait;
use config::Config;
use credentials::{QueueCredentials, StreamCredentials};
use publish::TopicPublisher;
use stream::{StatusStream, StreamDirective, StreamHandler};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Republishes each stream message onto the topic.
struct PublishHandler {
    publisher: TopicPublisher,
}

#[async_trait]
impl StreamHandler for PublishHandler {
    async fn on_message(&self, raw: &str) {
        info!(payload = %raw, "Received status message");
        self.publisher.publish(raw).await;
    }

    fn on_status(&self, status: u16) -> StreamDirective {
        if status == 420 || status == 429 {
            warn!(status, "Stream rate limited; signalling termination");
            StreamDirective::Disconnect
        } else {
            warn!(status, "Ignoring stream error status");
            StreamDirective::Continue
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        topic = %config.kafka.topic,
        "Starting Firehose stream publisher"
    );

    // Credentials are read exactly once, here, and passed down by reference.
    let stream_credentials = StreamCredentials::from_file(&config.stream.credentials_file)
        .context("Failed to load stream credentials")?;

    let queue_credentials = config
        .kafka
        .key_file
        .as_deref()
        .map(QueueCredentials::from_file)
        .transpose()
        .context("Failed to load queue key file")?;

    let publisher = TopicPublisher::new(&config.kafka, queue_credentials.as_ref())
        .context("Failed to initialize topic publisher")?;

    let stream = StatusStream::new(config.stream.clone(), &stream_credentials)
        .context("Failed to initialize stream client")?;

    let handler = PublishHandler { publisher };

    tokio::select! {
        result = stream.run(&handler) => {
            result.context("Stream failed")?;
            info!("Stream terminated");
        }
        _ = shutdown_signal() => {
            info!("Shutting down stream publisher");
        }
    }

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
