//! Topic publisher with per-message delivery acknowledgment.

use crate::config::KafkaConfig;
use crate::credentials::QueueCredentials;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur setting up the publisher.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to create producer: {0}")]
    Creation(String),
}

/// Publishes raw stream messages to the fixed topic.
pub struct TopicPublisher {
    producer: FutureProducer,
    topic: String,
    ack_timeout: Duration,
}

impl TopicPublisher {
    /// Create a new publisher for the configured topic.
    pub fn new(
        config: &KafkaConfig,
        credentials: Option<&QueueCredentials>,
    ) -> Result<Self, PublishError> {
        let mut client_config = ClientConfig::new();

        client_config
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("client.id", &config.client_id);

        if config.ssl_enabled {
            client_config.set("security.protocol", "SASL_SSL");
            if let Some(ref ca_location) = config.ssl_ca_location {
                client_config.set("ssl.ca.location", ca_location);
            }
        }

        if let Some(creds) = credentials {
            client_config
                .set("sasl.mechanisms", "PLAIN")
                .set("sasl.username", &creds.username)
                .set("sasl.password", &creds.password);
        }

        let producer: FutureProducer = client_config
            .create()
            .map_err(|e| PublishError::Creation(e.to_string()))?;

        info!(
            topic = %config.topic,
            brokers = %config.bootstrap_servers,
            "Topic publisher initialized"
        );

        Ok(Self {
            producer,
            topic: config.topic.clone(),
            ack_timeout: config.ack_timeout(),
        })
    }

    /// Publish one message and wait for the broker acknowledgment.
    ///
    /// The await caps in-flight publishes at one: control does not return
    /// to the stream until this message is acknowledged or timed out.
    /// Delivery failure, including the acknowledgment timeout, is logged
    /// as a warning and swallowed; the stream keeps going.
    pub async fn publish(&self, payload: &str) {
        let record = FutureRecord::<(), _>::to(&self.topic).payload(payload);

        match self
            .producer
            .send(record, Timeout::After(self.ack_timeout))
            .await
        {
            Ok((partition, offset)) => {
                debug!(partition, offset, "Message delivered");
            }
            Err((e, _)) => {
                warn!(
                    error = %e,
                    size = payload.len(),
                    "Publishing message timed out"
                );
            }
        }
    }
}

impl Drop for TopicPublisher {
    fn drop(&mut self) {
        if let Err(e) = self.producer.flush(Timeout::After(Duration::from_secs(5))) {
            warn!(error = %e, "Failed to flush producer on shutdown");
        }
    }
}
