//! Filtered stream client.
//!
//! Connects to the live status stream with the configured filter keywords
//! and language constraint and drives a [`StreamHandler`] by composition:
//! one `on_message` call per newline-delimited JSON payload, one
//! `on_status` consultation per error status. Reconnection with exponential
//! backoff belongs to this client; the handler only decides whether a
//! status is terminal.

use crate::config::StreamConfig;
use crate::credentials::StreamCredentials;
use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff};
use futures::StreamExt;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur while running the stream.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),

    #[error("reconnect budget exhausted")]
    RetriesExhausted,
}

/// What the handler wants done after an error status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamDirective {
    /// Keep the stream alive; the client reconnects.
    Continue,
    /// Tear the stream down.
    Disconnect,
}

/// Capability interface driven by the stream client.
#[async_trait]
pub trait StreamHandler: Send + Sync {
    /// Called once per received message with the raw JSON payload.
    async fn on_message(&self, raw: &str);

    /// Called with the HTTP status of a failed connection attempt.
    ///
    /// Rate limiting (420, and 429 as its modern spelling) is terminal by
    /// default; everything else keeps the stream alive.
    fn on_status(&self, status: u16) -> StreamDirective {
        if status == 420 || status == 429 {
            StreamDirective::Disconnect
        } else {
            StreamDirective::Continue
        }
    }
}

/// Client for the filtered status stream.
pub struct StatusStream {
    client: reqwest::Client,
    config: StreamConfig,
    bearer: String,
}

impl StatusStream {
    /// Create a new stream client.
    ///
    /// Only a connect timeout is set; the response body is a long-lived
    /// chunked stream and must not carry a total-request deadline.
    pub fn new(config: StreamConfig, credentials: &StreamCredentials) -> Result<Self, StreamError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(StreamError::Client)?;

        Ok(Self {
            client,
            bearer: credentials.access_token.clone(),
            config,
        })
    }

    /// Run the stream until the handler directs a disconnect.
    ///
    /// Transport errors and non-terminal statuses reconnect with
    /// exponential backoff; a successful connection resets the backoff.
    pub async fn run(&self, handler: &dyn StreamHandler) -> Result<(), StreamError> {
        let mut backoff = ExponentialBackoff {
            max_elapsed_time: None,
            ..Default::default()
        };

        loop {
            match self.connect().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        info!(
                            endpoint = %self.config.endpoint,
                            track = ?self.config.track,
                            "Connected to status stream"
                        );
                        backoff.reset();
                        self.consume(response, handler).await;
                        warn!("Status stream ended; reconnecting");
                    } else {
                        match handler.on_status(status.as_u16()) {
                            StreamDirective::Disconnect => {
                                info!(status = status.as_u16(), "Handler requested disconnect");
                                return Ok(());
                            }
                            StreamDirective::Continue => {
                                warn!(status = status.as_u16(), "Stream returned error status");
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Stream connection failed");
                }
            }

            match backoff.next_backoff() {
                Some(delay) => tokio::time::sleep(delay).await,
                None => return Err(StreamError::RetriesExhausted),
            }
        }
    }

    async fn connect(&self) -> Result<reqwest::Response, reqwest::Error> {
        self.client
            .get(&self.config.endpoint)
            .query(&[
                ("track", self.config.track.join(",")),
                ("language", self.config.languages.join(",")),
            ])
            .bearer_auth(&self.bearer)
            .send()
            .await
    }

    /// Read the chunked body line by line until the connection drops.
    ///
    /// Messages are newline-delimited JSON; blank lines are keep-alives.
    async fn consume(&self, response: reqwest::Response, handler: &dyn StreamHandler) {
        let mut body = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    buffer.extend_from_slice(&bytes);
                    while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                        let line: Vec<u8> = buffer.drain(..=pos).collect();
                        match std::str::from_utf8(&line) {
                            Ok(text) => {
                                let text = text.trim();
                                if text.is_empty() {
                                    debug!("Stream keep-alive");
                                } else {
                                    handler.on_message(text).await;
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "Dropping non-UTF-8 stream line");
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Stream read error");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopHandler;

    #[async_trait]
    impl StreamHandler for NoopHandler {
        async fn on_message(&self, _raw: &str) {}
    }

    #[test]
    fn test_rate_limit_statuses_disconnect() {
        let handler = NoopHandler;
        assert_eq!(handler.on_status(420), StreamDirective::Disconnect);
        assert_eq!(handler.on_status(429), StreamDirective::Disconnect);
    }

    #[test]
    fn test_other_statuses_continue() {
        let handler = NoopHandler;
        assert_eq!(handler.on_status(500), StreamDirective::Continue);
        assert_eq!(handler.on_status(401), StreamDirective::Continue);
        assert_eq!(handler.on_status(503), StreamDirective::Continue);
    }
}
