//! Landing bucket writer.

use crate::config::S3Config;
use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use tracing::{debug, info, instrument};

/// Writes one-row CSV objects into the landing bucket.
pub struct LandingStore {
    client: S3Client,
    bucket: String,
}

impl LandingStore {
    /// Create a new landing store.
    pub async fn new(config: &S3Config) -> Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "Landing store initialized"
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
        })
    }

    /// Upload a single-row CSV object.
    ///
    /// Failures propagate to the caller; the consumer leaves the offset
    /// uncommitted so the broker redelivers. Redelivery overwrites the same
    /// key, which is fine: the key is already the natural dedup key.
    #[instrument(skip(self, body), fields(key = %key))]
    pub async fn put_row(&self, key: &str, body: Vec<u8>) -> Result<()> {
        let size = body.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type("text/csv")
            .send()
            .await
            .context("Failed to upload landing object")?;

        debug!(key = %key, size_bytes = size, "Landing object uploaded");
        Ok(())
    }

    /// Get the bucket name
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}
