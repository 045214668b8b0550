//! Object storage operations for the three pipeline buckets.

use crate::config::S3Config;
use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use tracing::{debug, info, instrument};

/// S3 client shared by the workflow stages.
pub struct BucketClient {
    client: S3Client,
}

impl BucketClient {
    /// Create a new bucket client.
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

        info!(region = %config.region, "Bucket client initialized");

        Ok(Self { client })
    }

    /// List every object key in a bucket, in listing order.
    #[instrument(skip(self))]
    pub async fn list_keys(&self, bucket: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .context("Failed to list bucket objects")?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(String::from)),
            );

            match response.next_continuation_token() {
                Some(token) => continuation_token = Some(token.to_string()),
                None => break,
            }
        }

        debug!(bucket = %bucket, count = keys.len(), "Listed bucket");
        Ok(keys)
    }

    /// Download one object's content.
    pub async fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to download object {key}"))?;

        let bytes = response
            .body
            .collect()
            .await
            .with_context(|| format!("Failed to read object body {key}"))?;

        Ok(bytes.into_bytes().to_vec())
    }

    /// Upload an object.
    pub async fn upload(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .with_context(|| format!("Failed to upload object {key}"))?;

        debug!(bucket = %bucket, key = %key, "Object uploaded");
        Ok(())
    }

    /// Copy an object into another bucket under the same key.
    pub async fn copy(&self, source_bucket: &str, key: &str, destination_bucket: &str) -> Result<()> {
        let copy_source = format!("{source_bucket}/{}", encode_key(key));

        self.client
            .copy_object()
            .copy_source(copy_source)
            .bucket(destination_bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to copy object {key}"))?;

        debug!(key = %key, destination = %destination_bucket, "Object archived");
        Ok(())
    }

    /// Delete an object.
    pub async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to delete object {key}"))?;

        debug!(bucket = %bucket, key = %key, "Object deleted");
        Ok(())
    }
}

/// Percent-encode an object key for use in a copy source header.
///
/// Landing keys embed the raw created-at string, which carries spaces and
/// other characters the header must not contain. Slashes stay literal.
fn encode_key(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                encoded.push(byte as char);
            }
            _ => {
                encoded.push('%');
                encoded.push_str(&format!("{byte:02X}"));
            }
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_key_passes_unreserved() {
        assert_eq!(encode_key("td123@2021-01-01.csv"), "td123%402021-01-01.csv");
    }

    #[test]
    fn test_encode_key_escapes_spaces() {
        assert_eq!(
            encode_key("td9@Wed Jan 01.csv"),
            "td9%40Wed%20Jan%2001.csv"
        );
    }

    #[test]
    fn test_encode_key_keeps_slashes() {
        assert_eq!(encode_key("a/b.csv"), "a/b.csv");
    }
}
