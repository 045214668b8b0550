//! The five-stage consolidation run.
//!
//! ```text
//! drain -> clean -> upload -> cleanup -> load
//! ```
//!
//! Stages run strictly in order; a failure halts the run at that stage and
//! nothing compensates for earlier stages — an object already archived and
//! deleted stays that way.

use crate::buckets::BucketClient;
use crate::cleaner::{clean_file, TextCleaner};
use crate::config::{S3Config, WorkflowConfig};
use crate::warehouse::Warehouse;
use anyhow::{Context, Result};
use firehose_model::StatusRow;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument};

/// Outcome of one consolidation run.
#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    pub objects_drained: usize,
    pub rows_cleaned: usize,
    pub rows_loaded: u64,
}

/// Executes consolidation runs.
pub struct Consolidator {
    buckets: BucketClient,
    warehouse: Arc<Warehouse>,
    cleaner: TextCleaner,
    s3: S3Config,
    workflow: WorkflowConfig,
    local_path: PathBuf,
}

impl Consolidator {
    pub fn new(
        buckets: BucketClient,
        warehouse: Arc<Warehouse>,
        cleaner: TextCleaner,
        s3: S3Config,
        workflow: WorkflowConfig,
    ) -> Self {
        let local_path = PathBuf::from(&workflow.local_path);
        Self {
            buckets,
            warehouse,
            cleaner,
            s3,
            workflow,
            local_path,
        }
    }

    /// Execute one full run.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<RunSummary> {
        let objects_drained = self.drain().await.context("drain stage failed")?;
        let rows_cleaned = self.clean().await.context("clean stage failed")?;
        self.upload().await.context("upload stage failed")?;
        self.cleanup().await.context("cleanup stage failed")?;
        let rows_loaded = self.load().await.context("load stage failed")?;

        Ok(RunSummary {
            objects_drained,
            rows_cleaned,
            rows_loaded,
        })
    }

    /// Stage 1: fold every landing object into the local consolidated file,
    /// archiving and deleting each as it goes.
    ///
    /// Objects are processed in listing order, which is not chronological.
    async fn drain(&self) -> Result<usize> {
        let keys = self.buckets.list_keys(&self.s3.landing_bucket).await?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&self.local_path)
            .context("Failed to create consolidated file")?;

        for key in &keys {
            let bytes = self.buckets.download(&self.s3.landing_bucket, key).await?;
            let content = String::from_utf8(bytes)
                .with_context(|| format!("Landing object {key} is not UTF-8"))?;

            let fields: Vec<&str> = content.split(',').collect();
            writer
                .write_record(&fields)
                .with_context(|| format!("Failed to append row from {key}"))?;

            self.buckets
                .copy(&self.s3.landing_bucket, key, &self.s3.archive_bucket)
                .await?;
            self.buckets.delete(&self.s3.landing_bucket, key).await?;
        }

        writer.flush().context("Failed to flush consolidated file")?;

        metrics::counter!("consolidator.objects.drained").increment(keys.len() as u64);
        info!(objects = keys.len(), "Drained landing bucket");
        Ok(keys.len())
    }

    /// Stage 2: clean the text, source, and last columns in place.
    async fn clean(&self) -> Result<usize> {
        clean_file(&self.local_path, &self.cleaner)
    }

    /// Stage 3: push the cleaned file to the consolidated bucket.
    async fn upload(&self) -> Result<()> {
        let body = tokio::fs::read(&self.local_path)
            .await
            .context("Failed to read consolidated file")?;

        self.buckets
            .upload(
                &self.s3.consolidated_bucket,
                &self.workflow.consolidated_object,
                body,
                "text/csv",
            )
            .await?;

        info!(
            bucket = %self.s3.consolidated_bucket,
            key = %self.workflow.consolidated_object,
            "Consolidated file uploaded"
        );
        Ok(())
    }

    /// Stage 4: remove the local file; it only lives for one run.
    async fn cleanup(&self) -> Result<()> {
        tokio::fs::remove_file(&self.local_path)
            .await
            .context("Failed to delete local consolidated file")?;
        info!(path = %self.local_path.display(), "Local file removed");
        Ok(())
    }

    /// Stage 5: append the uploaded file's rows to the warehouse table.
    async fn load(&self) -> Result<u64> {
        let bytes = self
            .buckets
            .download(
                &self.s3.consolidated_bucket,
                &self.workflow.consolidated_object,
            )
            .await?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(bytes.as_slice());

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.context("Failed to parse consolidated row")?;
            let row = StatusRow::from_record(&record)
                .context("Consolidated row does not match the warehouse schema")?;
            rows.push(row);
        }

        self.warehouse.append_rows(&rows).await
    }
}
