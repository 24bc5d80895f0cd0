//! Batch orchestration of upload-completion events.
//!
//! Every record is resolved on its own: a failure is turned into a failure
//! notification for that record and never stops its siblings.

use crate::config::Limits;
use crate::error::IngestError;
use crate::extractor::Extractor;
use crate::schema::{
    decode_object_key, DocumentMetadata, FailureNotification, ObjectRef, PutOutcome,
    SuccessNotification, UploadRecord, FAILURE_SUBJECT, SUCCESS_SUBJECT,
};
use crate::storage::{Fetched, FetchedObject, MetadataStore, Notifier, ObjectStore};
use aws_lambda_events::event::s3::{S3Event, S3EventRecord};
use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{error, info, warn, Instrument};

/// How a single record was resolved.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum ItemOutcome {
    /// Over the processing size ceiling; nothing written or published.
    Skipped { path: String, size: u64 },
    /// Metadata stored and success notification published.
    Succeeded { metadata: DocumentMetadata },
    /// A newer upload of the same key already stored its metadata.
    Superseded { path: String },
    /// Processing failed; a failure notification was attempted.
    Failed { path: String, error: String },
}

/// Acknowledgement returned once every record has been resolved.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    pub status: &'static str,
    pub processed: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub superseded: usize,
    pub failed: usize,
    pub items: Vec<ItemOutcome>,
}

impl BatchOutcome {
    fn from_items(items: Vec<ItemOutcome>) -> Self {
        let mut outcome = Self {
            status: "ok",
            processed: items.len(),
            ..Self::default()
        };
        for item in &items {
            match item {
                ItemOutcome::Skipped { .. } => outcome.skipped += 1,
                ItemOutcome::Succeeded { .. } => outcome.succeeded += 1,
                ItemOutcome::Superseded { .. } => outcome.superseded += 1,
                ItemOutcome::Failed { .. } => outcome.failed += 1,
            }
        }
        outcome.items = items;
        outcome
    }
}

/// Convert an S3 notification record into an [`UploadRecord`].
pub fn upload_record(record: &S3EventRecord) -> Result<UploadRecord, IngestError> {
    let bucket = record
        .s3
        .bucket
        .name
        .clone()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| IngestError::InvalidRecord("record has no bucket name".to_string()))?;
    let raw_key = record
        .s3
        .object
        .key
        .as_deref()
        .filter(|key| !key.is_empty())
        .ok_or_else(|| IngestError::InvalidRecord("record has no object key".to_string()))?;
    let key = decode_object_key(raw_key)
        .map_err(|e| IngestError::InvalidRecord(format!("object key {:?}: {}", raw_key, e)))?;

    Ok(UploadRecord {
        object: ObjectRef::new(bucket, key),
        size: record
            .s3
            .object
            .size
            .and_then(|size| u64::try_from(size).ok()),
        event_time: record.event_time,
    })
}

/// Best-effort `s3://` path for a record that could not be decoded.
fn raw_path(record: &S3EventRecord) -> String {
    format!(
        "s3://{}/{}",
        record.s3.bucket.name.as_deref().unwrap_or("?"),
        record.s3.object.key.as_deref().unwrap_or("?")
    )
}

/// Ingestion orchestrator.
pub struct Pipeline {
    objects: Arc<dyn ObjectStore>,
    metadata: Arc<dyn MetadataStore>,
    notifier: Arc<dyn Notifier>,
    extractor: Extractor,
    max_object_bytes: u64,
}

impl Pipeline {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        notifier: Arc<dyn Notifier>,
        extractor: Extractor,
        limits: &Limits,
    ) -> Self {
        Self {
            objects,
            metadata,
            notifier,
            extractor,
            max_object_bytes: limits.max_object_bytes,
        }
    }

    /// Process every record of an S3 event notification.
    pub async fn process_event(&self, event: &S3Event) -> BatchOutcome {
        info!("Processing {} upload records", event.records.len());

        let mut items = Vec::with_capacity(event.records.len());
        for record in &event.records {
            let outcome = match upload_record(record) {
                Ok(upload) => self.process_record(&upload).await,
                Err(e) => {
                    let path = raw_path(record);
                    error!("Rejecting record {}: {}", path, e);
                    self.notify_failure(&path, &e).await;
                    ItemOutcome::Failed {
                        path,
                        error: e.to_string(),
                    }
                }
            };
            items.push(outcome);
        }

        let outcome = BatchOutcome::from_items(items);
        info!(
            "Batch complete: {} succeeded, {} skipped, {} superseded, {} failed",
            outcome.succeeded, outcome.skipped, outcome.superseded, outcome.failed
        );
        outcome
    }

    /// Resolve one record to a terminal outcome. Never returns an error.
    pub async fn process_record(&self, record: &UploadRecord) -> ItemOutcome {
        let span = tracing::info_span!(
            "process_record",
            bucket = %record.object.bucket,
            key = %record.object.key
        );
        let path = record.object.s3_path();

        async {
            match self.ingest(record).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Failed to process {}: {}", path, e);
                    self.notify_failure(&path, &e).await;
                    ItemOutcome::Failed {
                        path: path.clone(),
                        error: e.to_string(),
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn ingest(&self, record: &UploadRecord) -> Result<ItemOutcome, IngestError> {
        let path = record.object.s3_path();

        if let Some(size) = record.size {
            if size > self.max_object_bytes {
                return Ok(self.skip(path, size));
            }
        }

        let fetched = self
            .objects
            .fetch(&record.object, self.max_object_bytes)
            .await
            .map_err(|reason| IngestError::Fetch {
                path: path.clone(),
                reason,
            })?;
        let FetchedObject { bytes, size } = match fetched {
            Fetched::Object(object) => object,
            Fetched::TooLarge { size } => return Ok(self.skip(path, size)),
        };

        let extracted = self.extractor.extract(&record.object, &bytes, size).await?;

        let metadata = DocumentMetadata {
            key: record.object.key.clone(),
            title: extracted.title,
            author: extracted.author,
            pages: extracted.pages,
            preview: extracted.preview,
            uploaded: Utc::now(),
            ocr_applied: extracted.ocr_applied,
            content_hash: format!("{:x}", Sha256::digest(&bytes)),
            event_time: record.event_time,
        };

        match self
            .metadata
            .put(&metadata)
            .await
            .map_err(IngestError::Persist)?
        {
            PutOutcome::Written => {}
            PutOutcome::Superseded => {
                warn!(
                    "Metadata for {} not stored: a newer upload event already wrote it",
                    path
                );
                return Ok(ItemOutcome::Superseded { path });
            }
        }

        info!(
            "Extracted metadata for {}: {} pages, ocr={}",
            path, metadata.pages, metadata.ocr_applied
        );

        let notification = SuccessNotification {
            s3_path: path,
            metadata,
        };
        self.publish(SUCCESS_SUBJECT, &notification).await?;

        Ok(ItemOutcome::Succeeded {
            metadata: notification.metadata,
        })
    }

    fn skip(&self, path: String, size: u64) -> ItemOutcome {
        info!(
            "Skipping {}: {} bytes exceeds processing ceiling of {} bytes",
            path, size, self.max_object_bytes
        );
        ItemOutcome::Skipped { path, size }
    }

    async fn publish<T: Serialize>(&self, subject: &str, payload: &T) -> Result<(), IngestError> {
        let message = serde_json::to_string(payload)
            .map_err(|e| IngestError::Notify(anyhow::Error::new(e)))?;
        self.notifier
            .publish(subject, &message)
            .await
            .map_err(IngestError::Notify)
    }

    async fn notify_failure(&self, path: &str, error: &IngestError) {
        let notification = FailureNotification {
            s3_path: path.to_string(),
            error: error.to_string(),
        };
        if let Err(e) = self.publish(FAILURE_SUBJECT, &notification).await {
            error!("Could not publish failure notification for {}: {}", path, e);
        }
    }
}
