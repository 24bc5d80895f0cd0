//! Records exchanged between the pipeline, its stores and its notification sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A (bucket, key) pair identifying a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// `s3://bucket/key`, as reported in notifications.
    pub fn s3_path(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// One upload-completion record, already decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRecord {
    pub object: ObjectRef,
    /// Object size as reported by the event, when present.
    pub size: Option<u64>,
    pub event_time: DateTime<Utc>,
}

/// Decode an object key as delivered in bucket notifications.
///
/// Keys arrive form-encoded: `+` stands for a space and everything else is
/// percent-encoded.
pub fn decode_object_key(raw: &str) -> Result<String, std::string::FromUtf8Error> {
    let plus_decoded = raw.replace('+', " ");
    urlencoding::decode(&plus_decoded).map(|key| key.into_owned())
}

/// Metadata derived from one processed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    pub key: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    pub pages: u32,
    #[serde(default)]
    pub preview: String,
    /// When this pipeline processed the object.
    pub uploaded: DateTime<Utc>,
    #[serde(default)]
    pub ocr_applied: bool,
    pub content_hash: String,
    /// Time of the upload event that produced this record.
    pub event_time: DateTime<Utc>,
}

/// Result of writing metadata under the stale-write guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Written,
    /// A record from a newer upload event is already stored.
    Superseded,
}

/// Notification subject for successfully processed objects.
pub const SUCCESS_SUBJECT: &str = "AutoPDF PDF Uploaded";
/// Notification subject for objects that failed processing.
pub const FAILURE_SUBJECT: &str = "AutoPDF PDF Failed";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessNotification {
    pub s3_path: String,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureNotification {
    pub s3_path: String,
    pub error: String,
}

/// Time-limited authorization for a direct upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadAuthorization {
    pub url: String,
    pub method: String,
    pub headers: std::collections::BTreeMap<String, String>,
    pub key: String,
    pub expires_in: u64,
}
