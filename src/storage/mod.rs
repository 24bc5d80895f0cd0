//! Storage and messaging collaborators.
//!
//! The pipeline only sees the traits defined here; the AWS-backed clients live
//! in the submodules and an in-memory set is available to tests.

pub mod dynamodb;
#[cfg(test)]
pub mod memory;
pub mod s3;
pub mod sns;

use crate::schema::{DocumentMetadata, ObjectRef, PutOutcome, UploadAuthorization};
use std::time::Duration;

/// Raw object contents plus the size reported by the store.
#[derive(Debug, Clone)]
pub struct FetchedObject {
    pub bytes: Vec<u8>,
    pub size: u64,
}

/// Result of a size-bounded fetch.
#[derive(Debug, Clone)]
pub enum Fetched {
    Object(FetchedObject),
    /// The object exceeds the requested bound. `size` is the size reported by
    /// the store, or the number of bytes read before giving up.
    TooLarge { size: u64 },
}

/// Read access to uploaded objects and issuance of upload URLs.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read the object unless it is larger than `max_bytes`, in which case
    /// the body is abandoned without being buffered.
    async fn fetch(&self, object: &ObjectRef, max_bytes: u64) -> anyhow::Result<Fetched>;

    /// Presign a PDF upload for `key`, optionally pinned to an exact length.
    async fn presign_upload(
        &self,
        key: &str,
        ttl: Duration,
        content_length: Option<u64>,
    ) -> anyhow::Result<UploadAuthorization>;
}

/// Key-value store for extracted metadata, keyed by object key.
#[async_trait::async_trait]
pub trait MetadataStore: Send + Sync {
    /// Overwrite the record for `metadata.key` unless the stored record comes
    /// from a newer upload event.
    async fn put(&self, metadata: &DocumentMetadata) -> anyhow::Result<PutOutcome>;

    async fn get(&self, key: &str) -> anyhow::Result<Option<DocumentMetadata>>;
}

/// Fire-and-forget publisher for processing results.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, subject: &str, message: &str) -> anyhow::Result<()>;
}
