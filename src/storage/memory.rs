//! In-memory stand-ins for the AWS collaborators, used by tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use super::{Fetched, FetchedObject, MetadataStore, Notifier, ObjectStore};
use crate::quota::{QuotaLedger, Reservation};
use crate::schema::{DocumentMetadata, ObjectRef, PutOutcome, UploadAuthorization};

#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<RwLock<HashMap<ObjectRef, Vec<u8>>>>,
    /// Sizes reported instead of the real byte length.
    reported_sizes: Arc<RwLock<HashMap<ObjectRef, u64>>>,
    fetches: Arc<Mutex<Vec<ObjectRef>>>,
    body_reads: Arc<Mutex<usize>>,
}

impl MemoryObjectStore {
    pub fn insert(&self, object: &ObjectRef, bytes: Vec<u8>) {
        self.objects.write().unwrap().insert(object.clone(), bytes);
    }

    /// Store `bytes` but report `size` from fetches.
    pub fn insert_with_size(&self, object: &ObjectRef, bytes: Vec<u8>, size: u64) {
        self.insert(object, bytes);
        self.reported_sizes
            .write()
            .unwrap()
            .insert(object.clone(), size);
    }

    pub fn fetches(&self) -> Vec<ObjectRef> {
        self.fetches.lock().unwrap().clone()
    }

    /// Fetches that returned the object body.
    pub fn body_reads(&self) -> usize {
        *self.body_reads.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn fetch(&self, object: &ObjectRef, max_bytes: u64) -> anyhow::Result<Fetched> {
        self.fetches.lock().unwrap().push(object.clone());
        let objects = self.objects.read().unwrap();
        let bytes = objects
            .get(object)
            .ok_or_else(|| anyhow::anyhow!("NoSuchKey: {}", object))?;
        let size = self
            .reported_sizes
            .read()
            .unwrap()
            .get(object)
            .copied()
            .unwrap_or(bytes.len() as u64);
        if size > max_bytes {
            return Ok(Fetched::TooLarge { size });
        }
        *self.body_reads.lock().unwrap() += 1;
        Ok(Fetched::Object(FetchedObject {
            bytes: bytes.clone(),
            size,
        }))
    }

    async fn presign_upload(
        &self,
        key: &str,
        ttl: Duration,
        content_length: Option<u64>,
    ) -> anyhow::Result<UploadAuthorization> {
        let mut headers = std::collections::BTreeMap::new();
        headers.insert("content-type".to_string(), "application/pdf".to_string());
        if let Some(len) = content_length {
            headers.insert("content-length".to_string(), len.to_string());
        }
        Ok(UploadAuthorization {
            url: format!("https://uploads.example.test/{}?expires={}", key, ttl.as_secs()),
            method: "PUT".to_string(),
            headers,
            key: key.to_string(),
            expires_in: ttl.as_secs(),
        })
    }
}

/// Metadata store with the same stale-write guard as the DynamoDB table.
#[derive(Debug, Clone, Default)]
pub struct MemoryMetadataStore {
    records: Arc<RwLock<HashMap<String, DocumentMetadata>>>,
    writes: Arc<Mutex<usize>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryMetadataStore {
    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn writes(&self) -> usize {
        *self.writes.lock().unwrap()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn put(&self, metadata: &DocumentMetadata) -> anyhow::Result<PutOutcome> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("ProvisionedThroughputExceededException");
        }
        let mut records = self.records.write().unwrap();
        if let Some(existing) = records.get(&metadata.key) {
            if existing.event_time > metadata.event_time {
                return Ok(PutOutcome::Superseded);
            }
        }
        records.insert(metadata.key.clone(), metadata.clone());
        *self.writes.lock().unwrap() += 1;
        Ok(PutOutcome::Written)
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<DocumentMetadata>> {
        Ok(self.records.read().unwrap().get(key).cloned())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryNotifier {
    published: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
    fail: Arc<AtomicBool>,
}

impl MemoryNotifier {
    pub fn published(&self) -> Vec<(String, serde_json::Value)> {
        self.published.lock().unwrap().clone()
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl Notifier for MemoryNotifier {
    async fn publish(&self, subject: &str, message: &str) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("topic unavailable");
        }
        let payload = serde_json::from_str(message)?;
        self.published
            .lock()
            .unwrap()
            .push((subject.to_string(), payload));
        Ok(())
    }
}

/// Quota ledger whose conditional increment happens under one mutex.
#[derive(Debug, Default)]
pub struct MemoryQuotaLedger {
    used: Mutex<HashMap<String, u64>>,
}

impl MemoryQuotaLedger {
    pub fn with_usage(period_key: &str, used: u64) -> Self {
        let ledger = Self::default();
        ledger
            .used
            .lock()
            .unwrap()
            .insert(period_key.to_string(), used);
        ledger
    }
}

#[async_trait::async_trait]
impl QuotaLedger for MemoryQuotaLedger {
    async fn try_reserve(&self, period_key: &str, amount: u64, ceiling: u64) -> anyhow::Result<bool> {
        let Some(reservation) = Reservation::new(amount, ceiling) else {
            return Ok(false);
        };
        let mut used = self.used.lock().unwrap();
        let current = used.get(period_key).copied();
        if !reservation.admits(current) {
            return Ok(false);
        }
        used.insert(period_key.to_string(), current.unwrap_or(0) + reservation.amount);
        Ok(true)
    }

    async fn usage(&self, period_key: &str) -> anyhow::Result<u64> {
        Ok(self.used.lock().unwrap().get(period_key).copied().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(key: &str, event_time: &str, title: &str) -> DocumentMetadata {
        DocumentMetadata {
            key: key.to_string(),
            title: title.to_string(),
            author: String::new(),
            pages: 1,
            preview: "hello".to_string(),
            uploaded: "2026-10-18T10:00:00Z".parse().unwrap(),
            ocr_applied: false,
            content_hash: "00".to_string(),
            event_time: event_time.parse().unwrap(),
        }
    }

    #[tokio::test]
    async fn test_overwrite_and_stale_guard() {
        let store = MemoryMetadataStore::default();
        let first = metadata("a.pdf", "2026-10-18T09:00:00Z", "v1");
        let second = metadata("a.pdf", "2026-10-18T09:05:00Z", "v2");

        assert_eq!(store.put(&first).await.unwrap(), PutOutcome::Written);
        assert_eq!(store.put(&second).await.unwrap(), PutOutcome::Written);
        assert_eq!(store.put(&first).await.unwrap(), PutOutcome::Superseded);
        // Same event again still overwrites.
        assert_eq!(store.put(&second).await.unwrap(), PutOutcome::Written);

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("a.pdf").await.unwrap().unwrap().title, "v2");
    }
}
