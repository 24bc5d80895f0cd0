//! S3-backed object store.

use anyhow::Context;
use aws_sdk_s3::presigning::PresigningConfig;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use super::{Fetched, FetchedObject, ObjectStore};
use crate::schema::{ObjectRef, UploadAuthorization};

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

#[derive(Clone, Debug)]
pub struct S3ObjectStore {
    inner: aws_sdk_s3::Client,
    upload_bucket: String,
}

impl S3ObjectStore {
    pub fn new(inner: aws_sdk_s3::Client, upload_bucket: impl Into<String>) -> Self {
        Self {
            inner,
            upload_bucket: upload_bucket.into(),
        }
    }
}

#[async_trait::async_trait]
impl ObjectStore for S3ObjectStore {
    #[tracing::instrument(skip(self))]
    async fn fetch(&self, object: &ObjectRef, max_bytes: u64) -> anyhow::Result<Fetched> {
        let resp = self
            .inner
            .get_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .send()
            .await
            .with_context(|| format!("could not get {}", object))?;

        let reported = resp
            .content_length()
            .and_then(|len| u64::try_from(len).ok());
        if let Some(size) = reported.filter(|&size| size > max_bytes) {
            debug!("not reading {} ({} bytes)", object, size);
            return Ok(Fetched::TooLarge { size });
        }

        let mut body = resp.body;
        let mut bytes = Vec::with_capacity(reported.unwrap_or(0) as usize);
        while let Some(chunk) = body.try_next().await.context("could not read body")? {
            bytes.extend_from_slice(&chunk);
            if bytes.len() as u64 > max_bytes {
                return Ok(Fetched::TooLarge {
                    size: bytes.len() as u64,
                });
            }
        }

        let size = reported.unwrap_or(bytes.len() as u64);
        debug!("fetched {} ({} bytes)", object, size);

        Ok(Fetched::Object(FetchedObject { bytes, size }))
    }

    #[tracing::instrument(skip(self))]
    async fn presign_upload(
        &self,
        key: &str,
        ttl: Duration,
        content_length: Option<u64>,
    ) -> anyhow::Result<UploadAuthorization> {
        let content_length = content_length
            .map(i64::try_from)
            .transpose()
            .context("content length out of range")?;

        let presigned = self
            .inner
            .put_object()
            .bucket(&self.upload_bucket)
            .key(key)
            .content_type(PDF_CONTENT_TYPE)
            .set_content_length(content_length)
            .presigned(PresigningConfig::expires_in(ttl)?)
            .await
            .with_context(|| format!("could not presign upload for {}", key))?;

        let headers: BTreeMap<String, String> = presigned
            .headers()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();

        Ok(UploadAuthorization {
            url: presigned.uri().to_string(),
            method: presigned.method().to_string(),
            headers,
            key: key.to_string(),
            expires_in: ttl.as_secs(),
        })
    }
}
