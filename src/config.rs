//! Runtime configuration.
//!
//! Settings are read from the process environment (a `.env` file is loaded
//! first when present). Resource names are required; limits fall back to the
//! defaults below.

use anyhow::{anyhow, Context, Result};
use std::str::FromStr;
use std::time::Duration;

use crate::ocr::OcrProviderKind;

const MIB: u64 = 1024 * 1024;

/// Size and quota ceilings applied by the pipeline.
#[derive(Debug, Clone)]
pub struct Limits {
    /// Objects larger than this are skipped before extraction.
    pub max_object_bytes: u64,
    /// OCR fallback is only attempted for objects up to this size.
    pub ocr_max_bytes: u64,
    /// Pages of OCR allowed per calendar month.
    pub monthly_page_limit: u64,
    /// Lifetime of issued upload URLs.
    pub upload_url_ttl_secs: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_object_bytes: 5 * MIB,
            ocr_max_bytes: 2 * MIB,
            monthly_page_limit: 1000,
            upload_url_ttl_secs: 3600,
        }
    }
}

impl Limits {
    pub fn upload_url_ttl(&self) -> Duration {
        Duration::from_secs(self.upload_url_ttl_secs)
    }
}

/// Polling behaviour for asynchronous Textract jobs.
#[derive(Debug, Clone)]
pub struct TextractSettings {
    pub poll_interval_ms: u64,
    pub max_polls: u32,
}

impl Default for TextractSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            max_polls: 60,
        }
    }
}

/// Everything the binary needs to wire its collaborators.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bucket: String,
    pub metadata_table: String,
    pub quota_table: String,
    pub topic_arn: String,
    pub bind_addr: String,
    pub ocr_provider: OcrProviderKind,
    pub textract: TextractSettings,
    pub limits: Limits,
}

impl Settings {
    /// Build settings from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow!("{} not set", name))
        };

        let defaults = Limits::default();
        let limits = Limits {
            max_object_bytes: parse_or(&lookup, "MAX_OBJECT_BYTES", defaults.max_object_bytes)?,
            ocr_max_bytes: parse_or(&lookup, "OCR_MAX_BYTES", defaults.ocr_max_bytes)?,
            monthly_page_limit: parse_or(
                &lookup,
                "OCR_MONTHLY_PAGE_LIMIT",
                defaults.monthly_page_limit,
            )?,
            upload_url_ttl_secs: parse_or(
                &lookup,
                "UPLOAD_URL_TTL_SECS",
                defaults.upload_url_ttl_secs,
            )?,
        };

        if limits.ocr_max_bytes > limits.max_object_bytes {
            anyhow::bail!(
                "OCR_MAX_BYTES ({}) must not exceed MAX_OBJECT_BYTES ({})",
                limits.ocr_max_bytes,
                limits.max_object_bytes
            );
        }

        let ocr_provider = match lookup("OCR_PROVIDER") {
            Some(name) => OcrProviderKind::from_str(name.trim())
                .ok_or_else(|| anyhow!("Unknown OCR_PROVIDER: {}", name))?,
            None => OcrProviderKind::Textract,
        };

        let textract_defaults = TextractSettings::default();
        let textract = TextractSettings {
            poll_interval_ms: parse_or(
                &lookup,
                "TEXTRACT_POLL_INTERVAL_MS",
                textract_defaults.poll_interval_ms,
            )?,
            max_polls: parse_or(&lookup, "TEXTRACT_MAX_POLLS", textract_defaults.max_polls)?,
        };

        Ok(Self {
            bucket: required("BUCKET")?,
            metadata_table: required("METADATA_TABLE")?,
            quota_table: required("QUOTA_TABLE")?,
            topic_arn: required("TOPIC_ARN")?,
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            ocr_provider,
            textract,
            limits,
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", name, raw)),
        None => Ok(default),
    }
}
