//! DynamoDB tables for extracted metadata and the OCR quota ledger.

use anyhow::{anyhow, Context, Result};
use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use tracing::{debug, info};

use super::MetadataStore;
use crate::quota::{QuotaLedger, Reservation};
use crate::schema::{DocumentMetadata, PutOutcome};

const KEY_ATTR: &str = "s3Key";
const EVENT_TIME_ATTR: &str = "eventTime";
const PERIOD_ATTR: &str = "period";
const USED_ATTR: &str = "used";

/// Metadata table keyed by `s3Key`.
#[derive(Clone, Debug)]
pub struct DynamoMetadataStore {
    client: aws_sdk_dynamodb::Client,
    table: String,
}

impl DynamoMetadataStore {
    pub fn new(client: aws_sdk_dynamodb::Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }
}

#[async_trait::async_trait]
impl MetadataStore for DynamoMetadataStore {
    #[tracing::instrument(skip(self, metadata), fields(key = %metadata.key))]
    async fn put(&self, metadata: &DocumentMetadata) -> Result<PutOutcome> {
        let result = self
            .client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(to_item(metadata)))
            .condition_expression("attribute_not_exists(#key) OR #event_time <= :event_time")
            .expression_attribute_names("#key", KEY_ATTR)
            .expression_attribute_names("#event_time", EVENT_TIME_ATTR)
            .expression_attribute_values(
                ":event_time",
                AttributeValue::N(metadata.event_time.timestamp_millis().to_string()),
            )
            .send()
            .await;

        match result {
            Ok(_) => {
                debug!("stored metadata for {}", metadata.key);
                Ok(PutOutcome::Written)
            }
            Err(e)
                if e.as_service_error()
                    .map(|se| se.is_conditional_check_failed_exception())
                    .unwrap_or(false) =>
            {
                Ok(PutOutcome::Superseded)
            }
            Err(e) => Err(anyhow!("DynamoDB put_item on {} failed: {}", self.table, e)),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<DocumentMetadata>> {
        let resp = self
            .client
            .get_item()
            .table_name(&self.table)
            .key(KEY_ATTR, AttributeValue::S(key.to_string()))
            .send()
            .await
            .with_context(|| format!("DynamoDB get_item on {} failed", self.table))?;

        resp.item().map(from_item).transpose()
    }
}

fn to_item(metadata: &DocumentMetadata) -> HashMap<String, AttributeValue> {
    HashMap::from([
        (KEY_ATTR.to_string(), AttributeValue::S(metadata.key.clone())),
        ("title".to_string(), AttributeValue::S(metadata.title.clone())),
        ("author".to_string(), AttributeValue::S(metadata.author.clone())),
        ("pages".to_string(), AttributeValue::N(metadata.pages.to_string())),
        ("preview".to_string(), AttributeValue::S(metadata.preview.clone())),
        (
            "uploaded".to_string(),
            AttributeValue::S(metadata.uploaded.to_rfc3339()),
        ),
        ("ocrApplied".to_string(), AttributeValue::Bool(metadata.ocr_applied)),
        (
            "contentHash".to_string(),
            AttributeValue::S(metadata.content_hash.clone()),
        ),
        (
            EVENT_TIME_ATTR.to_string(),
            AttributeValue::N(metadata.event_time.timestamp_millis().to_string()),
        ),
    ])
}

fn from_item(item: &HashMap<String, AttributeValue>) -> Result<DocumentMetadata> {
    let string = |name: &str| -> String {
        item.get(name)
            .and_then(|v| v.as_s().ok())
            .cloned()
            .unwrap_or_default()
    };
    let number = |name: &str| -> Result<i64> {
        item.get(name)
            .and_then(|v| v.as_n().ok())
            .ok_or_else(|| anyhow!("item is missing numeric attribute {}", name))?
            .parse::<i64>()
            .with_context(|| format!("attribute {} is not an integer", name))
    };

    let uploaded = item
        .get("uploaded")
        .and_then(|v| v.as_s().ok())
        .map(|raw| {
            DateTime::parse_from_rfc3339(raw)
                .map(|t| t.with_timezone(&Utc))
                .context("attribute uploaded is not RFC 3339")
        })
        .transpose()?;
    let event_time = match item.get(EVENT_TIME_ATTR) {
        Some(_) => Some(
            Utc.timestamp_millis_opt(number(EVENT_TIME_ATTR)?)
                .single()
                .ok_or_else(|| anyhow!("attribute {} is out of range", EVENT_TIME_ATTR))?,
        ),
        None => None,
    };
    // Rows written before either timestamp existed fall back to the other one.
    let (uploaded, event_time) = match (uploaded, event_time) {
        (Some(uploaded), Some(event_time)) => (uploaded, event_time),
        (Some(at), None) | (None, Some(at)) => (at, at),
        (None, None) => (DateTime::<Utc>::default(), DateTime::<Utc>::default()),
    };

    Ok(DocumentMetadata {
        key: string(KEY_ATTR),
        title: string("title"),
        author: string("author"),
        pages: u32::try_from(number("pages")?).context("attribute pages is out of range")?,
        preview: string("preview"),
        uploaded,
        ocr_applied: item
            .get("ocrApplied")
            .and_then(|v| v.as_bool().ok())
            .copied()
            .unwrap_or(false),
        content_hash: string("contentHash"),
        event_time,
    })
}

fn reservation_values(reservation: &Reservation) -> HashMap<String, AttributeValue> {
    HashMap::from([
        (
            ":amount".to_string(),
            AttributeValue::N(reservation.amount.to_string()),
        ),
        (
            ":headroom".to_string(),
            AttributeValue::N(reservation.headroom.to_string()),
        ),
    ])
}

/// Quota table keyed by `period` with a numeric `used` counter.
#[derive(Clone, Debug)]
pub struct DynamoQuotaLedger {
    client: aws_sdk_dynamodb::Client,
    table: String,
}

impl DynamoQuotaLedger {
    pub fn new(client: aws_sdk_dynamodb::Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }
}

#[async_trait::async_trait]
impl QuotaLedger for DynamoQuotaLedger {
    #[tracing::instrument(skip(self))]
    async fn try_reserve(&self, period_key: &str, amount: u64, ceiling: u64) -> Result<bool> {
        let Some(reservation) = Reservation::new(amount, ceiling) else {
            info!(period_key, amount, ceiling, "OCR request exceeds the monthly ceiling");
            return Ok(false);
        };

        let result = self
            .client
            .update_item()
            .table_name(&self.table)
            .key(PERIOD_ATTR, AttributeValue::S(period_key.to_string()))
            .update_expression("ADD #used :amount")
            .condition_expression("attribute_not_exists(#used) OR #used <= :headroom")
            .expression_attribute_names("#used", USED_ATTR)
            .set_expression_attribute_values(Some(reservation_values(&reservation)))
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e)
                if e.as_service_error()
                    .map(|se| se.is_conditional_check_failed_exception())
                    .unwrap_or(false) =>
            {
                info!(period_key, amount, ceiling, "OCR quota exhausted");
                Ok(false)
            }
            Err(e) => Err(anyhow!("DynamoDB update_item on {} failed: {}", self.table, e)),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn usage(&self, period_key: &str) -> Result<u64> {
        let resp = self
            .client
            .get_item()
            .table_name(&self.table)
            .key(PERIOD_ATTR, AttributeValue::S(period_key.to_string()))
            .consistent_read(true)
            .send()
            .await
            .with_context(|| format!("DynamoDB get_item on {} failed", self.table))?;

        match resp.item().and_then(|item| item.get(USED_ATTR)) {
            Some(value) => value
                .as_n()
                .map_err(|_| anyhow!("attribute {} is not a number", USED_ATTR))?
                .parse()
                .context("quota counter is not an unsigned integer"),
            None => Ok(0),
        }
    }
}
