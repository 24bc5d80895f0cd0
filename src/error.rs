//! Per-item ingestion errors.

/// Everything that can fail while ingesting a single uploaded object.
///
/// Each variant ends up as the `error` field of a failure notification, so the
/// messages carry the full context chain.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("invalid event record: {0}")]
    InvalidRecord(String),

    #[error("failed to fetch {path}: {reason:#}")]
    Fetch {
        path: String,
        reason: anyhow::Error,
    },

    #[error("failed to parse PDF: {0}")]
    Parse(#[from] lopdf::Error),

    #[error("quota ledger unavailable: {0:#}")]
    Quota(anyhow::Error),

    #[error("text recognition failed: {0:#}")]
    Ocr(anyhow::Error),

    #[error("failed to persist metadata: {0:#}")]
    Persist(anyhow::Error),

    #[error("failed to publish notification: {0:#}")]
    Notify(anyhow::Error),
}
