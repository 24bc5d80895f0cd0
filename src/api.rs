//! HTTP surface: upload URLs, metadata reads, quota usage and an event relay.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use aws_lambda_events::event::s3::S3Event;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Limits;
use crate::ingest::{BatchOutcome, Pipeline};
use crate::quota::{PeriodKeyProvider, QuotaLedger};
use crate::schema::{DocumentMetadata, UploadAuthorization};
use crate::storage::{MetadataStore, ObjectStore};

/// S3 caps object keys at 1024 bytes.
const MAX_KEY_BYTES: usize = 1024;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub objects: Arc<dyn ObjectStore>,
    pub metadata: Arc<dyn MetadataStore>,
    pub quota: Arc<dyn QuotaLedger>,
    pub periods: Arc<dyn PeriodKeyProvider>,
    pub limits: Limits,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/presign", get(presign))
        .route("/metadata", get(get_metadata))
        .route("/quota", get(quota_usage))
        .route("/events", post(ingest_events))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> &'static str {
    "ok"
}

#[derive(serde::Deserialize)]
struct PresignQuery {
    filename: Option<String>,
    /// Declared upload size; pins the presigned request to this length.
    size: Option<u64>,
}

/// Issue a time-limited upload URL for `filename`.
async fn presign(
    State(state): State<AppState>,
    Query(query): Query<PresignQuery>,
) -> Result<Json<UploadAuthorization>, (StatusCode, String)> {
    let key = query
        .filename
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                "filename query parameter is required".to_string(),
            )
        })?;

    if key.len() > MAX_KEY_BYTES {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("filename must be at most {} bytes", MAX_KEY_BYTES),
        ));
    }

    if let Some(size) = query.size {
        if size == 0 || size > state.limits.max_object_bytes {
            return Err((
                StatusCode::BAD_REQUEST,
                format!(
                    "size must be between 1 and {} bytes",
                    state.limits.max_object_bytes
                ),
            ));
        }
    }

    let authorization = state
        .objects
        .presign_upload(&key, state.limits.upload_url_ttl(), query.size)
        .await
        .map_err(|e| {
            error!("Presign failed for {}: {:#}", key, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Could not issue upload URL: {}", e),
            )
        })?;

    info!("Issued upload URL for {}", key);
    Ok(Json(authorization))
}

#[derive(serde::Deserialize)]
struct MetadataQuery {
    key: Option<String>,
}

/// Read stored metadata for an object key.
async fn get_metadata(
    State(state): State<AppState>,
    Query(query): Query<MetadataQuery>,
) -> Result<Json<DocumentMetadata>, (StatusCode, String)> {
    let key = query.key.filter(|key| !key.is_empty()).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            "Missing required query parameter: key".to_string(),
        )
    })?;

    match state.metadata.get(&key).await {
        Ok(Some(metadata)) => Ok(Json(metadata)),
        Ok(None) => Err((StatusCode::NOT_FOUND, "Metadata not found".to_string())),
        Err(e) => {
            error!("Metadata lookup failed for {}: {:#}", key, e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Metadata store error: {}", e),
            ))
        }
    }
}

#[derive(serde::Deserialize)]
struct QuotaQuery {
    period: Option<String>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct QuotaUsage {
    period: String,
    used: u64,
    limit: u64,
}

/// OCR pages used in a period (the current month by default).
async fn quota_usage(
    State(state): State<AppState>,
    Query(query): Query<QuotaQuery>,
) -> Result<Json<QuotaUsage>, (StatusCode, String)> {
    let period = query
        .period
        .unwrap_or_else(|| state.periods.current_period());

    let used = state.quota.usage(&period).await.map_err(|e| {
        error!("Quota lookup failed for {}: {:#}", period, e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Quota store error: {}", e),
        )
    })?;

    Ok(Json(QuotaUsage {
        period,
        used,
        limit: state.limits.monthly_page_limit,
    }))
}

/// Relay an S3 event notification into the pipeline.
async fn ingest_events(
    State(state): State<AppState>,
    Json(event): Json<S3Event>,
) -> Json<BatchOutcome> {
    Json(state.pipeline.process_event(&event).await)
}
