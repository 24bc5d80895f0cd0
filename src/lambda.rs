//! Lambda entry for bucket notifications.

use aws_lambda_events::event::s3::S3Event;
use lambda_runtime::{Error, LambdaEvent};
use std::sync::Arc;

use crate::ingest::{BatchOutcome, Pipeline};

/// Processes the s3 event. Per-record failures are reported through the
/// notification sink, so the invocation itself always succeeds.
#[tracing::instrument(skip_all, fields(request_id = %event.context.request_id))]
pub async fn handler(
    pipeline: Arc<Pipeline>,
    event: LambdaEvent<S3Event>,
) -> Result<BatchOutcome, Error> {
    Ok(pipeline.process_event(&event.payload).await)
}
