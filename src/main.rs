//! AutoPDF ingest - PDF metadata extraction triggered by bucket uploads.
//!
//! Runs as a Lambda function when started by the Lambda runtime, otherwise as
//! an HTTP server exposing the upload-URL and metadata endpoints.

mod api;
mod config;
mod error;
mod extractor;
mod ingest;
mod lambda;
mod ocr;
mod quota;
mod schema;
mod storage;

use anyhow::Context;
use aws_lambda_events::event::s3::S3Event;
use config::Settings;
use extractor::Extractor;
use ingest::Pipeline;
use lambda_runtime::{service_fn, LambdaEvent};
use ocr::{textract::TextractProvider, OcrProvider, OcrProviderKind};
use quota::{MonthlyPeriods, PeriodKeyProvider, QuotaLedger};
use std::sync::Arc;
use storage::dynamodb::{DynamoMetadataStore, DynamoQuotaLedger};
use storage::s3::S3ObjectStore;
use storage::sns::SnsNotifier;
use storage::{MetadataStore, Notifier, ObjectStore};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let lambda_mode = std::env::var_os("AWS_LAMBDA_RUNTIME_API").is_some();

    // Initialize tracing; CloudWatch adds its own timestamps
    let fmt_layer = tracing_subscriber::fmt::layer().with_ansi(!lambda_mode);
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "autopdf_ingest=debug,tower_http=debug".into());
    if lambda_mode {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer.without_time())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
    }

    let settings = Settings::from_env()?;
    info!(
        "Loaded settings: bucket={}, metadata_table={}, quota_table={}, ocr={:?}",
        settings.bucket, settings.metadata_table, settings.quota_table, settings.ocr_provider
    );

    let aws_config = aws_config::load_from_env().await;

    let objects: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::new(
        aws_sdk_s3::Client::new(&aws_config),
        &settings.bucket,
    ));
    let dynamo = aws_sdk_dynamodb::Client::new(&aws_config);
    let metadata: Arc<dyn MetadataStore> = Arc::new(DynamoMetadataStore::new(
        dynamo.clone(),
        &settings.metadata_table,
    ));
    let quota: Arc<dyn QuotaLedger> =
        Arc::new(DynamoQuotaLedger::new(dynamo, &settings.quota_table));
    let notifier: Arc<dyn Notifier> = Arc::new(SnsNotifier::new(
        aws_sdk_sns::Client::new(&aws_config),
        &settings.topic_arn,
    ));

    let ocr: Option<Arc<dyn OcrProvider>> = match settings.ocr_provider {
        OcrProviderKind::Textract => Some(Arc::new(TextractProvider::new(
            aws_sdk_textract::Client::new(&aws_config),
            settings.textract.clone(),
        ))),
        OcrProviderKind::Disabled => None,
    };

    let periods: Arc<dyn PeriodKeyProvider> = Arc::new(MonthlyPeriods);
    let extractor = Extractor::new(ocr, quota.clone(), periods.clone(), &settings.limits);
    let pipeline = Arc::new(Pipeline::new(
        objects.clone(),
        metadata.clone(),
        notifier,
        extractor,
        &settings.limits,
    ));

    if lambda_mode {
        info!("Starting Lambda runtime");
        let func = service_fn(move |event: LambdaEvent<S3Event>| {
            let pipeline = pipeline.clone();
            async move { lambda::handler(pipeline, event).await }
        });
        return lambda_runtime::run(func)
            .await
            .map_err(|e| anyhow::anyhow!("Lambda runtime error: {}", e));
    }

    let state = api::AppState {
        pipeline,
        objects,
        metadata,
        quota,
        periods,
        limits: settings.limits.clone(),
    };
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", settings.bind_addr))?;
    info!("Server listening on http://{}", settings.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
