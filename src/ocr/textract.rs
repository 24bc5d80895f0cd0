//! AWS Textract provider (asynchronous text detection, multi-page PDFs).

use super::{join_lines, OcrProvider};
use crate::config::TextractSettings;
use crate::schema::ObjectRef;
use anyhow::Context;
use aws_sdk_textract::types::{Block, BlockType, DocumentLocation, JobStatus, S3Object};
use std::time::Duration;
use tracing::{debug, info};

pub struct TextractProvider {
    client: aws_sdk_textract::Client,
    settings: TextractSettings,
}

impl TextractProvider {
    pub fn new(client: aws_sdk_textract::Client, settings: TextractSettings) -> Self {
        Self { client, settings }
    }

    async fn start_job(&self, object: &ObjectRef) -> anyhow::Result<String> {
        let location = DocumentLocation::builder()
            .s3_object(
                S3Object::builder()
                    .bucket(&object.bucket)
                    .name(&object.key)
                    .build(),
            )
            .build();

        let resp = self
            .client
            .start_document_text_detection()
            .document_location(location)
            .send()
            .await
            .with_context(|| format!("could not start text detection for {}", object))?;

        resp.job_id()
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Textract returned no job id for {}", object))
    }

    /// Poll until the job leaves IN_PROGRESS, then page through its blocks.
    async fn collect_lines(&self, job_id: &str) -> anyhow::Result<Vec<String>> {
        let interval = Duration::from_millis(self.settings.poll_interval_ms);
        let mut lines = Vec::new();
        let mut next_token: Option<String> = None;
        let mut polls = 0u32;

        loop {
            let resp = self
                .client
                .get_document_text_detection()
                .job_id(job_id)
                .set_next_token(next_token.clone())
                .send()
                .await
                .context("could not fetch text detection results")?;

            match resp.job_status() {
                Some(JobStatus::InProgress) | None => {
                    polls += 1;
                    if polls >= self.settings.max_polls {
                        anyhow::bail!(
                            "Textract job {} still running after {} polls",
                            job_id,
                            polls
                        );
                    }
                    debug!("Textract job {} in progress (poll {})", job_id, polls);
                    tokio::time::sleep(interval).await;
                    continue;
                }
                Some(JobStatus::Failed) => {
                    anyhow::bail!(
                        "Textract job {} failed: {}",
                        job_id,
                        resp.status_message().unwrap_or("no status message")
                    );
                }
                Some(_) => {}
            }

            lines.extend(line_texts(resp.blocks()));

            match resp.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        Ok(lines)
    }
}

fn line_texts(blocks: &[Block]) -> impl Iterator<Item = String> + '_ {
    blocks
        .iter()
        .filter(|block| block.block_type() == Some(&BlockType::Line))
        .filter_map(|block| block.text().map(str::to_string))
}

#[async_trait::async_trait]
impl OcrProvider for TextractProvider {
    fn name(&self) -> &str {
        "textract"
    }

    async fn recognize_text(&self, object: &ObjectRef) -> anyhow::Result<String> {
        let job_id = self.start_job(object).await?;
        info!("TextractProvider: started job {} for {}", job_id, object);

        let lines = self.collect_lines(&job_id).await?;
        info!(
            "TextractProvider: job {} returned {} lines",
            job_id,
            lines.len()
        );

        Ok(join_lines(lines.iter().map(String::as_str)))
    }
}
