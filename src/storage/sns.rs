//! SNS notification sink.

use super::Notifier;

#[derive(Clone, Debug)]
pub struct SnsNotifier {
    inner: aws_sdk_sns::Client,
    topic_arn: String,
}

impl SnsNotifier {
    pub fn new(inner: aws_sdk_sns::Client, topic_arn: impl Into<String>) -> Self {
        Self {
            inner,
            topic_arn: topic_arn.into(),
        }
    }
}

#[async_trait::async_trait]
impl Notifier for SnsNotifier {
    #[tracing::instrument(skip(self, message))]
    async fn publish(&self, subject: &str, message: &str) -> anyhow::Result<()> {
        self.inner
            .publish()
            .topic_arn(&self.topic_arn)
            .subject(subject)
            .message(message)
            .send()
            .await?;

        Ok(())
    }
}
