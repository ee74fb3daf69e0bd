// Lifecycle Webhook Sink

use async_trait::async_trait;
use tagsmith_core::error::{AppError, Result};
use tagsmith_core::port::{OutboundEvent, WebhookSink};

/// POSTs the outbound envelope to a configured URL. Retrying is the
/// notifier's job; this sink makes exactly one attempt per call.
pub struct HttpWebhookSink {
    client: reqwest::Client,
    url: String,
}

impl HttpWebhookSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: crate::build_client(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl WebhookSink for HttpWebhookSink {
    async fn deliver(&self, event: &OutboundEvent) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .map_err(|e| AppError::Http(format!("webhook POST {}: {e}", self.url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Http(format!(
                "webhook POST {} returned {status}",
                self.url
            )));
        }
        Ok(())
    }
}
