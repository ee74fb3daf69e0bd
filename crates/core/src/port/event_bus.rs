// Event Bus & Webhook Ports (Interfaces)

use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;

/// Outbound lifecycle event envelope published to the bus and webhook.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundEvent {
    pub event: String,
    pub payload: serde_json::Value,
    #[serde(rename = "emittedAt")]
    pub emitted_at: String,
}

/// Publisher side of the pub/sub channel.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &OutboundEvent) -> Result<()>;
}

/// Optional outbound lifecycle webhook.
#[async_trait]
pub trait WebhookSink: Send + Sync {
    async fn deliver(&self, event: &OutboundEvent) -> Result<()>;
}
