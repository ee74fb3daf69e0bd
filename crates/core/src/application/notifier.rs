// Lifecycle Notifier - pub/sub fan-out plus optional webhook

use crate::domain::Trigger;
use crate::port::{EventPublisher, OutboundEvent, TimeProvider, WebhookSink};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

pub const EVENT_TAGGING_COMPLETED: &str = "tagging.completed";
pub const EVENT_TAGGING_FAILED: &str = "tagging.failed";

/// Emits run lifecycle events. Delivery is best-effort on both legs:
/// pub/sub errors are logged and suppressed, the webhook gets exactly one
/// extra attempt. Neither leg can change a run's recorded outcome.
pub struct Notifier {
    publisher: Arc<dyn EventPublisher>,
    webhook: Option<Arc<dyn WebhookSink>>,
    time_provider: Arc<dyn TimeProvider>,
}

impl Notifier {
    pub fn new(
        publisher: Arc<dyn EventPublisher>,
        webhook: Option<Arc<dyn WebhookSink>>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            publisher,
            webhook,
            time_provider,
        }
    }

    pub async fn tagging_completed(
        &self,
        repository_id: &str,
        run_id: i64,
        repository_tags: usize,
        file_tags: usize,
        trigger: Trigger,
    ) {
        self.emit(
            EVENT_TAGGING_COMPLETED,
            json!({
                "repositoryId": repository_id,
                "runId": run_id,
                "repositoryTags": repository_tags,
                "fileTags": file_tags,
                "trigger": trigger.to_string(),
            }),
        )
        .await;
    }

    pub async fn tagging_failed(
        &self,
        repository_id: &str,
        run_id: i64,
        error_message: &str,
        transient: bool,
        trigger: Trigger,
    ) {
        self.emit(
            EVENT_TAGGING_FAILED,
            json!({
                "repositoryId": repository_id,
                "runId": run_id,
                "error": error_message,
                "transient": transient,
                "trigger": trigger.to_string(),
            }),
        )
        .await;
    }

    async fn emit(&self, name: &str, payload: serde_json::Value) {
        let event = OutboundEvent {
            event: name.to_string(),
            payload,
            emitted_at: self.time_provider.now_iso(),
        };

        if let Err(e) = self.publisher.publish(&event).await {
            warn!(event = %name, error = %e, "Failed to publish lifecycle event");
        }

        if let Some(webhook) = &self.webhook {
            if let Err(first) = webhook.deliver(&event).await {
                warn!(event = %name, error = %first, "Webhook delivery failed, retrying once");
                if let Err(second) = webhook.deliver(&event).await {
                    warn!(event = %name, error = %second, "Webhook retry failed, giving up");
                }
            }
        }
    }
}
