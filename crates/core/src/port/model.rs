// Model Service Port (Interface)

use crate::error::Result;
use async_trait::async_trait;

/// Token accounting reported by the model service.
#[derive(Debug, Clone, Default)]
pub struct ChatUsage {
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
}

/// One chat completion. `content` is the first choice's message content
/// (absent when the service returned 200 with no usable content); `raw`
/// is the full response body for the audit trail.
#[derive(Debug, Clone)]
pub struct ChatCompletion {
    pub content: Option<String>,
    pub usage: Option<ChatUsage>,
    pub raw: serde_json::Value,
}

/// Structured-output chat endpoint. Implementations own transport-level
/// retries; a returned error means the call is not worth retrying inside
/// the same run attempt.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn suggest_tags(&self, prompt: &str) -> Result<ChatCompletion>;
}
