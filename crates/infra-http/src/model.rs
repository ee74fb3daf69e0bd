// Model Service HTTP Client

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tagsmith_core::error::{AppError, Result};
use tagsmith_core::port::{ChatCompletion, ChatUsage, ModelClient};
use tokio::time::sleep;
use tracing::{info, warn};

const TEMPERATURE: f64 = 0.2;
const MAX_RETRIES: usize = 2;
const RETRY_BASE_DELAY_MS: u64 = 500;

const SYSTEM_PROMPT: &str = "You are a repository analysis assistant. Inspect the \
repository summary, README excerpt, and file snippets, then respond with JSON only: \
an object with a required `repository_tags` array and an optional `file_tags` array. \
Each tag has a lowercase `key`, a `value`, and an optional `confidence` between 0 and 1.";

pub struct HttpModelClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl HttpModelClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: crate::build_client(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    async fn request_once(&self, prompt: &str) -> Result<Value> {
        let url = self.url();
        let body = json!({
            "model": self.model,
            "temperature": TEMPERATURE,
            "response_format": response_format(),
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Http(format!("model POST {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Http(format!("model POST {url} returned {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Http(format!("model POST {url} body: {e}")))
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn suggest_tags(&self, prompt: &str) -> Result<ChatCompletion> {
        let mut last_error = None;

        for attempt in 1..=(MAX_RETRIES + 1) {
            match self.request_once(prompt).await {
                Ok(raw) => {
                    info!(
                        model = %self.model,
                        attempt = attempt,
                        prompt_chars = prompt.len(),
                        "Model call succeeded"
                    );
                    return Ok(parse_completion(raw));
                }
                Err(e) => {
                    warn!(model = %self.model, attempt = attempt, error = %e, "Model call failed");
                    last_error = Some(e);
                    if attempt <= MAX_RETRIES {
                        sleep(Duration::from_millis(RETRY_BASE_DELAY_MS * attempt as u64)).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::Http("model call failed".to_string())))
    }
}

/// JSON-schema constraint for the structured tag output.
fn response_format() -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": "repository_tags",
            "schema": {
                "type": "object",
                "properties": {
                    "repository_tags": {
                        "type": "array",
                        "items": tag_schema(),
                    },
                    "file_tags": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "path": { "type": "string" },
                                "tags": { "type": "array", "items": tag_schema() },
                            },
                            "required": ["path", "tags"],
                        },
                    },
                },
                "required": ["repository_tags"],
            },
        },
    })
}

fn tag_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "key": { "type": "string" },
            "value": { "type": "string" },
            "confidence": { "type": "number", "minimum": 0, "maximum": 1 },
        },
        "required": ["key", "value"],
    })
}

/// Lift content and usage out of the raw response. Absent or non-string
/// content maps to `None`; the caller decides that is a permanent failure.
fn parse_completion(raw: Value) -> ChatCompletion {
    let content = raw
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .map(String::from);

    let usage = raw.get("usage").map(|usage| ChatUsage {
        prompt_tokens: usage.get("prompt_tokens").and_then(Value::as_i64),
        completion_tokens: usage.get("completion_tokens").and_then(Value::as_i64),
        total_tokens: usage.get("total_tokens").and_then(Value::as_i64),
    });

    ChatCompletion {
        content,
        usage,
        raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_content_and_usage_are_extracted() {
        let raw = json!({
            "choices": [{ "message": { "role": "assistant", "content": "{\"repository_tags\":[]}" } }],
            "usage": { "prompt_tokens": 100, "completion_tokens": 20, "total_tokens": 120 },
        });
        let completion = parse_completion(raw);
        assert_eq!(completion.content.as_deref(), Some("{\"repository_tags\":[]}"));
        let usage = completion.usage.unwrap();
        assert_eq!(usage.prompt_tokens, Some(100));
        assert_eq!(usage.completion_tokens, Some(20));
    }

    #[test]
    fn missing_content_maps_to_none() {
        let completion = parse_completion(json!({ "choices": [] }));
        assert!(completion.content.is_none());
        assert!(completion.usage.is_none());

        let completion = parse_completion(json!({
            "choices": [{ "message": { "role": "assistant", "content": null } }],
        }));
        assert!(completion.content.is_none());
    }

    #[test]
    fn schema_requires_repository_tags() {
        let format = response_format();
        let required = &format["json_schema"]["schema"]["required"];
        assert_eq!(required[0], "repository_tags");
    }
}
