// Queued Tagging Jobs

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Deterministic queue identity for a repository. Every producer derives
/// the same id, which is what makes queue-level dedup work.
pub fn job_id_for_repository(repository_id: &str) -> String {
    let digest = Sha256::digest(repository_id.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("tagging-{hex}")
}

/// Provenance of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Event,
    Manual,
    Scheduler,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::Event => write!(f, "event"),
            Trigger::Manual => write!(f, "manual"),
            Trigger::Scheduler => write!(f, "scheduler"),
        }
    }
}

/// Payload carried by a queued job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagJobPayload {
    pub repository_id: String,
    pub trigger: Trigger,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl TagJobPayload {
    pub fn new(repository_id: impl Into<String>, trigger: Trigger) -> Self {
        Self {
            repository_id: repository_id.into(),
            trigger,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// A job leased from the queue for one execution attempt.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub id: String,
    pub payload: TagJobPayload,
    pub attempts: i32,
    pub max_attempts: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_is_deterministic_and_prefixed() {
        let a = job_id_for_repository("r1");
        let b = job_id_for_repository("r1");
        let c = job_id_for_repository("r2");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("tagging-"));
        // sha256 hex digest after the prefix
        assert_eq!(a.len(), "tagging-".len() + 64);
    }

    #[test]
    fn trigger_serializes_lowercase() {
        let payload = TagJobPayload::new("r1", Trigger::Scheduler);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["trigger"], "scheduler");
        assert!(json.get("reason").is_none());
    }
}
