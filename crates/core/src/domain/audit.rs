// Audit Records - Jobs, Runs, Assignments

use serde::{Deserialize, Serialize};

/// Job status over its whole lifecycle. One job exists per repository;
/// its status tracks the most recent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Succeeded => write!(f, "succeeded"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl JobStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "queued" => JobStatus::Queued,
            "running" => JobStatus::Running,
            "succeeded" => JobStatus::Succeeded,
            _ => JobStatus::Failed,
        }
    }
}

/// Run status: `running -> succeeded | failed`, no other transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Succeeded => write!(f, "succeeded"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

impl RunStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "running" => RunStatus::Running,
            "succeeded" => RunStatus::Succeeded,
            _ => RunStatus::Failed,
        }
    }
}

/// One repository's job row. Never deleted; touched by admission and
/// mutated by the worker on every run boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: i64,
    pub repository_id: String,
    pub status: JobStatus,
    pub last_run_at: Option<i64>,
    pub runs: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One tagging attempt. Sealed exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRunRecord {
    pub id: i64,
    pub job_id: i64,
    pub status: RunStatus,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub error_message: Option<String>,
    pub prompt: Option<String>,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub cost_usd: Option<f64>,
    pub latency_ms: Option<i64>,
    pub raw_response: Option<String>,
}

/// Fields written when a run is sealed.
#[derive(Debug, Clone, Default)]
pub struct RunCompletion {
    pub status: Option<RunStatus>,
    pub error_message: Option<String>,
    pub prompt: Option<String>,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub latency_ms: Option<i64>,
    pub raw_response: Option<String>,
}

impl RunCompletion {
    pub fn succeeded() -> Self {
        Self {
            status: Some(RunStatus::Succeeded),
            ..Default::default()
        }
    }

    pub fn failed(error_message: impl Into<String>) -> Self {
        Self {
            status: Some(RunStatus::Failed),
            error_message: Some(error_message.into()),
            ..Default::default()
        }
    }
}

/// Scope of a persisted tag assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagScope {
    Repository,
    File,
}

impl std::fmt::Display for TagScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TagScope::Repository => write!(f, "repository"),
            TagScope::File => write!(f, "file"),
        }
    }
}

impl TagScope {
    pub fn parse(s: &str) -> Self {
        match s {
            "file" => TagScope::File,
            _ => TagScope::Repository,
        }
    }
}

/// A persisted, immutable tag assignment belonging to a successful run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagAssignmentRecord {
    pub id: i64,
    pub job_run_id: i64,
    pub scope: TagScope,
    pub target: String,
    pub key: String,
    pub value: String,
    pub confidence: Option<f64>,
    pub applied_at: i64,
}

/// An assignment about to be recorded for a run.
#[derive(Debug, Clone)]
pub struct NewAssignment {
    pub scope: TagScope,
    pub target: String,
    pub key: String,
    pub value: String,
    pub confidence: Option<f64>,
}
