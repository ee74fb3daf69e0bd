// Job Queue Port (Interface)

use crate::domain::{QueuedJob, TagJobPayload};
use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;

/// Result of an enqueue attempt. A duplicate means a job with the same
/// deterministic id is already waiting, delayed, or active; the call is a
/// no-op and returns that identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued(String),
    Duplicate(String),
}

impl EnqueueOutcome {
    pub fn job_id(&self) -> &str {
        match self {
            EnqueueOutcome::Enqueued(id) | EnqueueOutcome::Duplicate(id) => id,
        }
    }
}

/// What the queue did with a transiently-failed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Re-enters the queue after the given backoff delay.
    Rescheduled { delay_ms: i64 },
    /// Attempts exhausted; the job was moved to the failed retention set.
    Exhausted,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct QueueCounts {
    pub waiting: i64,
    pub delayed: i64,
    pub completed: i64,
    pub failed: i64,
}

/// At-least-once delivery of tagging jobs with deterministic per-repository
/// dedup and exponential retry. At most one worker executes a given job id
/// at a time; transient failures re-enter after backoff, permanent failures
/// are discarded. Transitions (`waiting`, `active`, `completed`/`failed`)
/// are published for subscribers with the job id and failure reason.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, payload: TagJobPayload) -> Result<EnqueueOutcome>;

    /// Lease the next due job, promoting any delayed jobs whose backoff
    /// has elapsed. Returns `None` when nothing is due.
    async fn pop(&self) -> Result<Option<QueuedJob>>;

    /// Mark a leased job finished; its identity becomes enqueueable again.
    async fn complete(&self, job: &QueuedJob) -> Result<()>;

    /// Transient failure path: reschedule with backoff or exhaust.
    async fn retry(&self, job: &QueuedJob, reason: &str) -> Result<RetryOutcome>;

    /// Permanent failure path: discard without further retries.
    async fn discard(&self, job: &QueuedJob, reason: &str) -> Result<()>;

    async fn counts(&self) -> Result<QueueCounts>;
}
