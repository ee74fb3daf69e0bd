// Redis JobQueue Implementation
//
// One hash per job is the dedup claim: it exists from enqueue until the
// job completes or is discarded, covering the waiting, delayed, and
// active states. Retry scheduling goes through a delayed zset scored by
// ready-at time; completed/failed ids are kept in capped lists for
// operator visibility.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Arc;
use tagsmith_core::application::retry::{RetryDecision, RetryPolicy};
use tagsmith_core::domain::{job_id_for_repository, QueuedJob, TagJobPayload};
use tagsmith_core::error::{AppError, Result};
use tagsmith_core::port::{EnqueueOutcome, JobQueue, QueueCounts, RetryOutcome, TimeProvider};
use tracing::{debug, warn};

const KEY_WAITING: &str = "tagging:queue:waiting";
const KEY_DELAYED: &str = "tagging:queue:delayed";
const KEY_COMPLETED: &str = "tagging:queue:completed";
const KEY_FAILED: &str = "tagging:queue:failed";
const TRANSITIONS_CHANNEL: &str = "tagging:queue:events";

const COMPLETED_RETENTION: isize = 1_000;
const FAILED_RETENTION: isize = 2_000;

fn job_key(job_id: &str) -> String {
    format!("tagging:job:{job_id}")
}

fn map_redis_error(err: redis::RedisError) -> AppError {
    AppError::Queue(err.to_string())
}

pub struct RedisJobQueue {
    conn: ConnectionManager,
    policy: RetryPolicy,
    time_provider: Arc<dyn TimeProvider>,
}

impl RedisJobQueue {
    pub async fn connect(url: &str, time_provider: Arc<dyn TimeProvider>) -> Result<Self> {
        let client = redis::Client::open(url).map_err(map_redis_error)?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(map_redis_error)?;
        Ok(Self {
            conn,
            policy: RetryPolicy::default(),
            time_provider,
        })
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Move every delayed job whose backoff has elapsed back to waiting.
    async fn promote_due(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let now = self.time_provider.now_millis();
        let due: Vec<String> = conn
            .zrangebyscore(KEY_DELAYED, 0_i64, now)
            .await
            .map_err(map_redis_error)?;

        for job_id in due {
            let removed: i64 = conn
                .zrem(KEY_DELAYED, &job_id)
                .await
                .map_err(map_redis_error)?;
            // Another consumer may have promoted it between the range read
            // and the remove; only the one that removed it re-queues.
            if removed > 0 {
                let _: () = conn
                    .hset(job_key(&job_id), "state", "waiting")
                    .await
                    .map_err(map_redis_error)?;
                let _: () = conn
                    .lpush(KEY_WAITING, &job_id)
                    .await
                    .map_err(map_redis_error)?;
                debug!(job_id = %job_id, "Promoted delayed job");
            }
        }
        Ok(())
    }

    /// Drop the job hash and move the id into a retention list.
    async fn finalize(&self, job_id: &str, retention_key: &str, retention: isize, entry: String) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .del(job_key(job_id))
            .lpush(retention_key, entry)
            .ltrim(retention_key, 0, retention - 1)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    /// Queue transitions are observability, not control flow: publish
    /// errors are logged and suppressed.
    async fn publish_transition(&self, transition: &str, job_id: &str, reason: Option<&str>) {
        let mut conn = self.conn.clone();
        let message = serde_json::json!({
            "event": format!("queue.{transition}"),
            "payload": {
                "jobId": job_id,
                "reason": reason,
            },
        });
        let result: std::result::Result<(), redis::RedisError> =
            conn.publish(TRANSITIONS_CHANNEL, message.to_string()).await;
        if let Err(e) = result {
            warn!(transition = %transition, error = %e, "Failed to publish queue transition");
        }
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, payload: TagJobPayload) -> Result<EnqueueOutcome> {
        let job_id = job_id_for_repository(&payload.repository_id);
        let key = job_key(&job_id);
        let payload_json = serde_json::to_string(&payload)?;

        let mut conn = self.conn.clone();
        let claimed: bool = conn
            .hset_nx(&key, "payload", &payload_json)
            .await
            .map_err(map_redis_error)?;
        if !claimed {
            debug!(job_id = %job_id, "Job already present, enqueue is a no-op");
            return Ok(EnqueueOutcome::Duplicate(job_id));
        }

        let now = self.time_provider.now_millis();
        let _: () = redis::pipe()
            .hset(&key, "attempts", 0_i64)
            .hset(&key, "max_attempts", self.policy.max_attempts as i64)
            .hset(&key, "state", "waiting")
            .hset(&key, "enqueued_at", now)
            .lpush(KEY_WAITING, &job_id)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        self.publish_transition("waiting", &job_id, None).await;
        Ok(EnqueueOutcome::Enqueued(job_id))
    }

    async fn pop(&self) -> Result<Option<QueuedJob>> {
        self.promote_due().await?;

        let mut conn = self.conn.clone();
        let popped: Option<String> = conn
            .rpop(KEY_WAITING, None)
            .await
            .map_err(map_redis_error)?;
        let Some(job_id) = popped else {
            return Ok(None);
        };

        let key = job_key(&job_id);
        let fields: HashMap<String, String> =
            conn.hgetall(&key).await.map_err(map_redis_error)?;
        let Some(payload_json) = fields.get("payload") else {
            // Hash vanished under us (e.g. flushed); nothing to execute.
            warn!(job_id = %job_id, "Waiting job without a payload hash, dropping");
            return Ok(None);
        };
        let payload: TagJobPayload = serde_json::from_str(payload_json)?;
        let attempts = fields
            .get("attempts")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let max_attempts = fields
            .get("max_attempts")
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.policy.max_attempts);

        let _: () = conn
            .hset(&key, "state", "active")
            .await
            .map_err(map_redis_error)?;
        self.publish_transition("active", &job_id, None).await;

        Ok(Some(QueuedJob {
            id: job_id,
            payload,
            attempts,
            max_attempts,
        }))
    }

    async fn complete(&self, job: &QueuedJob) -> Result<()> {
        self.finalize(&job.id, KEY_COMPLETED, COMPLETED_RETENTION, job.id.clone())
            .await?;
        self.publish_transition("completed", &job.id, None).await;
        Ok(())
    }

    async fn retry(&self, job: &QueuedJob, reason: &str) -> Result<RetryOutcome> {
        let attempts_made = job.attempts + 1;
        match self.policy.should_retry(&job.id, attempts_made) {
            RetryDecision::Retry(delay_ms) => {
                let key = job_key(&job.id);
                let ready_at = self.time_provider.now_millis() + delay_ms;
                let mut conn = self.conn.clone();
                let _: () = redis::pipe()
                    .hset(&key, "attempts", attempts_made as i64)
                    .hset(&key, "state", "delayed")
                    .zadd(KEY_DELAYED, &job.id, ready_at)
                    .query_async(&mut conn)
                    .await
                    .map_err(map_redis_error)?;
                self.publish_transition("waiting", &job.id, Some(reason)).await;
                Ok(RetryOutcome::Rescheduled { delay_ms })
            }
            RetryDecision::Exhausted => {
                let entry = failed_entry(&job.id, reason, self.time_provider.now_millis());
                self.finalize(&job.id, KEY_FAILED, FAILED_RETENTION, entry)
                    .await?;
                self.publish_transition("failed", &job.id, Some(reason)).await;
                Ok(RetryOutcome::Exhausted)
            }
        }
    }

    async fn discard(&self, job: &QueuedJob, reason: &str) -> Result<()> {
        let entry = failed_entry(&job.id, reason, self.time_provider.now_millis());
        self.finalize(&job.id, KEY_FAILED, FAILED_RETENTION, entry)
            .await?;
        self.publish_transition("failed", &job.id, Some(reason)).await;
        Ok(())
    }

    async fn counts(&self) -> Result<QueueCounts> {
        let mut conn = self.conn.clone();
        let (waiting, completed, failed): (i64, i64, i64) = redis::pipe()
            .llen(KEY_WAITING)
            .llen(KEY_COMPLETED)
            .llen(KEY_FAILED)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        let delayed: i64 = conn.zcard(KEY_DELAYED).await.map_err(map_redis_error)?;
        Ok(QueueCounts {
            waiting,
            delayed,
            completed,
            failed,
        })
    }
}

fn failed_entry(job_id: &str, reason: &str, failed_at: i64) -> String {
    serde_json::json!({
        "jobId": job_id,
        "reason": reason,
        "failedAt": failed_at,
    })
    .to_string()
}
