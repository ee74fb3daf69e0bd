// SQLite AuditStore Implementation

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;
use tagsmith_core::domain::{
    JobRecord, JobRunRecord, JobStatus, NewAssignment, RunCompletion, RunStatus,
    TagAssignmentRecord, TagScope,
};
use tagsmith_core::error::{AppError, Result};
use tagsmith_core::port::{AuditStore, TimeProvider};

fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                AppError::Database(format!("[{}] {}", code.as_ref(), db_err.message()))
            } else {
                AppError::Database(db_err.message().to_string())
            }
        }
        sqlx::Error::RowNotFound => AppError::Database("Row not found".to_string()),
        _ => AppError::Database(err.to_string()),
    }
}

pub struct SqliteAuditStore {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteAuditStore {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn upsert_job(&self, repository_id: &str) -> Result<JobRecord> {
        let now = self.time_provider.now_millis();
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            INSERT INTO jobs (repository_id, status, runs, created_at, updated_at)
            VALUES (?, ?, 0, ?, ?)
            ON CONFLICT(repository_id) DO UPDATE SET updated_at = excluded.updated_at
            RETURNING *
            "#,
        )
        .bind(repository_id)
        .bind(JobStatus::Queued.to_string())
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into_record())
    }

    async fn start_run(&self, job_id: i64) -> Result<JobRunRecord> {
        let now = self.time_provider.now_millis();
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let run = sqlx::query_as::<_, JobRunRow>(
            r#"
            INSERT INTO job_runs (job_id, status, started_at)
            VALUES (?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(RunStatus::Running.to_string())
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?, runs = runs + 1, last_run_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(JobStatus::Running.to_string())
        .bind(now)
        .bind(now)
        .bind(job_id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Job {job_id} not found")));
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(run.into_record())
    }

    async fn complete_run(&self, run_id: i64, completion: RunCompletion) -> Result<JobRunRecord> {
        let status = completion.status.ok_or_else(|| {
            AppError::InvalidState("complete_run requires a terminal status".to_string())
        })?;
        if status == RunStatus::Running {
            return Err(AppError::InvalidState(
                "complete_run requires a terminal status".to_string(),
            ));
        }

        let now = self.time_provider.now_millis();
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let run = sqlx::query_as::<_, JobRunRow>(
            r#"
            UPDATE job_runs
            SET status = ?, completed_at = ?, error_message = ?, prompt = ?,
                prompt_tokens = ?, completion_tokens = ?, latency_ms = ?, raw_response = ?
            WHERE id = ? AND status = 'running'
            RETURNING *
            "#,
        )
        .bind(status.to_string())
        .bind(now)
        .bind(&completion.error_message)
        .bind(&completion.prompt)
        .bind(completion.prompt_tokens)
        .bind(completion.completion_tokens)
        .bind(completion.latency_ms)
        .bind(&completion.raw_response)
        .bind(run_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        .ok_or_else(|| {
            AppError::InvalidState(format!("Run {run_id} is missing or already sealed"))
        })?;

        let job_status = match status {
            RunStatus::Succeeded => JobStatus::Succeeded,
            _ => JobStatus::Failed,
        };
        sqlx::query("UPDATE jobs SET status = ?, updated_at = ? WHERE id = ?")
            .bind(job_status.to_string())
            .bind(now)
            .bind(run.job_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(run.into_record())
    }

    async fn record_assignments(&self, run_id: i64, assignments: &[NewAssignment]) -> Result<()> {
        if assignments.is_empty() {
            return Ok(());
        }

        let now = self.time_provider.now_millis();
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        for assignment in assignments {
            sqlx::query(
                r#"
                INSERT INTO tag_assignments (job_run_id, scope, target, key, value, confidence, applied_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(run_id)
            .bind(assignment.scope.to_string())
            .bind(&assignment.target)
            .bind(&assignment.key)
            .bind(&assignment.value)
            .bind(assignment.confidence)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn latest_successful_run(&self, repository_id: &str) -> Result<Option<JobRunRecord>> {
        let row = sqlx::query_as::<_, JobRunRow>(
            r#"
            SELECT r.* FROM job_runs r
            JOIN jobs j ON j.id = r.job_id
            WHERE j.repository_id = ? AND r.status = 'succeeded' AND r.completed_at IS NOT NULL
            ORDER BY r.completed_at DESC, r.id DESC
            LIMIT 1
            "#,
        )
        .bind(repository_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(JobRunRow::into_record))
    }

    async fn has_recent_successful_run(
        &self,
        repository_id: &str,
        max_age_ms: i64,
    ) -> Result<bool> {
        let Some(run) = self.latest_successful_run(repository_id).await? else {
            return Ok(false);
        };
        let Some(completed_at) = run.completed_at else {
            return Ok(false);
        };

        let age = self.time_provider.now_millis() - completed_at;
        Ok((0..=max_age_ms).contains(&age))
    }

    async fn list_recent_jobs(&self, limit: i64) -> Result<Vec<JobRecord>> {
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT * FROM jobs
            ORDER BY updated_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(JobRow::into_record).collect())
    }

    async fn count_jobs(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    async fn get_job_by_id(&self, id: i64) -> Result<Option<JobRecord>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(JobRow::into_record))
    }

    async fn get_run_by_id(&self, id: i64) -> Result<Option<JobRunRecord>> {
        let row = sqlx::query_as::<_, JobRunRow>("SELECT * FROM job_runs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(JobRunRow::into_record))
    }

    async fn get_assignments_for_run(&self, run_id: i64) -> Result<Vec<TagAssignmentRecord>> {
        let rows = sqlx::query_as::<_, TagAssignmentRow>(
            "SELECT * FROM tag_assignments WHERE job_run_id = ? ORDER BY id ASC",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(TagAssignmentRow::into_record).collect())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: i64,
    repository_id: String,
    status: String,
    last_run_at: Option<i64>,
    runs: i64,
    created_at: i64,
    updated_at: i64,
}

impl JobRow {
    fn into_record(self) -> JobRecord {
        JobRecord {
            id: self.id,
            repository_id: self.repository_id,
            status: JobStatus::parse(&self.status),
            last_run_at: self.last_run_at,
            runs: self.runs,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct JobRunRow {
    id: i64,
    job_id: i64,
    status: String,
    started_at: i64,
    completed_at: Option<i64>,
    error_message: Option<String>,
    prompt: Option<String>,
    prompt_tokens: Option<i64>,
    completion_tokens: Option<i64>,
    cost_usd: Option<f64>,
    latency_ms: Option<i64>,
    raw_response: Option<String>,
}

impl JobRunRow {
    fn into_record(self) -> JobRunRecord {
        JobRunRecord {
            id: self.id,
            job_id: self.job_id,
            status: RunStatus::parse(&self.status),
            started_at: self.started_at,
            completed_at: self.completed_at,
            error_message: self.error_message,
            prompt: self.prompt,
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            cost_usd: self.cost_usd,
            latency_ms: self.latency_ms,
            raw_response: self.raw_response,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TagAssignmentRow {
    id: i64,
    job_run_id: i64,
    scope: String,
    target: String,
    key: String,
    value: String,
    confidence: Option<f64>,
    applied_at: i64,
}

impl TagAssignmentRow {
    fn into_record(self) -> TagAssignmentRecord {
        TagAssignmentRecord {
            id: self.id,
            job_run_id: self.job_run_id,
            scope: TagScope::parse(&self.scope),
            target: self.target,
            key: self.key,
            value: self.value,
            confidence: self.confidence,
            applied_at: self.applied_at,
        }
    }
}
