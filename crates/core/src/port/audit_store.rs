// Audit Store Port (Interface)

use crate::domain::{
    JobRecord, JobRunRecord, NewAssignment, RunCompletion, TagAssignmentRecord,
};
use crate::error::Result;
use async_trait::async_trait;

/// Durable record of jobs, runs, and tag assignments. All mutating
/// operations are single-writer transactions; readers never observe a run
/// without its owning job's counters updated.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Insert a job for the repository or touch the existing one.
    /// Returns the canonical row either way.
    async fn upsert_job(&self, repository_id: &str) -> Result<JobRecord>;

    /// Atomically create a `running` run, bump the job's run counter,
    /// stamp `last_run_at`, and set the job status to `running`.
    async fn start_run(&self, job_id: i64) -> Result<JobRunRecord>;

    /// Seal the run and propagate the terminal status to the owning job.
    async fn complete_run(&self, run_id: i64, completion: RunCompletion) -> Result<JobRunRecord>;

    /// Batch-insert assignments for a run in one transaction. No-op on an
    /// empty slice.
    async fn record_assignments(&self, run_id: i64, assignments: &[NewAssignment]) -> Result<()>;

    async fn latest_successful_run(&self, repository_id: &str) -> Result<Option<JobRunRecord>>;

    /// True iff a successful run exists whose completion age lies in
    /// `[0, max_age_ms]`. A completion timestamp in the future is not
    /// recent.
    async fn has_recent_successful_run(&self, repository_id: &str, max_age_ms: i64)
        -> Result<bool>;

    async fn list_recent_jobs(&self, limit: i64) -> Result<Vec<JobRecord>>;

    async fn count_jobs(&self) -> Result<i64>;

    async fn get_job_by_id(&self, id: i64) -> Result<Option<JobRecord>>;

    async fn get_run_by_id(&self, id: i64) -> Result<Option<JobRunRecord>>;

    async fn get_assignments_for_run(&self, run_id: i64) -> Result<Vec<TagAssignmentRecord>>;
}
