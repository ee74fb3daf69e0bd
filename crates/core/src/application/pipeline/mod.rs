// Worker Pipeline - job execution loop

mod error;

pub use error::PipelineError;

use crate::application::notifier::Notifier;
use crate::application::prompt::PromptTemplate;
use crate::application::sampling::sample_repository_files;
use crate::domain::{
    diff_file_tags, diff_repository_tags, normalize_file_tags, normalize_tags, FileTagPayload,
    NewAssignment, QueuedJob, RunCompletion, RunStatus, TagPayload, TagScope,
};
use crate::port::{
    AuditStore, CatalogClient, ChatUsage, CheckoutManager, FileExplorerClient, JobQueue,
    ModelClient, RetryOutcome, TimeProvider,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info, warn};

const IDLE_SLEEP: Duration = Duration::from_millis(500);
const ERROR_RECOVERY_SLEEP: Duration = Duration::from_secs(2);

/// Shutdown flag shared by the process's long-running tasks (workers,
/// subscriber, scheduler, read API). Clones all observe the same flag
/// and any clone may raise it; raising more than once is harmless.
#[derive(Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Raise the flag. Every pending and future `wait` resolves.
    pub fn signal(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_signalled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the flag is up; immediate if it already is.
    pub async fn wait(&mut self) {
        if *self.rx.borrow_and_update() {
            return;
        }
        let _ = self.rx.changed().await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything one worker needs; clones share the underlying adapters so a
/// pool of workers can be spawned from a single wiring site.
#[derive(Clone)]
pub struct WorkerDeps {
    pub queue: Arc<dyn JobQueue>,
    pub store: Arc<dyn AuditStore>,
    pub catalog: Arc<dyn CatalogClient>,
    pub explorer: Arc<dyn FileExplorerClient>,
    pub model: Arc<dyn ModelClient>,
    pub checkout: Arc<dyn CheckoutManager>,
    pub prompt: Arc<PromptTemplate>,
    pub notifier: Arc<Notifier>,
    pub time_provider: Arc<dyn TimeProvider>,
}

/// Consumes tagging jobs and runs each through checkout, sampling, the
/// model call, normalization, diffing, apply, audit, and notification.
pub struct TagWorker {
    deps: WorkerDeps,
}

/// Partial context captured along the way so failed runs are still sealed
/// with whatever was computed before the failure.
#[derive(Default)]
struct RunContext {
    prompt: Option<String>,
    raw_response: Option<String>,
    usage: Option<ChatUsage>,
}

struct AppliedTags {
    assignments: Vec<NewAssignment>,
    repository_tags: usize,
    file_tags: usize,
}

/// Wire shape of the model's structured output.
#[derive(Debug, Deserialize)]
struct TagDocument {
    repository_tags: Vec<TagPayload>,
    #[serde(default)]
    file_tags: Vec<FileTagPayload>,
}

impl TagWorker {
    pub fn new(deps: WorkerDeps) -> Self {
        Self { deps }
    }

    /// Run worker loop with graceful shutdown support
    pub async fn run(&self, mut shutdown: Shutdown) {
        info!("Tag worker started");
        loop {
            if shutdown.is_signalled() {
                info!("Tag worker shutting down");
                break;
            }
            match self.process_next_job().await {
                Ok(processed) => {
                    if !processed {
                        tokio::select! {
                            _ = sleep(IDLE_SLEEP) => {},
                            _ = shutdown.wait() => {
                                info!("Tag worker interrupted during idle");
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "Worker loop error");
                    tokio::select! {
                        _ = sleep(ERROR_RECOVERY_SLEEP) => {},
                        _ = shutdown.wait() => {
                            info!("Tag worker interrupted during error recovery");
                            break;
                        }
                    }
                }
            }
        }
        info!("Tag worker stopped");
    }

    /// Process next job from the queue (returns true if a job was leased).
    pub async fn process_next_job(&self) -> crate::error::Result<bool> {
        let Some(job) = self.deps.queue.pop().await? else {
            return Ok(false);
        };

        info!(
            job_id = %job.id,
            repository_id = %job.payload.repository_id,
            trigger = %job.payload.trigger,
            attempts = %job.attempts,
            "Processing tagging job"
        );

        match self.process_job(&job).await {
            Ok(()) => {
                self.deps.queue.complete(&job).await?;
            }
            Err(PipelineError::Transient(reason)) => {
                match self.deps.queue.retry(&job, &reason).await? {
                    RetryOutcome::Rescheduled { delay_ms } => info!(
                        job_id = %job.id,
                        delay_ms = %delay_ms,
                        reason = %reason,
                        "Retrying job after transient failure"
                    ),
                    RetryOutcome::Exhausted => warn!(
                        job_id = %job.id,
                        reason = %reason,
                        "Job failed after max retries"
                    ),
                }
            }
            Err(PipelineError::Permanent(reason)) => {
                warn!(job_id = %job.id, reason = %reason, "Discarding job after permanent failure");
                self.deps.queue.discard(&job, &reason).await?;
            }
        }
        Ok(true)
    }

    /// One tagging run: bookkeeping, pipeline, sealing, notification.
    /// Audit-store failures surface as transient so the queue redelivers;
    /// a run that cannot be sealed must not be silently dropped.
    async fn process_job(&self, job: &QueuedJob) -> Result<(), PipelineError> {
        let repository_id = &job.payload.repository_id;

        let job_record = self
            .deps
            .store
            .upsert_job(repository_id)
            .await
            .map_err(|e| PipelineError::transient("audit store upsert", e))?;
        let run = self
            .deps
            .store
            .start_run(job_record.id)
            .await
            .map_err(|e| PipelineError::transient("audit store start_run", e))?;

        let started_at = self.deps.time_provider.now_millis();
        let mut ctx = RunContext::default();
        let outcome = self.execute(repository_id, &mut ctx).await;
        let latency_ms = self.deps.time_provider.now_millis() - started_at;

        match outcome {
            Ok(applied) => {
                self.deps
                    .store
                    .record_assignments(run.id, &applied.assignments)
                    .await
                    .map_err(|e| PipelineError::transient("audit store assignments", e))?;

                let usage = ctx.usage.unwrap_or_default();
                self.deps
                    .store
                    .complete_run(
                        run.id,
                        RunCompletion {
                            status: Some(RunStatus::Succeeded),
                            error_message: None,
                            prompt: ctx.prompt,
                            prompt_tokens: usage.prompt_tokens,
                            completion_tokens: usage.completion_tokens,
                            latency_ms: Some(latency_ms),
                            raw_response: ctx.raw_response,
                        },
                    )
                    .await
                    .map_err(|e| PipelineError::transient("audit store complete_run", e))?;

                info!(
                    repository_id = %repository_id,
                    run_id = %run.id,
                    repository_tags = %applied.repository_tags,
                    file_tags = %applied.file_tags,
                    latency_ms = %latency_ms,
                    "Tagging run succeeded"
                );

                self.deps
                    .notifier
                    .tagging_completed(
                        repository_id,
                        run.id,
                        applied.repository_tags,
                        applied.file_tags,
                        job.payload.trigger,
                    )
                    .await;
                Ok(())
            }
            Err(err) => {
                let message = err.to_string();
                let usage = ctx.usage.unwrap_or_default();
                self.deps
                    .store
                    .complete_run(
                        run.id,
                        RunCompletion {
                            status: Some(RunStatus::Failed),
                            error_message: Some(message.clone()),
                            prompt: ctx.prompt,
                            prompt_tokens: usage.prompt_tokens,
                            completion_tokens: usage.completion_tokens,
                            latency_ms: Some(latency_ms),
                            raw_response: ctx.raw_response,
                        },
                    )
                    .await
                    .map_err(|e| {
                        error!(run_id = %run.id, error = %e, "Failed to seal failed run");
                        PipelineError::transient("audit store complete_run", e)
                    })?;

                self.deps
                    .notifier
                    .tagging_failed(
                        repository_id,
                        run.id,
                        &message,
                        err.is_transient(),
                        job.payload.trigger,
                    )
                    .await;
                Err(err)
            }
        }
    }

    /// Stages 2-9: metadata through apply. Returns the assignments that
    /// were actually written to the collaborators.
    async fn execute(
        &self,
        repository_id: &str,
        ctx: &mut RunContext,
    ) -> Result<AppliedTags, PipelineError> {
        let metadata = self
            .deps
            .catalog
            .get_repository(repository_id)
            .await
            .map_err(|e| PipelineError::transient("catalog metadata", e))?;

        let repo_url = metadata
            .repo_url
            .clone()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| PipelineError::permanent("repository metadata missing repoUrl"))?;

        let checkout = self
            .deps
            .checkout
            .ensure_checkout(repository_id, &repo_url, metadata.default_branch.as_deref())
            .await
            .map_err(|e| PipelineError::transient("checkout", e))?;

        let samples =
            sample_repository_files(self.deps.explorer.as_ref(), repository_id, &checkout).await;

        let prompt = self
            .deps
            .prompt
            .render_tagging_prompt(&metadata, &samples)
            .await
            .map_err(|e| PipelineError::transient("prompt template", e))?;
        ctx.prompt = Some(prompt.clone());

        let completion = self
            .deps
            .model
            .suggest_tags(&prompt)
            .await
            .map_err(|e| PipelineError::transient("model call", e))?;
        ctx.raw_response = Some(completion.raw.to_string());
        ctx.usage = completion.usage;

        let content = completion
            .content
            .filter(|c| !c.is_empty())
            .ok_or_else(|| PipelineError::permanent("model response contained no content"))?;
        let document = parse_tag_document(&content)?;

        let repository_tags = normalize_tags(&document.repository_tags);
        let file_tags = normalize_file_tags(&document.file_tags);

        let diff = diff_repository_tags(&repository_tags, &metadata.tags);
        let file_diffs = diff_file_tags(&file_tags);

        // Apply: repository batch first, then per-file additions, then any
        // per-file removals strictly last.
        self.deps
            .catalog
            .apply_tags(repository_id, &diff.apply, &diff.remove)
            .await
            .map_err(|e| PipelineError::transient("catalog tag apply", e))?;

        for file_diff in &file_diffs {
            self.deps
                .explorer
                .apply_file_tags(repository_id, &file_diff.path, &file_diff.apply)
                .await
                .map_err(|e| PipelineError::transient("file tag apply", e))?;
        }
        for file_diff in &file_diffs {
            if file_diff.remove.is_empty() {
                continue;
            }
            let removals: Vec<TagPayload> = file_diff
                .remove
                .iter()
                .map(|r| TagPayload::new(r.key.clone(), r.value.clone()))
                .collect();
            self.deps
                .explorer
                .remove_file_tags(repository_id, &file_diff.path, &removals)
                .await
                .map_err(|e| PipelineError::transient("file tag removal", e))?;
        }

        let mut assignments =
            Vec::with_capacity(diff.apply.len() + file_tags.iter().map(|f| f.tags.len()).sum::<usize>());
        for tag in &diff.apply {
            assignments.push(NewAssignment {
                scope: TagScope::Repository,
                target: repository_id.to_string(),
                key: tag.key.clone(),
                value: tag.value.clone(),
                confidence: tag.confidence,
            });
        }
        let mut file_tag_count = 0;
        for file in &file_tags {
            for tag in &file.tags {
                file_tag_count += 1;
                assignments.push(NewAssignment {
                    scope: TagScope::File,
                    target: file.path.clone(),
                    key: tag.key.clone(),
                    value: tag.value.clone(),
                    confidence: tag.confidence,
                });
            }
        }

        Ok(AppliedTags {
            repository_tags: diff.apply.len(),
            file_tags: file_tag_count,
            assignments,
        })
    }
}

/// Parse the model content into a tag document. Non-JSON content and JSON
/// without a `repository_tags` array are permanent failures: the model
/// answered, retrying will not change its mind about the schema.
fn parse_tag_document(content: &str) -> Result<TagDocument, PipelineError> {
    let value: serde_json::Value = serde_json::from_str(content)
        .map_err(|e| PipelineError::permanent(format!("model content is not valid JSON: {e}")))?;

    if !value
        .get("repository_tags")
        .map(serde_json::Value::is_array)
        .unwrap_or(false)
    {
        return Err(PipelineError::permanent(
            "model content missing repository_tags array",
        ));
    }

    serde_json::from_value(value)
        .map_err(|e| PipelineError::permanent(format!("model content schema mismatch: {e}")))
}
