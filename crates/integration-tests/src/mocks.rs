// In-memory collaborators implementing the core ports.

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use tagsmith_core::application::retry::{RetryDecision, RetryPolicy};
use tagsmith_core::domain::{
    job_id_for_repository, FileSearchHit, QueuedJob, RepositoryMetadata, RepositorySummary,
    TagJobPayload, TagPayload, TagRef,
};
use tagsmith_core::error::{AppError, Result};
use tagsmith_core::port::{
    CatalogClient, ChatCompletion, CheckoutManager, EnqueueOutcome, EventPublisher,
    FileExplorerClient, JobQueue, ModelClient, OutboundEvent, QueueCounts, RetryOutcome,
    TimeProvider, WebhookSink,
};

/// Mutable fake clock shared between test and system under test.
pub struct MutableTime(AtomicI64);

impl MutableTime {
    pub fn new(millis: i64) -> Self {
        Self(AtomicI64::new(millis))
    }

    pub fn set(&self, millis: i64) {
        self.0.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, delta: i64) {
        self.0.fetch_add(delta, Ordering::SeqCst);
    }
}

impl TimeProvider for MutableTime {
    fn now_millis(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// In-memory queue honoring the dedup and retry contract. Backoff delays
/// are recorded but not waited for, so tests drive redelivery directly.
#[derive(Default)]
pub struct InMemoryJobQueue {
    waiting: Mutex<VecDeque<QueuedJob>>,
    present: Mutex<HashSet<String>>,
    pub completed: Mutex<Vec<String>>,
    pub discarded: Mutex<Vec<(String, String)>>,
    pub retries: Mutex<Vec<(String, i64)>>,
    pub exhausted: Mutex<Vec<String>>,
}

impl InMemoryJobQueue {
    pub fn waiting_len(&self) -> usize {
        self.waiting.lock().unwrap().len()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, payload: TagJobPayload) -> Result<EnqueueOutcome> {
        let job_id = job_id_for_repository(&payload.repository_id);
        let mut present = self.present.lock().unwrap();
        if !present.insert(job_id.clone()) {
            return Ok(EnqueueOutcome::Duplicate(job_id));
        }
        self.waiting.lock().unwrap().push_back(QueuedJob {
            id: job_id.clone(),
            payload,
            attempts: 0,
            max_attempts: RetryPolicy::default().max_attempts,
        });
        Ok(EnqueueOutcome::Enqueued(job_id))
    }

    async fn pop(&self) -> Result<Option<QueuedJob>> {
        Ok(self.waiting.lock().unwrap().pop_front())
    }

    async fn complete(&self, job: &QueuedJob) -> Result<()> {
        self.present.lock().unwrap().remove(&job.id);
        self.completed.lock().unwrap().push(job.id.clone());
        Ok(())
    }

    async fn retry(&self, job: &QueuedJob, reason: &str) -> Result<RetryOutcome> {
        let attempts_made = job.attempts + 1;
        match RetryPolicy::default().should_retry(&job.id, attempts_made) {
            RetryDecision::Retry(delay_ms) => {
                self.retries.lock().unwrap().push((job.id.clone(), delay_ms));
                let mut retried = job.clone();
                retried.attempts = attempts_made;
                self.waiting.lock().unwrap().push_back(retried);
                Ok(RetryOutcome::Rescheduled { delay_ms })
            }
            RetryDecision::Exhausted => {
                self.present.lock().unwrap().remove(&job.id);
                self.exhausted.lock().unwrap().push(job.id.clone());
                self.discarded
                    .lock()
                    .unwrap()
                    .push((job.id.clone(), reason.to_string()));
                Ok(RetryOutcome::Exhausted)
            }
        }
    }

    async fn discard(&self, job: &QueuedJob, reason: &str) -> Result<()> {
        self.present.lock().unwrap().remove(&job.id);
        self.discarded
            .lock()
            .unwrap()
            .push((job.id.clone(), reason.to_string()));
        Ok(())
    }

    async fn counts(&self) -> Result<QueueCounts> {
        Ok(QueueCounts {
            waiting: self.waiting.lock().unwrap().len() as i64,
            delayed: 0,
            completed: self.completed.lock().unwrap().len() as i64,
            failed: self.discarded.lock().unwrap().len() as i64,
        })
    }
}

/// Catalog with fixed metadata and recorded tag batches.
pub struct MockCatalog {
    pub metadata: Mutex<Option<RepositoryMetadata>>,
    pub listing: Vec<RepositorySummary>,
    pub applied: Mutex<Vec<(String, Vec<TagPayload>, Vec<TagRef>)>>,
}

impl MockCatalog {
    pub fn with_metadata(metadata: RepositoryMetadata) -> Self {
        Self {
            metadata: Mutex::new(Some(metadata)),
            listing: Vec::new(),
            applied: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl CatalogClient for MockCatalog {
    async fn get_repository(&self, repository_id: &str) -> Result<RepositoryMetadata> {
        self.metadata
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| AppError::NotFound(format!("repository {repository_id}")))
    }

    async fn apply_tags(
        &self,
        repository_id: &str,
        tags: &[TagPayload],
        remove: &[TagRef],
    ) -> Result<()> {
        self.applied.lock().unwrap().push((
            repository_id.to_string(),
            tags.to_vec(),
            remove.to_vec(),
        ));
        Ok(())
    }

    async fn list_repositories(&self, page: i64, per_page: i64) -> Result<Vec<RepositorySummary>> {
        let start = ((page - 1) * per_page) as usize;
        if start >= self.listing.len() {
            return Ok(Vec::new());
        }
        let end = (start + per_page as usize).min(self.listing.len());
        Ok(self.listing[start..end].to_vec())
    }
}

/// Explorer with canned hits and recorded writes.
#[derive(Default)]
pub struct MockExplorer {
    pub hits: Vec<FileSearchHit>,
    pub fail_search: bool,
    pub applied: Mutex<Vec<(String, String, Vec<TagPayload>)>>,
    pub removed: Mutex<Vec<(String, String, Vec<TagPayload>)>>,
}

#[async_trait]
impl FileExplorerClient for MockExplorer {
    async fn search_files(&self, _repository_id: &str, limit: usize) -> Result<Vec<FileSearchHit>> {
        if self.fail_search {
            return Err(AppError::Http("search unavailable".to_string()));
        }
        Ok(self.hits.iter().take(limit).cloned().collect())
    }

    async fn apply_file_tags(
        &self,
        repository_id: &str,
        path: &str,
        tags: &[TagPayload],
    ) -> Result<()> {
        self.applied.lock().unwrap().push((
            repository_id.to_string(),
            path.to_string(),
            tags.to_vec(),
        ));
        Ok(())
    }

    async fn remove_file_tags(
        &self,
        repository_id: &str,
        path: &str,
        tags: &[TagPayload],
    ) -> Result<()> {
        self.removed.lock().unwrap().push((
            repository_id.to_string(),
            path.to_string(),
            tags.to_vec(),
        ));
        Ok(())
    }
}

/// Model returning scripted outcomes, one per call.
pub struct ScriptedModel {
    responses: Mutex<VecDeque<Result<ChatCompletion>>>,
    pub calls: AtomicI64,
}

impl ScriptedModel {
    pub fn new(responses: Vec<Result<ChatCompletion>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            calls: AtomicI64::new(0),
        }
    }

    /// A completion whose content is the given JSON document.
    pub fn completion(content: &str) -> ChatCompletion {
        ChatCompletion {
            content: Some(content.to_string()),
            usage: Some(tagsmith_core::port::ChatUsage {
                prompt_tokens: Some(200),
                completion_tokens: Some(50),
                total_tokens: Some(250),
            }),
            raw: serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": content } }],
                "usage": { "prompt_tokens": 200, "completion_tokens": 50, "total_tokens": 250 },
            }),
        }
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn suggest_tags(&self, _prompt: &str) -> Result<ChatCompletion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AppError::Http("no scripted response left".to_string())))
    }
}

/// Checkout manager that hands back a fixed directory.
pub struct FixedCheckout {
    pub path: PathBuf,
    pub calls: AtomicI64,
}

impl FixedCheckout {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            calls: AtomicI64::new(0),
        }
    }
}

#[async_trait]
impl CheckoutManager for FixedCheckout {
    async fn ensure_checkout(
        &self,
        _repository_id: &str,
        _repo_url: &str,
        _default_branch: Option<&str>,
    ) -> Result<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.path.clone())
    }
}

/// Publisher collecting every outbound event.
#[derive(Default)]
pub struct CollectingPublisher {
    pub events: Mutex<Vec<OutboundEvent>>,
}

impl CollectingPublisher {
    pub fn events_named(&self, name: &str) -> Vec<OutboundEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event == name)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventPublisher for CollectingPublisher {
    async fn publish(&self, event: &OutboundEvent) -> Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Webhook recording deliveries.
#[derive(Default)]
pub struct CollectingWebhook {
    pub deliveries: Mutex<Vec<OutboundEvent>>,
}

#[async_trait]
impl WebhookSink for CollectingWebhook {
    async fn deliver(&self, event: &OutboundEvent) -> Result<()> {
        self.deliveries.lock().unwrap().push(event.clone());
        Ok(())
    }
}
