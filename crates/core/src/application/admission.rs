// Event Admission - gate between the bus and the job queue

use crate::domain::{parse_event, NormalizedEvent, TagJobPayload, Trigger};
use crate::error::Result;
use crate::port::{AuditStore, EnqueueOutcome, JobQueue};
use std::sync::Arc;
use tracing::{debug, warn};

/// Successful runs inside this window suppress event-driven enqueues.
pub const EVENT_RECENCY_WINDOW_MS: i64 = 12 * 60 * 60 * 1000;

const INGEST_READY: &str = "ready";

/// What admission did with one inbound message. Returned for tests and
/// logged at debug in production.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionDecision {
    Enqueued(String),
    Duplicate(String),
    /// Not a `repository.` event; ignored entirely.
    Ignored,
    /// A repository event that does not trigger tagging; forwarded to the
    /// registered listener if any.
    Forwarded,
    MissingRepositoryId,
    NotReady,
    RecentlyTagged,
}

/// Listener for repository events that admission forwards but does not
/// act on itself.
pub trait RepositoryEventListener: Send + Sync {
    fn on_repository_event(&self, event: &NormalizedEvent);
}

pub struct EventAdmission {
    store: Arc<dyn AuditStore>,
    queue: Arc<dyn JobQueue>,
    listener: Option<Arc<dyn RepositoryEventListener>>,
}

impl EventAdmission {
    pub fn new(store: Arc<dyn AuditStore>, queue: Arc<dyn JobQueue>) -> Self {
        Self {
            store,
            queue,
            listener: None,
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn RepositoryEventListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Entry point for raw bus messages. Malformed JSON is logged and
    /// dropped; admission errors are logged and swallowed so the
    /// subscription stays alive.
    pub async fn handle_message(&self, raw: &str) {
        let Some(event) = parse_event(raw) else {
            warn!(bytes = raw.len(), "Dropping malformed bus message");
            return;
        };

        match self.handle_event(event).await {
            Ok(decision) => debug!(decision = ?decision, "Admission decision"),
            Err(e) => warn!(error = %e, "Admission failed for bus message"),
        }
    }

    pub async fn handle_event(&self, event: NormalizedEvent) -> Result<AdmissionDecision> {
        if !event.is_repository_event() {
            return Ok(AdmissionDecision::Ignored);
        }

        if !matches!(
            event.name.as_str(),
            "repository.updated" | "repository.ingestion-event"
        ) {
            if let Some(listener) = &self.listener {
                listener.on_repository_event(&event);
            }
            return Ok(AdmissionDecision::Forwarded);
        }

        let Some(repository_id) = event.repository_id.clone() else {
            debug!(event = %event.name, "Repository event without repository id");
            return Ok(AdmissionDecision::MissingRepositoryId);
        };

        if event.ingest_status.as_deref() != Some(INGEST_READY) {
            debug!(
                repository_id = %repository_id,
                ingest_status = ?event.ingest_status,
                "Repository not ready for tagging"
            );
            return Ok(AdmissionDecision::NotReady);
        }

        if self
            .store
            .has_recent_successful_run(&repository_id, EVENT_RECENCY_WINDOW_MS)
            .await?
        {
            debug!(
                repository_id = %repository_id,
                "Recently tagged, suppressing enqueue"
            );
            return Ok(AdmissionDecision::RecentlyTagged);
        }

        let payload = TagJobPayload::new(&repository_id, Trigger::Event)
            .with_reason(event.name.clone());
        match self.queue.enqueue(payload).await? {
            EnqueueOutcome::Enqueued(id) => Ok(AdmissionDecision::Enqueued(id)),
            EnqueueOutcome::Duplicate(id) => Ok(AdmissionDecision::Duplicate(id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        job_id_for_repository, JobRecord, JobRunRecord, NewAssignment, QueuedJob, RunCompletion,
        TagAssignmentRecord,
    };
    use crate::port::{QueueCounts, RetryOutcome};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct StubStore {
        recent: bool,
    }

    #[async_trait]
    impl AuditStore for StubStore {
        async fn upsert_job(&self, _repository_id: &str) -> Result<JobRecord> {
            unimplemented!()
        }
        async fn start_run(&self, _job_id: i64) -> Result<JobRunRecord> {
            unimplemented!()
        }
        async fn complete_run(
            &self,
            _run_id: i64,
            _completion: RunCompletion,
        ) -> Result<JobRunRecord> {
            unimplemented!()
        }
        async fn record_assignments(
            &self,
            _run_id: i64,
            _assignments: &[NewAssignment],
        ) -> Result<()> {
            unimplemented!()
        }
        async fn latest_successful_run(
            &self,
            _repository_id: &str,
        ) -> Result<Option<JobRunRecord>> {
            unimplemented!()
        }
        async fn has_recent_successful_run(
            &self,
            _repository_id: &str,
            _max_age_ms: i64,
        ) -> Result<bool> {
            Ok(self.recent)
        }
        async fn list_recent_jobs(&self, _limit: i64) -> Result<Vec<JobRecord>> {
            unimplemented!()
        }
        async fn count_jobs(&self) -> Result<i64> {
            unimplemented!()
        }
        async fn get_job_by_id(&self, _id: i64) -> Result<Option<JobRecord>> {
            unimplemented!()
        }
        async fn get_run_by_id(&self, _id: i64) -> Result<Option<JobRunRecord>> {
            unimplemented!()
        }
        async fn get_assignments_for_run(&self, _run_id: i64) -> Result<Vec<TagAssignmentRecord>> {
            unimplemented!()
        }
    }

    #[derive(Default)]
    struct RecordingQueue {
        enqueued: Mutex<Vec<TagJobPayload>>,
    }

    #[async_trait]
    impl JobQueue for RecordingQueue {
        async fn enqueue(&self, payload: TagJobPayload) -> Result<EnqueueOutcome> {
            let id = job_id_for_repository(&payload.repository_id);
            self.enqueued.lock().unwrap().push(payload);
            Ok(EnqueueOutcome::Enqueued(id))
        }
        async fn pop(&self) -> Result<Option<QueuedJob>> {
            Ok(None)
        }
        async fn complete(&self, _job: &QueuedJob) -> Result<()> {
            Ok(())
        }
        async fn retry(&self, _job: &QueuedJob, _reason: &str) -> Result<RetryOutcome> {
            Ok(RetryOutcome::Exhausted)
        }
        async fn discard(&self, _job: &QueuedJob, _reason: &str) -> Result<()> {
            Ok(())
        }
        async fn counts(&self) -> Result<QueueCounts> {
            Ok(QueueCounts::default())
        }
    }

    fn admission(recent: bool) -> (EventAdmission, Arc<RecordingQueue>) {
        let queue = Arc::new(RecordingQueue::default());
        let store = Arc::new(StubStore { recent });
        (
            EventAdmission::new(store, queue.clone()),
            queue,
        )
    }

    fn ready_event(name: &str, repo: &str) -> NormalizedEvent {
        NormalizedEvent {
            name: name.to_string(),
            repository_id: Some(repo.to_string()),
            ingest_status: Some("ready".to_string()),
        }
    }

    #[tokio::test]
    async fn ready_event_enqueues_with_event_trigger() {
        let (admission, queue) = admission(false);
        let decision = admission
            .handle_event(ready_event("repository.updated", "r1"))
            .await
            .unwrap();

        assert_eq!(
            decision,
            AdmissionDecision::Enqueued(job_id_for_repository("r1"))
        );
        let enqueued = queue.enqueued.lock().unwrap();
        assert_eq!(enqueued.len(), 1);
        assert_eq!(enqueued[0].trigger, Trigger::Event);
    }

    #[tokio::test]
    async fn not_ready_event_is_dropped() {
        let (admission, queue) = admission(false);
        let mut event = ready_event("repository.updated", "r1");
        event.ingest_status = Some("pending".to_string());

        let decision = admission.handle_event(event).await.unwrap();
        assert_eq!(decision, AdmissionDecision::NotReady);
        assert!(queue.enqueued.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn recent_run_suppresses_enqueue() {
        let (admission, queue) = admission(true);
        let decision = admission
            .handle_event(ready_event("repository.ingestion-event", "r3"))
            .await
            .unwrap();

        assert_eq!(decision, AdmissionDecision::RecentlyTagged);
        assert!(queue.enqueued.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_repository_id_is_dropped() {
        let (admission, queue) = admission(false);
        let event = NormalizedEvent {
            name: "repository.updated".to_string(),
            repository_id: None,
            ingest_status: Some("ready".to_string()),
        };

        let decision = admission.handle_event(event).await.unwrap();
        assert_eq!(decision, AdmissionDecision::MissingRepositoryId);
        assert!(queue.enqueued.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn other_repository_events_forward_without_enqueue() {
        let (admission, queue) = admission(false);
        let decision = admission
            .handle_event(ready_event("repository.created", "r9"))
            .await
            .unwrap();

        assert_eq!(decision, AdmissionDecision::Forwarded);
        assert!(queue.enqueued.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_repository_events_are_ignored() {
        let (admission, _queue) = admission(false);
        let decision = admission
            .handle_event(NormalizedEvent {
                name: "build.completed".to_string(),
                repository_id: None,
                ingest_status: None,
            })
            .await
            .unwrap();

        assert_eq!(decision, AdmissionDecision::Ignored);
    }
}
