// Worker pipeline scenarios: a full successful run, permanent failure on
// missing metadata, transient failure with queue-level retry, and retry
// exhaustion.

use std::io::Write as _;
use std::sync::Arc;
use tagsmith_core::application::notifier::Notifier;
use tagsmith_core::application::pipeline::{TagWorker, WorkerDeps};
use tagsmith_core::application::prompt::PromptTemplate;
use tagsmith_core::config::SqlitePoolConfig;
use tagsmith_core::domain::{
    FileSearchHit, RepositoryMetadata, RepositoryTag, RunStatus, TagJobPayload, TagScope, Trigger,
};
use tagsmith_core::error::AppError;
use tagsmith_core::port::{AuditStore, JobQueue, TimeProvider};
use tagsmith_infra_sqlite::{create_pool, run_migrations, SqliteAuditStore};
use tagsmith_integration_tests::mocks::{
    CollectingPublisher, CollectingWebhook, FixedCheckout, InMemoryJobQueue, MockCatalog,
    MockExplorer, MutableTime, ScriptedModel,
};

struct Harness {
    worker: TagWorker,
    store: Arc<SqliteAuditStore>,
    queue: Arc<InMemoryJobQueue>,
    catalog: Arc<MockCatalog>,
    explorer: Arc<MockExplorer>,
    model: Arc<ScriptedModel>,
    publisher: Arc<CollectingPublisher>,
    webhook: Arc<CollectingWebhook>,
    _workdir: tempfile::TempDir,
    _template: tempfile::NamedTempFile,
}

fn metadata(repo_url: Option<&str>) -> RepositoryMetadata {
    RepositoryMetadata {
        id: "r1".into(),
        name: Some("demo-service".into()),
        repo_url: repo_url.map(String::from),
        default_branch: Some("main".into()),
        readme: Some("# Demo service".into()),
        description: Some("A demo".into()),
        tags: vec![RepositoryTag {
            key: "language".into(),
            value: "go".into(),
            source: Some("tagging-service".into()),
        }],
    }
}

async fn harness(metadata: RepositoryMetadata, model: ScriptedModel) -> Harness {
    let pool = create_pool("sqlite::memory:", &SqlitePoolConfig::default())
        .await
        .unwrap();
    run_migrations(&pool).await.unwrap();
    let time = Arc::new(MutableTime::new(1_000_000));
    let store = Arc::new(SqliteAuditStore::new(pool, time.clone()));

    let queue = Arc::new(InMemoryJobQueue::default());
    let catalog = Arc::new(MockCatalog::with_metadata(metadata));
    let explorer = Arc::new(MockExplorer {
        hits: vec![FileSearchHit {
            path: "src/main.rs".into(),
            score: Some(0.9),
            preview: Some("fn main() {}".into()),
        }],
        ..Default::default()
    });
    let model = Arc::new(model);

    let workdir = tempfile::tempdir().unwrap();
    let checkout = Arc::new(FixedCheckout::new(workdir.path()));

    let mut template = tempfile::NamedTempFile::new().unwrap();
    write!(
        template,
        "{{{{repository_summary}}}}\n{{{{existing_tags}}}}\n{{{{readme}}}}\n{{{{file_summaries}}}}"
    )
    .unwrap();
    let prompt = Arc::new(PromptTemplate::new(template.path()));

    let publisher = Arc::new(CollectingPublisher::default());
    let webhook = Arc::new(CollectingWebhook::default());
    let notifier = Arc::new(Notifier::new(
        publisher.clone(),
        Some(webhook.clone()),
        time.clone(),
    ));

    let deps = WorkerDeps {
        queue: queue.clone(),
        store: store.clone(),
        catalog: catalog.clone(),
        explorer: explorer.clone(),
        model: model.clone(),
        checkout,
        prompt,
        notifier,
        time_provider: time.clone(),
    };

    Harness {
        worker: TagWorker::new(deps),
        store,
        queue,
        catalog,
        explorer,
        model,
        publisher,
        webhook,
        _workdir: workdir,
        _template: template,
    }
}

const MODEL_CONTENT: &str = r#"{
    "repository_tags": [
        {"key": "Language", "value": "Rust", "confidence": 1.4},
        {"key": "language", "value": "rust"}
    ],
    "file_tags": [
        {"path": "src/main.rs", "tags": [{"key": "Role", "value": "Entrypoint", "confidence": 0.7}]},
        {"path": "junk.txt", "tags": [{"key": "", "value": ""}]}
    ]
}"#;

#[tokio::test]
async fn successful_run_applies_records_and_notifies() {
    let h = harness(
        metadata(Some("https://git.example/r1.git")),
        ScriptedModel::new(vec![Ok(ScriptedModel::completion(MODEL_CONTENT))]),
    )
    .await;

    h.queue
        .enqueue(TagJobPayload::new("r1", Trigger::Event))
        .await
        .unwrap();
    assert!(h.worker.process_next_job().await.unwrap());

    // Queue: job completed, identity free again.
    assert_eq!(h.queue.completed.lock().unwrap().len(), 1);
    assert_eq!(h.queue.waiting_len(), 0);

    // Catalog batch: normalized+deduped apply, stale service tag removed.
    let applied = h.catalog.applied.lock().unwrap();
    assert_eq!(applied.len(), 1);
    let (_, tags, removals) = &applied[0];
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].key, "language");
    assert_eq!(tags[0].value, "rust");
    assert_eq!(tags[0].confidence, Some(1.0));
    assert_eq!(removals.len(), 1);
    assert_eq!(removals[0].value, "go");

    // File tags: one file applied, the empty one dropped, nothing removed.
    assert_eq!(h.explorer.applied.lock().unwrap().len(), 1);
    assert!(h.explorer.removed.lock().unwrap().is_empty());

    // Audit: one sealed run with assignments, prompt, tokens.
    let run = h.store.latest_successful_run("r1").await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Succeeded);
    assert_eq!(run.prompt_tokens, Some(200));
    assert_eq!(run.completion_tokens, Some(50));
    assert!(run.prompt.as_deref().unwrap().contains("demo-service"));
    assert!(run.raw_response.is_some());

    let assignments = h.store.get_assignments_for_run(run.id).await.unwrap();
    assert_eq!(assignments.len(), 2);
    assert!(assignments
        .iter()
        .any(|a| a.scope == TagScope::Repository && a.target == "r1"));
    assert!(assignments
        .iter()
        .any(|a| a.scope == TagScope::File && a.target == "src/main.rs"));

    // Notifications: exactly one completed event, mirrored to the webhook.
    let completed = h.publisher.events_named("tagging.completed");
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].payload["repositoryTags"], 1);
    assert_eq!(completed[0].payload["fileTags"], 1);
    assert_eq!(completed[0].payload["trigger"], "event");
    assert_eq!(h.webhook.deliveries.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn missing_repo_url_is_a_permanent_failure() {
    let h = harness(
        metadata(None),
        ScriptedModel::new(vec![Ok(ScriptedModel::completion(MODEL_CONTENT))]),
    )
    .await;

    h.queue
        .enqueue(TagJobPayload::new("r1", Trigger::Event))
        .await
        .unwrap();
    assert!(h.worker.process_next_job().await.unwrap());

    // Discarded without retries; the model was never consulted.
    let discarded = h.queue.discarded.lock().unwrap();
    assert_eq!(discarded.len(), 1);
    assert!(discarded[0].1.contains("repoUrl"));
    assert_eq!(h.queue.waiting_len(), 0);
    assert_eq!(h.model.calls.load(std::sync::atomic::Ordering::SeqCst), 0);

    // Run sealed failed with the message.
    let job = h.store.list_recent_jobs(1).await.unwrap().remove(0);
    assert_eq!(job.runs, 1);
    let failed = h.publisher.events_named("tagging.failed");
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].payload["transient"], false);
    assert!(failed[0].payload["error"]
        .as_str()
        .unwrap()
        .contains("repoUrl"));
}

#[tokio::test]
async fn transient_model_failure_retries_then_succeeds() {
    let h = harness(
        metadata(Some("https://git.example/r1.git")),
        ScriptedModel::new(vec![
            Err(AppError::Http("model POST returned 503".to_string())),
            Ok(ScriptedModel::completion(MODEL_CONTENT)),
        ]),
    )
    .await;

    h.queue
        .enqueue(TagJobPayload::new("r1", Trigger::Event))
        .await
        .unwrap();

    // First delivery fails transiently and is rescheduled with backoff.
    assert!(h.worker.process_next_job().await.unwrap());
    {
        let retries = h.queue.retries.lock().unwrap();
        assert_eq!(retries.len(), 1);
        assert_eq!(retries[0].1, 500);
    }
    let failed = h.publisher.events_named("tagging.failed");
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].payload["transient"], true);

    // Redelivery succeeds.
    assert!(h.worker.process_next_job().await.unwrap());
    assert_eq!(h.queue.completed.lock().unwrap().len(), 1);
    assert_eq!(h.publisher.events_named("tagging.completed").len(), 1);

    let run = h.store.latest_successful_run("r1").await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Succeeded);

    // Both deliveries were audited on the same job.
    let job = h.store.list_recent_jobs(1).await.unwrap().remove(0);
    assert_eq!(job.runs, 2);
}

#[tokio::test]
async fn transient_failures_exhaust_after_max_attempts() {
    let h = harness(
        metadata(Some("https://git.example/r1.git")),
        ScriptedModel::new(vec![
            Err(AppError::Http("503".to_string())),
            Err(AppError::Http("503".to_string())),
            Err(AppError::Http("503".to_string())),
        ]),
    )
    .await;

    h.queue
        .enqueue(TagJobPayload::new("r1", Trigger::Event))
        .await
        .unwrap();

    for _ in 0..3 {
        assert!(h.worker.process_next_job().await.unwrap());
    }

    assert_eq!(h.queue.exhausted.lock().unwrap().len(), 1);
    assert_eq!(h.queue.waiting_len(), 0);
    assert_eq!(h.publisher.events_named("tagging.failed").len(), 3);

    let job = h.store.list_recent_jobs(1).await.unwrap().remove(0);
    assert_eq!(job.runs, 3);
    assert!(h.store.latest_successful_run("r1").await.unwrap().is_none());
}

#[tokio::test]
async fn explorer_outage_falls_back_to_checkout_walk() {
    let pool_model = ScriptedModel::new(vec![Ok(ScriptedModel::completion(MODEL_CONTENT))]);
    let mut h = harness(metadata(Some("https://git.example/r1.git")), pool_model).await;

    // Replace the explorer with a failing one and seed the checkout dir.
    let failing = Arc::new(MockExplorer {
        fail_search: true,
        ..Default::default()
    });
    std::fs::write(h._workdir.path().join("lib.rs"), "pub fn lib() {}").unwrap();

    let time: Arc<dyn TimeProvider> = Arc::new(MutableTime::new(1_000_000));
    let deps = WorkerDeps {
        queue: h.queue.clone(),
        store: h.store.clone(),
        catalog: h.catalog.clone(),
        explorer: failing.clone(),
        model: h.model.clone(),
        checkout: Arc::new(FixedCheckout::new(h._workdir.path())),
        prompt: Arc::new(PromptTemplate::new(h._template.path())),
        notifier: Arc::new(Notifier::new(h.publisher.clone(), None, time.clone())),
        time_provider: time,
    };
    h.worker = TagWorker::new(deps);

    h.queue
        .enqueue(TagJobPayload::new("r1", Trigger::Scheduler))
        .await
        .unwrap();
    assert!(h.worker.process_next_job().await.unwrap());

    // The sampled snippet came from the walked checkout.
    let run = h.store.latest_successful_run("r1").await.unwrap().unwrap();
    assert!(run.prompt.as_deref().unwrap().contains("pub fn lib()"));
}
