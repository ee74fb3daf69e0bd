//! Tagsmith Daemon - Main Entry Point
//! Wires the audit store, queue, collaborator clients, admission,
//! scheduler, worker pool, and read API into one process.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tagsmith_api_http::{router, ApiState};
use tagsmith_core::application::admission::EventAdmission;
use tagsmith_core::application::backfill::BackfillScheduler;
use tagsmith_core::application::notifier::Notifier;
use tagsmith_core::application::pipeline::{Shutdown, TagWorker, WorkerDeps};
use tagsmith_core::application::prompt::PromptTemplate;
use tagsmith_core::config::{Config, SqlitePoolConfig};
use tagsmith_core::port::time_provider::SystemTimeProvider;
use tagsmith_core::port::{TimeProvider, WebhookSink};
use tagsmith_infra_http::{HttpCatalogClient, HttpFileExplorerClient, HttpModelClient, HttpWebhookSink};
use tagsmith_infra_redis::{RedisEventBus, RedisEventSubscriber, RedisJobQueue};
use tagsmith_infra_sqlite::{create_pool, run_migrations, SqliteAuditStore};
use tagsmith_infra_system::GitCheckoutManager;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Logging: pretty for development, JSON for production.
    let log_format = std::env::var("TAGSMITH_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .expect("Failed to create env filter");

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }

    info!("Tagsmith v{} starting...", VERSION);

    // 2. Configuration.
    let config = Config::from_env().map_err(|e| anyhow::anyhow!("Config error: {e}"))?;

    // 3. Audit store.
    info!(db_path = %config.database_path, "Initializing audit store...");
    if let Some(parent) = std::path::Path::new(&config.database_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let pool = create_pool(&config.database_path, &SqlitePoolConfig::from_env())
        .await
        .map_err(|e| anyhow::anyhow!("DB pool creation failed: {e}"))?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {e}"))?;

    // 4. Dependency wiring.
    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let store = Arc::new(SqliteAuditStore::new(pool.clone(), time_provider.clone()));

    let queue = Arc::new(
        RedisJobQueue::connect(&config.redis_url, time_provider.clone())
            .await
            .map_err(|e| anyhow::anyhow!("Redis queue connect failed: {e}"))?,
    );
    let bus = Arc::new(
        RedisEventBus::connect(&config.redis_url, config.events_channel.clone())
            .await
            .map_err(|e| anyhow::anyhow!("Redis bus connect failed: {e}"))?,
    );
    let subscriber = RedisEventSubscriber::new(&config.redis_url, config.events_channel.clone())
        .map_err(|e| anyhow::anyhow!("Redis subscriber setup failed: {e}"))?;

    let catalog = Arc::new(HttpCatalogClient::new(
        config.catalog_base_url.clone(),
        config.catalog_token.clone(),
    ));
    let explorer = Arc::new(HttpFileExplorerClient::new(
        config.file_explorer_base_url.clone(),
        config.file_explorer_token.clone(),
    ));
    let model = Arc::new(HttpModelClient::new(
        config.ai_connector_base_url.clone(),
        config.ai_connector_model.clone(),
    ));
    let checkout = Arc::new(GitCheckoutManager::new(config.workspace_root.clone()));
    let prompt = Arc::new(PromptTemplate::new(config.prompt_template_path.clone()));

    let webhook: Option<Arc<dyn WebhookSink>> = config
        .webhook_url
        .as_ref()
        .map(|url| Arc::new(HttpWebhookSink::new(url.clone())) as Arc<dyn WebhookSink>);
    let notifier = Arc::new(Notifier::new(bus.clone(), webhook, time_provider.clone()));

    let shutdown = Shutdown::new();

    // 5. Event admission subscriber.
    let admission = Arc::new(EventAdmission::new(store.clone(), queue.clone()));
    let subscriber_shutdown = shutdown.clone();
    let subscriber_handle = tokio::spawn(async move {
        subscriber.run(admission, subscriber_shutdown).await;
    });

    // 6. Backfill scheduler.
    let scheduler = Arc::new(BackfillScheduler::new(
        catalog.clone(),
        store.clone(),
        queue.clone(),
        Duration::from_secs(config.schedule_interval_hours * 3600),
    ));
    let scheduler_shutdown = shutdown.clone();
    let scheduler_handle = tokio::spawn(async move {
        scheduler.run(scheduler_shutdown).await;
    });

    // 7. Worker pool.
    info!(concurrency = config.concurrency, "Starting workers...");
    let deps = WorkerDeps {
        queue: queue.clone(),
        store: store.clone(),
        catalog: catalog.clone(),
        explorer,
        model,
        checkout,
        prompt,
        notifier,
        time_provider: time_provider.clone(),
    };
    let mut worker_handles = Vec::with_capacity(config.concurrency);
    for _ in 0..config.concurrency {
        let worker = TagWorker::new(deps.clone());
        let worker_shutdown = shutdown.clone();
        worker_handles.push(tokio::spawn(async move {
            worker.run(worker_shutdown).await;
        }));
    }

    // 8. Read API.
    let state = ApiState {
        store: store.clone(),
        queue: queue.clone(),
    };
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!(port = config.port, "Read API listening");
    let mut api_shutdown = shutdown.clone();
    let api_handle = tokio::spawn(async move {
        let result = axum::serve(listener, router(state))
            .with_graceful_shutdown(async move { api_shutdown.wait().await })
            .await;
        if let Err(e) = result {
            error!(error = %e, "Read API server failed");
        }
    });

    info!("System ready. Waiting for events...");

    // 9. Wait for shutdown signal.
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully...");

    // 10. Graceful shutdown: stop intake first, then let in-flight jobs
    // finish inside the grace window. Jobs that do not finish stay in the
    // queue and are redelivered on restart.
    shutdown.signal();
    let _ = tokio::time::timeout(SHUTDOWN_GRACE, subscriber_handle).await;
    for handle in worker_handles {
        let _ = tokio::time::timeout(SHUTDOWN_GRACE, handle).await;
    }
    let _ = tokio::time::timeout(SHUTDOWN_GRACE, scheduler_handle).await;
    let _ = tokio::time::timeout(SHUTDOWN_GRACE, api_handle).await;

    info!("Shutdown complete.");
    Ok(())
}
