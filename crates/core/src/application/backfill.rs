// Backfill Scheduler - periodic catalog sweep for missed events

use crate::application::pipeline::Shutdown;
use crate::domain::{TagJobPayload, Trigger};
use crate::error::Result;
use crate::port::{AuditStore, CatalogClient, EnqueueOutcome, JobQueue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info};

/// Successful runs inside this window suppress scheduler enqueues. Wider
/// than the event window so the backstop never races fresh event work.
pub const BACKFILL_RECENCY_WINDOW_MS: i64 = 24 * 60 * 60 * 1000;

const PAGE_SIZE: i64 = 50;
const INGEST_READY: &str = "ready";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillStats {
    pub seen: u64,
    pub enqueued: u64,
    pub suppressed: u64,
}

/// Periodically pages through the catalog and enqueues repositories that
/// lost their event. One cycle at startup, then every `interval`; a cycle
/// still in flight when the timer fires is skipped.
pub struct BackfillScheduler {
    catalog: Arc<dyn CatalogClient>,
    store: Arc<dyn AuditStore>,
    queue: Arc<dyn JobQueue>,
    interval: Duration,
    running: AtomicBool,
}

impl BackfillScheduler {
    pub fn new(
        catalog: Arc<dyn CatalogClient>,
        store: Arc<dyn AuditStore>,
        queue: Arc<dyn JobQueue>,
        interval: Duration,
    ) -> Self {
        Self {
            catalog,
            store,
            queue,
            interval,
            running: AtomicBool::new(false),
        }
    }

    /// Scheduler loop; spawn with `tokio::spawn`.
    pub async fn run(self: Arc<Self>, mut shutdown: Shutdown) {
        info!(interval_secs = self.interval.as_secs(), "Backfill scheduler started");

        self.tick().await;

        let mut timer = interval(self.interval);
        timer.tick().await; // first tick resolves immediately
        loop {
            tokio::select! {
                _ = timer.tick() => self.tick().await,
                _ = shutdown.wait() => {
                    info!("Backfill scheduler shutting down");
                    break;
                }
            }
        }
    }

    async fn tick(&self) {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Backfill cycle already in progress, skipping tick");
            return;
        }

        match self.run_cycle().await {
            Ok(stats) => info!(
                seen = stats.seen,
                enqueued = stats.enqueued,
                suppressed = stats.suppressed,
                "Backfill cycle completed"
            ),
            Err(e) => error!(error = %e, "Backfill cycle failed"),
        }

        self.running.store(false, Ordering::SeqCst);
    }

    /// One full sweep over the catalog listing.
    pub async fn run_cycle(&self) -> Result<BackfillStats> {
        let mut stats = BackfillStats::default();
        let mut page = 1_i64;

        loop {
            let summaries = self.catalog.list_repositories(page, PAGE_SIZE).await?;
            let page_len = summaries.len();

            for summary in summaries {
                let Some(repository_id) = summary.id else {
                    continue;
                };
                if let Some(status) = &summary.ingest_status {
                    if status != INGEST_READY {
                        continue;
                    }
                }
                stats.seen += 1;

                if self
                    .store
                    .has_recent_successful_run(&repository_id, BACKFILL_RECENCY_WINDOW_MS)
                    .await?
                {
                    stats.suppressed += 1;
                    continue;
                }

                let payload = TagJobPayload::new(&repository_id, Trigger::Scheduler);
                match self.queue.enqueue(payload).await? {
                    EnqueueOutcome::Enqueued(_) => stats.enqueued += 1,
                    EnqueueOutcome::Duplicate(_) => stats.suppressed += 1,
                }
            }

            if (page_len as i64) < PAGE_SIZE {
                break;
            }
            page += 1;
        }

        Ok(stats)
    }
}
