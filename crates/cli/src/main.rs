//! Tagsmith CLI - manual enqueue and inspection

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tagsmith_core::config::{Config, SqlitePoolConfig};
use tagsmith_core::domain::{TagJobPayload, Trigger};
use tagsmith_core::port::time_provider::SystemTimeProvider;
use tagsmith_core::port::{AuditStore, EnqueueOutcome, JobQueue, TimeProvider};
use tagsmith_infra_redis::RedisJobQueue;
use tagsmith_infra_sqlite::{create_pool, run_migrations, SqliteAuditStore};

#[derive(Parser)]
#[command(name = "tagsmith", about = "Repository tagging service operator CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue a tagging job for one repository
    Enqueue {
        repository_id: String,
        /// Free-form note recorded on the job payload
        #[arg(long)]
        reason: Option<String>,
    },
    /// Show queue counts and job totals
    Status,
    /// List recent jobs
    Recent {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("warn").init();

    let cli = Cli::parse();
    let config = Config::from_env().map_err(|e| anyhow::anyhow!("Config error: {e}"))?;
    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);

    match cli.command {
        Commands::Enqueue {
            repository_id,
            reason,
        } => {
            let queue = RedisJobQueue::connect(&config.redis_url, time_provider)
                .await
                .map_err(|e| anyhow::anyhow!("Redis connect failed: {e}"))?;

            let mut payload = TagJobPayload::new(&repository_id, Trigger::Manual);
            if let Some(reason) = reason {
                payload = payload.with_reason(reason);
            }

            match queue.enqueue(payload).await? {
                EnqueueOutcome::Enqueued(id) => {
                    println!("enqueued {repository_id} as {id}");
                }
                EnqueueOutcome::Duplicate(id) => {
                    println!("{repository_id} already queued as {id}");
                }
            }
        }
        Commands::Status => {
            let queue = RedisJobQueue::connect(&config.redis_url, time_provider.clone())
                .await
                .map_err(|e| anyhow::anyhow!("Redis connect failed: {e}"))?;
            let counts = queue.counts().await?;
            println!(
                "queue: waiting={} delayed={} completed={} failed={}",
                counts.waiting, counts.delayed, counts.completed, counts.failed
            );

            let pool = create_pool(&config.database_path, &SqlitePoolConfig::from_env())
                .await
                .map_err(|e| anyhow::anyhow!("DB open failed: {e}"))?;
            run_migrations(&pool)
                .await
                .map_err(|e| anyhow::anyhow!("Migration failed: {e}"))?;
            let store = SqliteAuditStore::new(pool, time_provider);
            println!("jobs: {}", store.count_jobs().await?);
        }
        Commands::Recent { limit } => {
            let pool = create_pool(&config.database_path, &SqlitePoolConfig::from_env())
                .await
                .map_err(|e| anyhow::anyhow!("DB open failed: {e}"))?;
            run_migrations(&pool)
                .await
                .map_err(|e| anyhow::anyhow!("Migration failed: {e}"))?;
            let store = SqliteAuditStore::new(pool, time_provider);

            for job in store.list_recent_jobs(limit).await? {
                println!(
                    "#{:<5} {:<40} {:<9} runs={} last_run_at={}",
                    job.id,
                    job.repository_id,
                    job.status.to_string(),
                    job.runs,
                    job.last_run_at
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                );
            }
        }
    }

    Ok(())
}
