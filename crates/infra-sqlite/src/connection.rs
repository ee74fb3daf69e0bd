// Audit Database Pool

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tagsmith_core::config::SqlitePoolConfig;
use tagsmith_core::error::{AppError, Result};

/// Open the audit database with WAL journaling and foreign keys enforced.
/// Pool tuning comes in through [`SqlitePoolConfig`] so the daemon and
/// CLI share one place that knows about the environment.
pub async fn create_pool(database_path: &str, tuning: &SqlitePoolConfig) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_path)
        .map_err(|e| AppError::Database(format!("invalid database path {database_path}: {e}")))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(tuning.busy_timeout_secs))
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(tuning.max_connections)
        .connect_with(options)
        .await
        .map_err(|e| AppError::Database(format!("cannot open {database_path}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_in_memory_database() {
        let pool = create_pool("sqlite::memory:", &SqlitePoolConfig::default())
            .await
            .unwrap();
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn foreign_keys_are_enforced() {
        let pool = create_pool("sqlite::memory:", &SqlitePoolConfig::default())
            .await
            .unwrap();
        let enabled: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(enabled, 1);
    }
}
