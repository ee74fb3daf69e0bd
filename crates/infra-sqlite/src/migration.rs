// Schema Migrations
//
// Migrations are a static, version-ordered table of embedded SQL files.
// The runner owns all bookkeeping: it creates `schema_version`, applies
// each pending step inside one transaction, and records the step's
// version in that same transaction, so a crash mid-migration leaves the
// schema at the last fully-applied version.

use sqlx::SqlitePool;
use tagsmith_core::error::{AppError, Result};
use tracing::info;

struct Migration {
    version: i64,
    label: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    label: "initial audit schema",
    sql: include_str!("../migrations/001_initial_schema.sql"),
}];

fn db_err(e: sqlx::Error) -> AppError {
    AppError::Database(e.to_string())
}

/// Bring the database up to the latest schema version.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await
    .map_err(db_err)?;

    let applied: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await
        .map_err(db_err)?;
    let applied = applied.unwrap_or(0);

    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > applied).collect();
    if pending.is_empty() {
        info!(version = applied, "Schema up to date");
        return Ok(());
    }

    for migration in pending {
        info!(
            version = migration.version,
            label = migration.label,
            "Applying migration"
        );

        let mut tx = pool.begin().await.map_err(db_err)?;
        for statement in statements(migration.sql) {
            sqlx::query(&statement).execute(&mut *tx).await.map_err(|e| {
                AppError::Database(format!("migration {} failed: {e}", migration.version))
            })?;
        }
        sqlx::query(
            "INSERT INTO schema_version (version, applied_at)
             VALUES (?, strftime('%s', 'now') * 1000)",
        )
        .bind(migration.version)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
    }

    Ok(())
}

/// Split a migration file into executable statements. Comment lines are
/// stripped up front so a `;` only ever terminates a real statement.
fn statements(sql: &str) -> Vec<String> {
    let body: Vec<&str> = sql
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect();
    body.join("\n")
        .split(';')
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .map(str::to_string)
        .collect()
}
