// Service Configuration (environment-driven)

use crate::error::{AppError, Result};

/// Full service configuration, read once at process start. Paths with a
/// leading `~` are expanded; everything else is taken verbatim.
#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    pub events_channel: String,
    pub catalog_base_url: String,
    pub catalog_token: String,
    pub file_explorer_base_url: String,
    pub file_explorer_token: Option<String>,
    pub ai_connector_base_url: String,
    pub ai_connector_model: String,
    pub workspace_root: String,
    pub concurrency: usize,
    pub prompt_template_path: String,
    pub webhook_url: Option<String>,
    pub database_path: String,
    pub port: u16,
    pub schedule_interval_hours: u64,
}

fn get(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn get_str(key: &str, default: &str) -> String {
    get(key).unwrap_or_else(|| default.to_string())
}

fn get_usize(key: &str, default: usize) -> usize {
    get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn get_u32(key: &str, default: u32) -> u32 {
    get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn get_u16(key: &str, default: u16) -> u16 {
    get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn get_u64(key: &str, default: u64) -> u64 {
    get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn expand_path(raw: &str) -> String {
    shellexpand::tilde(raw).into_owned()
}

/// Audit database pool tuning. `Default` is fixed values for tests;
/// `from_env` honors `TAGSMITH_POOL_SIZE` and `TAGSMITH_POOL_TIMEOUT`.
#[derive(Debug, Clone)]
pub struct SqlitePoolConfig {
    pub max_connections: u32,
    pub busy_timeout_secs: u64,
}

impl Default for SqlitePoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            busy_timeout_secs: 5,
        }
    }
}

impl SqlitePoolConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_connections: get_u32("TAGSMITH_POOL_SIZE", defaults.max_connections),
            busy_timeout_secs: get_u64("TAGSMITH_POOL_TIMEOUT", defaults.busy_timeout_secs),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let concurrency = get_usize("TAGGING_CONCURRENCY", 2);
        if concurrency == 0 {
            return Err(AppError::Config(
                "TAGGING_CONCURRENCY must be at least 1".to_string(),
            ));
        }

        Ok(Config {
            redis_url: get_str("REDIS_URL", "redis://127.0.0.1:6379"),
            events_channel: get_str("REDIS_EVENTS_CHANNEL", "apphub:events"),
            catalog_base_url: get_str("CATALOG_BASE_URL", "http://127.0.0.1:4000"),
            catalog_token: get_str("CATALOG_TOKEN", ""),
            file_explorer_base_url: get_str("FILE_EXPLORER_BASE_URL", "http://127.0.0.1:4300"),
            file_explorer_token: get("FILE_EXPLORER_TOKEN"),
            ai_connector_base_url: get_str("AI_CONNECTOR_BASE_URL", "http://127.0.0.1:4200"),
            ai_connector_model: get_str("AI_CONNECTOR_MODEL", "gpt-4o-mini"),
            workspace_root: expand_path(&get_str("WORKSPACE_ROOT", "./workspace")),
            concurrency,
            prompt_template_path: expand_path(&get_str(
                "TAGGING_PROMPT_TEMPLATE_PATH",
                "templates/tagging-prompt.txt",
            )),
            webhook_url: get("WEBHOOK_URL"),
            database_path: expand_path(&get_str("DATABASE_PATH", "~/.tagsmith/audit.db")),
            port: get_u16("PORT", 4410),
            schedule_interval_hours: get_u64("SCHEDULE_INTERVAL_HOURS", 6),
        })
    }
}
