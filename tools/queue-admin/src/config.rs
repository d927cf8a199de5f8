//! Admin tool configuration loaded from environment variables.

use anyhow::Context as _;

use paynotify_queue::domain::types::LockThreshold;

/// Loaded from env vars after `dotenv::dotenv().ok()`.
#[derive(Debug)]
pub struct AdminConfig {
    /// PostgreSQL connection URL (`DATABASE_URL`). Required.
    pub database_url: String,

    /// Directory service base URL (`DIRECTORY_URL`). Only `deliver` needs it.
    pub directory_url: Option<String>,

    /// Lock threshold used by `maintain` and `deliver` (`QUEUE_MAX_LOCK_COUNT`).
    /// default: `3`
    pub max_lock_count: i32,
}

impl AdminConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?,
            directory_url: std::env::var("DIRECTORY_URL").ok(),
            max_lock_count: std::env::var("QUEUE_MAX_LOCK_COUNT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(LockThreshold::DEFAULT),
        })
    }
}
