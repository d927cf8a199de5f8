use std::time::Duration;

use paynotify_domain::channel::{Channel, ParseChannelError};

use crate::domain::types::LockThreshold;
use crate::worker::WorkerSchedule;

/// Queue worker configuration loaded from environment variables.
#[derive(Debug)]
pub struct QueueConfig {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Base URL of the directory service (orders, contacts, profiles).
    pub directory_url: String,
    /// TCP port for the health endpoints (default 3114). Env var: `QUEUE_PORT`.
    pub queue_port: u16,
    /// Env var: `QUEUE_MAX_LOCK_COUNT` (default 3).
    pub max_lock_count: i32,
    /// Env var: `QUEUE_DELIVERY_INTERVAL_SECS` (default 300).
    pub delivery_interval: Duration,
    /// Env var: `QUEUE_MAINTENANCE_INTERVAL_SECS` (default 600).
    pub maintenance_interval: Duration,
    /// Comma-separated channel codes. Env var: `QUEUE_CHANNELS` (default all).
    pub channels: Vec<Channel>,
}

impl QueueConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL").expect("DATABASE_URL"),
            directory_url: std::env::var("DIRECTORY_URL").expect("DIRECTORY_URL"),
            queue_port: std::env::var("QUEUE_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3114),
            max_lock_count: std::env::var("QUEUE_MAX_LOCK_COUNT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(LockThreshold::DEFAULT),
            delivery_interval: Duration::from_secs(
                std::env::var("QUEUE_DELIVERY_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(300),
            ),
            maintenance_interval: Duration::from_secs(
                std::env::var("QUEUE_MAINTENANCE_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(600),
            ),
            channels: parse_channels(std::env::var("QUEUE_CHANNELS").ok().as_deref())
                .expect("QUEUE_CHANNELS"),
        }
    }

    pub fn schedule(&self) -> WorkerSchedule {
        WorkerSchedule {
            channels: self.channels.clone(),
            delivery_interval: self.delivery_interval,
            maintenance_interval: self.maintenance_interval,
        }
    }
}

/// Parse a comma-separated channel list. Unset or blank selects every channel.
pub fn parse_channels(raw: Option<&str>) -> Result<Vec<Channel>, ParseChannelError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(Channel::ALL.to_vec());
    };
    let mut channels: Vec<Channel> = Vec::new();
    for code in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let channel = code.parse::<Channel>()?;
        if !channels.contains(&channel) {
            channels.push(channel);
        }
    }
    Ok(channels)
}
