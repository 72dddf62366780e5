//! Lock provider configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Top-level lock configuration.
#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
pub struct LockConfig {
    /// Lock provider type: `"memory"` (single process) or `"redis"` (shared).
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Upper bound for acquiring a whole combined lock, in milliseconds.
    #[serde(default = "default_acquire_timeout")]
    #[validate(range(min = 1))]
    pub acquire_timeout_ms: u64,
    /// Wait budget per member lock within one acquisition attempt, in milliseconds.
    #[serde(default = "default_attempt_wait")]
    #[validate(range(min = 1))]
    pub attempt_wait_ms: u64,
    /// Pause between a failed attempt and the next, in milliseconds.
    #[serde(default = "default_retry_interval")]
    pub retry_interval_ms: u64,
    /// Lease length of every held lock, in seconds. Renewed while held.
    #[serde(default = "default_lease")]
    #[validate(range(min = 1))]
    pub lease_seconds: u64,
    /// Redis-specific configuration.
    #[serde(default)]
    pub redis: RedisLockConfig,
}

impl LockConfig {
    /// Acquisition timeout as a [`Duration`].
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Per-lock attempt wait as a [`Duration`].
    pub fn attempt_wait(&self) -> Duration {
        Duration::from_millis(self.attempt_wait_ms)
    }

    /// Retry pause as a [`Duration`].
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    /// Lease length as a [`Duration`].
    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_seconds)
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            acquire_timeout_ms: default_acquire_timeout(),
            attempt_wait_ms: default_attempt_wait(),
            retry_interval_ms: default_retry_interval(),
            lease_seconds: default_lease(),
            redis: RedisLockConfig::default(),
        }
    }
}

/// Redis lock backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisLockConfig {
    /// Redis connection URL.
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Key prefix prepended to every lock key.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Poll interval while waiting on a contended key, in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for RedisLockConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            key_prefix: default_key_prefix(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

fn default_provider() -> String {
    "memory".to_string()
}

fn default_acquire_timeout() -> u64 {
    30_000
}

fn default_attempt_wait() -> u64 {
    200
}

fn default_retry_interval() -> u64 {
    20
}

fn default_lease() -> u64 {
    30
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_key_prefix() -> String {
    "drivetree:".to_string()
}

fn default_poll_interval() -> u64 {
    25
}
