//! Redis connection management.

use redis::Client;
use redis::aio::ConnectionManager;
use tracing::info;

use drivetree_core::config::lock::RedisLockConfig;
use drivetree_core::error::{AppError, ErrorKind};
use drivetree_core::result::AppResult;

/// Redis client wrapper with connection management.
#[derive(Clone)]
pub struct RedisClient {
    /// Reconnecting multiplexed connection.
    conn: ConnectionManager,
    /// Prefix prepended to every lock key.
    key_prefix: String,
}

impl std::fmt::Debug for RedisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisClient")
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}

impl RedisClient {
    /// Connect using the `[lock.redis]` section.
    pub async fn connect(config: &RedisLockConfig) -> AppResult<Self> {
        info!(url = %mask_redis_url(&config.url), "Connecting to Redis lock backend");

        let client = Client::open(config.url.as_str()).map_err(|e| {
            AppError::with_source(ErrorKind::Lock, "Invalid Redis connection URL", e)
        })?;

        let conn = ConnectionManager::new(client).await.map_err(|e| {
            AppError::with_source(ErrorKind::Lock, "Failed to connect to Redis", e)
        })?;

        Ok(Self {
            conn,
            key_prefix: config.key_prefix.clone(),
        })
    }

    /// A handle to the shared connection.
    pub fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }

    /// Build a full key with the configured prefix.
    pub fn prefixed_key(&self, key: &str) -> String {
        format!("{}{key}", self.key_prefix)
    }
}

/// Hide the password of a Redis URL for logging.
fn mask_redis_url(url: &str) -> String {
    let Some(at) = url.rfind('@') else {
        return url.to_string();
    };
    let authority_start = url.find("://").map(|p| p + 3).unwrap_or(0);
    match url[authority_start..at].rfind(':') {
        Some(colon) => format!(
            "{}:****{}",
            &url[..authority_start + colon],
            &url[at..]
        ),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_redis_url() {
        assert_eq!(
            mask_redis_url("redis://:hunter2@cache:6379/0"),
            "redis://:****@cache:6379/0"
        );
        assert_eq!(
            mask_redis_url("redis://localhost:6379"),
            "redis://localhost:6379"
        );
    }
}
