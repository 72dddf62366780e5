//! Lock manager that dispatches to the configured provider.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use drivetree_core::config::lock::LockConfig;
use drivetree_core::error::AppError;
use drivetree_core::result::AppResult;
use drivetree_core::traits::lock::{LockMode, LockProvider};

/// Lock manager that wraps the configured lock provider.
///
/// The provider is selected at construction time based on configuration.
#[derive(Debug, Clone)]
pub struct LockManager {
    inner: Arc<dyn LockProvider>,
}

impl LockManager {
    /// Create a new lock manager from configuration.
    pub async fn new(config: &LockConfig) -> AppResult<Self> {
        let inner: Arc<dyn LockProvider> = match config.provider.as_str() {
            #[cfg(feature = "redis-backend")]
            "redis" => {
                info!("Initializing Redis lock provider");
                let client = crate::redis::RedisClient::connect(&config.redis).await?;
                Arc::new(crate::redis::RedisLockProvider::new(
                    client,
                    Duration::from_millis(config.redis.poll_interval_ms),
                ))
            }
            #[cfg(feature = "memory")]
            "memory" => {
                info!("Initializing in-memory lock provider");
                Arc::new(crate::memory::MemoryLockProvider::new())
            }
            other => {
                return Err(AppError::configuration(format!(
                    "Unknown lock provider: '{other}'. Supported: memory, redis"
                )));
            }
        };

        Ok(Self { inner })
    }

    /// Create a lock manager from an existing provider (for testing).
    pub fn from_provider(provider: Arc<dyn LockProvider>) -> Self {
        Self { inner: provider }
    }

    /// Get a reference to the inner provider.
    pub fn provider(&self) -> &dyn LockProvider {
        self.inner.as_ref()
    }
}

#[async_trait]
impl LockProvider for LockManager {
    fn provider_type(&self) -> &str {
        self.inner.provider_type()
    }

    async fn try_acquire(
        &self,
        key: &str,
        mode: LockMode,
        owner: &str,
        lease: Duration,
    ) -> AppResult<bool> {
        self.inner.try_acquire(key, mode, owner, lease).await
    }

    async fn release(&self, key: &str, mode: LockMode, owner: &str) -> AppResult<bool> {
        self.inner.release(key, mode, owner).await
    }

    async fn renew(
        &self,
        key: &str,
        mode: LockMode,
        owner: &str,
        lease: Duration,
    ) -> AppResult<bool> {
        self.inner.renew(key, mode, owner, lease).await
    }

    async fn health_check(&self) -> AppResult<bool> {
        self.inner.health_check().await
    }

    fn poll_interval(&self) -> Duration {
        self.inner.poll_interval()
    }

    async fn acquire(
        &self,
        key: &str,
        mode: LockMode,
        owner: &str,
        lease: Duration,
        wait: Duration,
    ) -> AppResult<bool> {
        self.inner.acquire(key, mode, owner, lease, wait).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_provider_from_config() {
        let manager = LockManager::new(&LockConfig::default()).await.unwrap();
        assert_eq!(manager.provider_type(), "memory");
        assert!(manager.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_provider_rejected() {
        let config = LockConfig {
            provider: "zookeeper".into(),
            ..LockConfig::default()
        };
        let err = LockManager::new(&config).await.unwrap_err();
        assert_eq!(err.kind, drivetree_core::ErrorKind::Configuration);
    }
}
