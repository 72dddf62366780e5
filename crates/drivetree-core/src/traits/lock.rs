//! Lock provider trait for named, mode-aware, reentrant locks.

use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::result::AppResult;

/// Which side of a read/write lock is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum LockMode {
    /// Read side. Any number of owners may hold it together.
    Shared,
    /// Write side. Held by a single owner, excludes all readers.
    Exclusive,
}

impl LockMode {
    /// Short tag used in logs and backend encodings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shared => "r",
            Self::Exclusive => "w",
        }
    }
}

impl std::fmt::Display for LockMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shared => write!(f, "shared"),
            Self::Exclusive => write!(f, "exclusive"),
        }
    }
}

/// Trait for lock backends (in-process or Redis).
///
/// Locks are addressed by a string key and held on behalf of an opaque
/// owner token. The same owner may take the same side of a key more than
/// once; each grant must be matched by a release. Every grant is a lease
/// that expires unless renewed, so a crashed holder never strands a key.
#[async_trait]
pub trait LockProvider: Send + Sync + std::fmt::Debug + 'static {
    /// Return the provider type name (e.g., "memory", "redis").
    fn provider_type(&self) -> &str;

    /// Try to take one side of `key` without waiting.
    /// Returns `true` if the lock was granted.
    async fn try_acquire(
        &self,
        key: &str,
        mode: LockMode,
        owner: &str,
        lease: Duration,
    ) -> AppResult<bool>;

    /// Release one grant of `key` held by `owner`.
    /// Returns `false` if `owner` did not hold that side.
    async fn release(&self, key: &str, mode: LockMode, owner: &str) -> AppResult<bool>;

    /// Extend the lease of a grant held by `owner`.
    /// Returns `false` if the grant is no longer held.
    async fn renew(
        &self,
        key: &str,
        mode: LockMode,
        owner: &str,
        lease: Duration,
    ) -> AppResult<bool>;

    /// Check that the lock backend is reachable.
    async fn health_check(&self) -> AppResult<bool>;

    /// Pause between polls of a contended key in the default [`acquire`](Self::acquire).
    fn poll_interval(&self) -> Duration {
        Duration::from_millis(25)
    }

    /// Take one side of `key`, waiting at most `wait` for it to become free.
    /// Returns `false` if the wait elapsed without a grant.
    async fn acquire(
        &self,
        key: &str,
        mode: LockMode,
        owner: &str,
        lease: Duration,
        wait: Duration,
    ) -> AppResult<bool> {
        let deadline = Instant::now() + wait;
        loop {
            if self.try_acquire(key, mode, owner, lease).await? {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(self.poll_interval().min(deadline - now)).await;
        }
    }
}
