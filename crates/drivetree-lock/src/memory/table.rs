//! In-process read/write lock table.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Notify;
use tracing::debug;

use drivetree_core::result::AppResult;
use drivetree_core::traits::lock::{LockMode, LockProvider};

/// Longest a waiter sleeps before re-checking, so expired leases are noticed
/// even when nobody releases.
const EXPIRY_RECHECK: Duration = Duration::from_millis(50);

#[derive(Debug)]
struct Grant {
    count: u32,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct KeyState {
    writers: HashMap<String, Grant>,
    readers: HashMap<String, Grant>,
}

impl KeyState {
    /// Drop lapsed grants. Returns `true` if anything was dropped.
    fn purge_expired(&mut self, now: Instant) -> bool {
        let before = self.writers.len() + self.readers.len();
        self.writers.retain(|_, g| g.expires_at > now);
        self.readers.retain(|_, g| g.expires_at > now);
        before != self.writers.len() + self.readers.len()
    }

    fn is_empty(&self) -> bool {
        self.writers.is_empty() && self.readers.is_empty()
    }

    fn side(&mut self, mode: LockMode) -> &mut HashMap<String, Grant> {
        match mode {
            LockMode::Shared => &mut self.readers,
            LockMode::Exclusive => &mut self.writers,
        }
    }

    /// Grant rules: readers share unless another owner writes; a writer
    /// needs every other owner gone and may not upgrade its own read.
    fn can_grant(&self, mode: LockMode, owner: &str) -> bool {
        let other_writer = self.writers.keys().any(|o| o != owner);
        match mode {
            LockMode::Shared => !other_writer,
            LockMode::Exclusive => {
                let other_reader = self.readers.keys().any(|o| o != owner);
                let owns_write = self.writers.contains_key(owner);
                let owns_read = self.readers.contains_key(owner);
                !other_writer && !other_reader && (owns_write || !owns_read)
            }
        }
    }
}

/// In-process lock provider.
///
/// Waiters are woken by a shared [`Notify`] on every release, and re-check
/// at least every [`EXPIRY_RECHECK`] to observe lapsed leases.
#[derive(Debug, Clone, Default)]
pub struct MemoryLockProvider {
    table: Arc<DashMap<String, KeyState>>,
    released: Arc<Notify>,
}

impl MemoryLockProvider {
    /// Create an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys with at least one live grant.
    pub fn held_keys(&self) -> usize {
        let now = Instant::now();
        self.table
            .iter()
            .filter(|entry| {
                entry.writers.values().any(|g| g.expires_at > now)
                    || entry.readers.values().any(|g| g.expires_at > now)
            })
            .count()
    }

    /// Whether `owner` currently holds `mode` on `key`.
    pub fn is_held_by(&self, key: &str, mode: LockMode, owner: &str) -> bool {
        let now = Instant::now();
        self.table
            .get(key)
            .map(|state| {
                let side = match mode {
                    LockMode::Shared => &state.readers,
                    LockMode::Exclusive => &state.writers,
                };
                side.get(owner).is_some_and(|g| g.expires_at > now)
            })
            .unwrap_or(false)
    }

    fn grant(&self, key: &str, mode: LockMode, owner: &str, lease: Duration) -> bool {
        let now = Instant::now();
        let mut entry = self.table.entry(key.to_string()).or_default();
        let state = entry.value_mut();
        if state.purge_expired(now) {
            debug!(key, "Dropped expired lock grants");
            self.released.notify_waiters();
        }
        if !state.can_grant(mode, owner) {
            return false;
        }
        let grant = state.side(mode).entry(owner.to_string()).or_insert(Grant {
            count: 0,
            expires_at: now,
        });
        grant.count += 1;
        grant.expires_at = now + lease;
        true
    }
}

#[async_trait]
impl LockProvider for MemoryLockProvider {
    fn provider_type(&self) -> &str {
        "memory"
    }

    async fn try_acquire(
        &self,
        key: &str,
        mode: LockMode,
        owner: &str,
        lease: Duration,
    ) -> AppResult<bool> {
        Ok(self.grant(key, mode, owner, lease))
    }

    async fn release(&self, key: &str, mode: LockMode, owner: &str) -> AppResult<bool> {
        let (released, now_empty) = match self.table.get_mut(key) {
            Some(mut state) => {
                let side = state.side(mode);
                let released = match side.get_mut(owner) {
                    Some(grant) => {
                        grant.count -= 1;
                        true
                    }
                    None => false,
                };
                if side.get(owner).is_some_and(|g| g.count == 0) {
                    side.remove(owner);
                }
                (released, state.is_empty())
            }
            None => (false, false),
        };
        if now_empty {
            self.table.remove_if(key, |_, state| state.is_empty());
        }
        if released {
            self.released.notify_waiters();
        }
        Ok(released)
    }

    async fn renew(
        &self,
        key: &str,
        mode: LockMode,
        owner: &str,
        lease: Duration,
    ) -> AppResult<bool> {
        let now = Instant::now();
        let Some(mut state) = self.table.get_mut(key) else {
            return Ok(false);
        };
        match state.side(mode).get_mut(owner) {
            Some(grant) if grant.expires_at > now => {
                grant.expires_at = now + lease;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }

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
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.grant(key, mode, owner, lease) {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            let nap = (deadline - now).min(EXPIRY_RECHECK);
            let _ = tokio::time::timeout(nap, notified).await;
        }
    }
}
