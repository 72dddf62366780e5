//! Combined lock handle and its lease watchdog.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use drivetree_core::result::AppResult;
use drivetree_core::traits::lock::{LockMode, LockProvider};

/// Every member lock of one plan, held together under one owner token.
///
/// Release with [`CombinedLock::release`]. A handle dropped while still
/// held releases in the background.
pub struct CombinedLock {
    owner: String,
    mode: LockMode,
    keys: Vec<String>,
    locks: Arc<dyn LockProvider>,
    watchdog: Option<JoinHandle<()>>,
    held: bool,
}

impl std::fmt::Debug for CombinedLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CombinedLock")
            .field("owner", &self.owner)
            .field("mode", &self.mode)
            .field("keys", &self.keys)
            .field("held", &self.held)
            .finish()
    }
}

impl CombinedLock {
    pub(crate) fn new(
        owner: String,
        mode: LockMode,
        keys: Vec<String>,
        locks: Arc<dyn LockProvider>,
        lease: Duration,
    ) -> Self {
        let watchdog = (!keys.is_empty())
            .then(|| spawn_watchdog(owner.clone(), mode, keys.clone(), locks.clone(), lease));
        Self {
            owner,
            mode,
            keys,
            locks,
            watchdog,
            held: true,
        }
    }

    /// Owner token the member locks are held under.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Side taken on every member.
    pub fn mode(&self) -> LockMode {
        self.mode
    }

    /// Member keys in acquisition order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Whether the handle still holds its members.
    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Release every member. Releasing twice is a no-op.
    ///
    /// Every member is attempted even if one fails; the first failure is
    /// returned.
    pub async fn release(&mut self) -> AppResult<()> {
        if !self.held {
            return Ok(());
        }
        self.held = false;
        if let Some(watchdog) = self.watchdog.take() {
            watchdog.abort();
        }
        release_all(self.locks.as_ref(), &self.keys, self.mode, &self.owner).await
    }
}

impl Drop for CombinedLock {
    fn drop(&mut self) {
        if !self.held {
            return;
        }
        if let Some(watchdog) = self.watchdog.take() {
            watchdog.abort();
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(owner = %self.owner, "Combined lock dropped outside a runtime; leases will lapse");
            return;
        };
        let locks = self.locks.clone();
        let keys = std::mem::take(&mut self.keys);
        let owner = std::mem::take(&mut self.owner);
        let mode = self.mode;
        runtime.spawn(async move {
            let _ = release_all(locks.as_ref(), &keys, mode, &owner).await;
        });
    }
}

/// Release `keys` in reverse acquisition order.
pub(crate) async fn release_all(
    locks: &dyn LockProvider,
    keys: &[String],
    mode: LockMode,
    owner: &str,
) -> AppResult<()> {
    let mut first_error = None;
    for key in keys.iter().rev() {
        match locks.release(key, mode, owner).await {
            Ok(true) => {}
            Ok(false) => debug!(key = %key, owner, "Lock was no longer held at release"),
            Err(e) => {
                error!(key = %key, owner, error = %e, "Failed to release lock");
                first_error.get_or_insert(e);
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Renew every member a few times per lease until aborted.
fn spawn_watchdog(
    owner: String,
    mode: LockMode,
    keys: Vec<String>,
    locks: Arc<dyn LockProvider>,
    lease: Duration,
) -> JoinHandle<()> {
    let period = (lease / 3).max(Duration::from_millis(10));
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(period).await;
            for key in &keys {
                match locks.renew(key, mode, &owner, lease).await {
                    Ok(true) => {}
                    Ok(false) => warn!(key = %key, owner = %owner, "Lock lease lapsed before renewal"),
                    Err(e) => warn!(key = %key, owner = %owner, error = %e, "Lock lease renewal failed"),
                }
            }
        }
    })
}
