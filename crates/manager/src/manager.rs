//! The lock manager: acquire, release, enumerate, expire.
//!
//! Every operation runs inside one storage transaction; the conflict check,
//! record construction, and insert of an acquisition are never split across
//! transactions. Post-commit work (expiry timers, event publication) is
//! best-effort and never undoes a commit.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use davlock_core::conflict::conflicting_locks;
use davlock_core::url::{self, UrlComparison};
use davlock_core::{
    ActiveLock, Clock, LockError, LockRequest, LockStatus, LockUrlResolver, TimeRounding,
    Timestamp,
};
use davlock_db::{LockStore, LockTransaction};
use davlock_events::{LockEvent, LockEventBus};

use crate::cleanup::{self, CleanupHandle};
use crate::config::LockManagerConfig;

/// Outcome of an explicit lock acquisition.
#[derive(Debug)]
pub enum LockResult {
    Granted(ActiveLock),
    /// The locks that denied the request, grouped by position.
    Conflict(LockStatus),
}

/// Outcome of a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    /// No active lock carries the presented token.
    NoLock,
    /// The token is active but the request path does not reference the
    /// lock's own URL.
    InvalidLockRange,
}

// ---------------------------------------------------------------------------
// LockManager
// ---------------------------------------------------------------------------

/// Grants, refreshes, releases, and expires advisory locks over a
/// hierarchical resource tree.
///
/// Created once via [`LockManager::start`]; the returned `Arc` is cheap to
/// clone into request handlers.
pub struct LockManager {
    store: Arc<dyn LockStore>,
    clock: Arc<dyn Clock>,
    bus: LockEventBus,
    resolver: LockUrlResolver,
    rounding: TimeRounding,
    max_timeout: Duration,
    cleanup: CleanupHandle,
    cancel: CancellationToken,
}

impl LockManager {
    /// Spawn the expiration actor and reconcile persisted state.
    ///
    /// Reconciliation enumerates the committed lock set, evicts anything
    /// already past its deadline, and re-arms the expiry queue for the rest,
    /// so a restart after a crash or cancelled shutdown converges.
    pub async fn start(
        store: Arc<dyn LockStore>,
        clock: Arc<dyn Clock>,
        config: LockManagerConfig,
    ) -> Result<Arc<Self>, LockError> {
        let cancel = CancellationToken::new();
        let (handle, rx) = cleanup::channel();

        let manager = Arc::new(Self {
            store,
            clock,
            bus: LockEventBus::new(config.event_capacity),
            resolver: config.resolver,
            rounding: config.rounding,
            max_timeout: config.max_timeout,
            cleanup: handle,
            cancel: cancel.clone(),
        });

        let _actor = cleanup::spawn(Arc::downgrade(&manager), rx, cancel.child_token());
        manager.reconcile().await?;
        Ok(manager)
    }

    /// Subscribe to lifecycle events. Events are published strictly after
    /// the corresponding transaction commits, in commit order.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<LockEvent> {
        self.bus.subscribe()
    }

    /// Stop the expiration actor. In-flight operations are unaffected.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    // ── Acquire ───────────────────────────────────────────────────────

    /// Try to acquire the requested lock.
    pub async fn lock(
        &self,
        request: &LockRequest,
        cancel: &CancellationToken,
    ) -> Result<LockResult, LockError> {
        let mut tx = self.begin(cancel).await?;
        let result = self.lock_in(&mut tx, request, cancel).await?;

        match result {
            StagedLock::Conflict(status) => {
                tracing::debug!(
                    path = %request.path,
                    conflicts = status.clone().all().len(),
                    "Lock request denied by active locks"
                );
                Ok(LockResult::Conflict(status))
            }
            StagedLock::Staged(lock) => {
                self.checked(cancel)?;
                tx.commit().await.map_err(LockError::backend)?;
                self.after_added(&lock);
                Ok(LockResult::Granted(lock))
            }
        }
    }

    /// Run the conflict check and stage the new record inside `tx`.
    ///
    /// Shared with implicit acquisition so both paths stay atomic within a
    /// single transaction.
    pub(crate) async fn lock_in(
        &self,
        tx: &mut Box<dyn LockTransaction>,
        request: &LockRequest,
        cancel: &CancellationToken,
    ) -> Result<StagedLock, LockError> {
        self.checked(cancel)?;
        let locks = tx.get_active_locks().await.map_err(LockError::backend)?;

        let request_url = self.resolver.url_for(&request.path);
        let related = self.relate(&locks, &request_url, request.recursive, true);
        let conflicts = conflicting_locks(&related, request.share_mode);
        if !conflicts.is_empty() {
            return Ok(StagedLock::Conflict(conflicts));
        }

        let lock = self.build_lock(request)?;
        self.checked(cancel)?;
        if !tx.add(&lock).await.map_err(LockError::backend)? {
            // v4 tokens colliding means something is deeply wrong upstream.
            return Err(LockError::Backend(format!(
                "state token already active: {}",
                lock.state_token
            )));
        }
        Ok(StagedLock::Staged(lock))
    }

    // ── Release ───────────────────────────────────────────────────────

    /// Release the lock carrying `state_token`, presented against `path`.
    ///
    /// The lock's URL (with the lock's own depth) is compared against the
    /// request path taken as depth 0; only an exact reference releases. A
    /// token for a deep-locked ancestor therefore cannot be released by
    /// naming a descendant.
    pub async fn release(
        &self,
        path: &str,
        state_token: &str,
        cancel: &CancellationToken,
    ) -> Result<ReleaseOutcome, LockError> {
        let mut tx = self.begin(cancel).await?;

        self.checked(cancel)?;
        let Some(lock) = tx.get(state_token).await.map_err(LockError::backend)? else {
            return Ok(ReleaseOutcome::NoLock);
        };

        let lock_url = self.resolver.url_for(&lock.path);
        let request_url = self.resolver.url_for(path);
        if url::compare(&lock_url, lock.recursive, &request_url, false) != UrlComparison::Reference
        {
            return Ok(ReleaseOutcome::InvalidLockRange);
        }

        self.checked(cancel)?;
        tx.remove(state_token).await.map_err(LockError::backend)?;
        tx.commit().await.map_err(LockError::backend)?;

        self.cleanup.unwatch(state_token);
        tracing::info!(token = %state_token, path = %lock.path, "Lock released");
        self.bus.publish(LockEvent::Released(lock));
        Ok(ReleaseOutcome::Released)
    }

    // ── Queries ───────────────────────────────────────────────────────

    /// All committed active locks.
    pub async fn get_locks(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<ActiveLock>, LockError> {
        let mut tx = self.begin(cancel).await?;
        tx.get_active_locks().await.map_err(LockError::backend)
    }

    /// Locks related to `path`, flattened parents first, then references,
    /// then children.
    pub async fn get_affected_locks(
        &self,
        path: &str,
        find_children: bool,
        find_parents: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<ActiveLock>, LockError> {
        let mut tx = self.begin(cancel).await?;
        let locks = tx.get_active_locks().await.map_err(LockError::backend)?;
        let url = self.resolver.url_for(path);
        Ok(self.relate(&locks, &url, find_children, find_parents).all())
    }

    // ── Expiry (actor re-entry) ───────────────────────────────────────

    /// Release `state_token` if its deadline has passed.
    ///
    /// Returns the lock when it turns out to be live again (a refresh
    /// committed between the timer being armed and this call) so the actor
    /// re-arms instead of evicting.
    pub(crate) async fn release_expired(
        &self,
        state_token: &str,
    ) -> Result<Option<ActiveLock>, LockError> {
        let mut tx = self.store.begin().await.map_err(LockError::backend)?;

        let Some(lock) = tx.get(state_token).await.map_err(LockError::backend)? else {
            return Ok(None);
        };
        if !lock.is_expired_at(self.clock.now()) {
            return Ok(Some(lock));
        }

        tx.remove(state_token).await.map_err(LockError::backend)?;
        tx.commit().await.map_err(LockError::backend)?;

        tracing::info!(token = %state_token, path = %lock.path, "Expired lock evicted");
        self.bus.publish(LockEvent::Released(lock));
        Ok(None)
    }

    // ── Internals ─────────────────────────────────────────────────────

    pub(crate) fn clock_now(&self) -> Timestamp {
        self.clock.now()
    }

    pub(crate) fn resolver(&self) -> &LockUrlResolver {
        &self.resolver
    }

    pub(crate) fn rounding(&self) -> TimeRounding {
        self.rounding
    }

    pub(crate) fn max_timeout(&self) -> Duration {
        self.max_timeout
    }

    pub(crate) fn cleanup(&self) -> &CleanupHandle {
        &self.cleanup
    }

    pub(crate) fn checked(&self, cancel: &CancellationToken) -> Result<(), LockError> {
        if cancel.is_cancelled() {
            Err(LockError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub(crate) async fn begin(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn LockTransaction>, LockError> {
        self.checked(cancel)?;
        self.store.begin().await.map_err(LockError::backend)
    }

    /// Bucket `locks` around `query_url` using the scope comparator.
    pub(crate) fn relate(
        &self,
        locks: &[ActiveLock],
        query_url: &str,
        with_children: bool,
        find_parents: bool,
    ) -> LockStatus {
        let mut status = LockStatus::default();
        for lock in locks {
            let lock_url = self.resolver.url_for(&lock.path);
            match url::compare(query_url, with_children, &lock_url, lock.recursive) {
                UrlComparison::Reference => status.reference_locks.push(lock.clone()),
                UrlComparison::LeftIsParent => status.child_locks.push(lock.clone()),
                UrlComparison::RightIsParent if find_parents => {
                    status.parent_locks.push(lock.clone())
                }
                _ => {}
            }
        }
        status
    }

    /// Construct the record for a granted request.
    pub(crate) fn build_lock(&self, request: &LockRequest) -> Result<ActiveLock, LockError> {
        let issued_at = self.rounding.round_timestamp(self.clock.now());
        let timeout = self
            .rounding
            .round_timeout(request.timeout.min(self.max_timeout));
        let state_token = format!("opaquelocktoken:{}", uuid::Uuid::new_v4());

        ActiveLock::new(
            url::normalize_path(&request.path),
            request.path.clone(),
            request.recursive,
            request.owner.clone(),
            request.access_type,
            request.share_mode,
            timeout,
            issued_at,
            state_token,
        )
    }

    /// Post-commit bookkeeping for a fresh lock.
    pub(crate) fn after_added(&self, lock: &ActiveLock) {
        self.cleanup.watch(lock.clone());
        tracing::info!(
            token = %lock.state_token,
            path = %lock.path,
            recursive = lock.recursive,
            share_mode = lock.share_mode.as_str(),
            timeout_secs = lock.timeout.as_secs(),
            "Lock acquired"
        );
        self.bus.publish(LockEvent::Added(lock.clone()));
    }

    /// Enumerate committed locks, evict the already-expired, re-arm the rest.
    async fn reconcile(&self) -> Result<(), LockError> {
        let mut tx = self.store.begin().await.map_err(LockError::backend)?;
        let locks = tx.get_active_locks().await.map_err(LockError::backend)?;

        let now = self.clock.now();
        let (expired, live): (Vec<_>, Vec<_>) =
            locks.into_iter().partition(|l| l.is_expired_at(now));

        if !expired.is_empty() {
            for lock in &expired {
                tx.remove(&lock.state_token)
                    .await
                    .map_err(LockError::backend)?;
            }
            tx.commit().await.map_err(LockError::backend)?;
            for lock in expired {
                tracing::info!(
                    token = %lock.state_token,
                    path = %lock.path,
                    "Expired lock evicted during reconciliation"
                );
                self.bus.publish(LockEvent::Released(lock));
            }
        }

        for lock in live {
            self.cleanup.watch(lock);
        }
        Ok(())
    }
}

/// Result of staging an acquisition inside an open transaction.
pub(crate) enum StagedLock {
    Staged(ActiveLock),
    Conflict(LockStatus),
}
