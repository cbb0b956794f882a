//! Expiration actor.
//!
//! A single background task owns the deadline queue. The manager never
//! touches the queue directly; it sends `watch`/`unwatch` messages through a
//! [`CleanupHandle`], and the actor re-enters the manager through its
//! expiration release path so every eviction goes through the normal
//! transactional flow. The actor holds only a `Weak` reference to the
//! manager: only the manager deletes locks, and dropping the manager stops
//! the actor.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use davlock_core::{ActiveLock, Timestamp};

use crate::manager::LockManager;

/// Fallback sleep while the queue is empty; recomputed as soon as a message
/// arrives, so the exact value is irrelevant.
const IDLE_SLEEP: Duration = Duration::from_secs(3600);

/// Delay before retrying an eviction whose transaction failed.
const RETRY_DELAY_SECS: i64 = 5;

pub(crate) enum CleanupCommand {
    Watch(ActiveLock),
    Unwatch(String),
}

/// Message-passing handle to the expiration actor.
///
/// Both operations are idempotent: watching an already-watched token moves
/// its deadline, unwatching an unknown token is a no-op.
#[derive(Debug, Clone)]
pub struct CleanupHandle {
    tx: mpsc::UnboundedSender<CleanupCommand>,
}

impl CleanupHandle {
    /// Arm (or re-arm) the expiry timer for a lock.
    pub(crate) fn watch(&self, lock: ActiveLock) {
        let _ = self.tx.send(CleanupCommand::Watch(lock));
    }

    /// Disarm the expiry timer for a token.
    pub(crate) fn unwatch(&self, state_token: &str) {
        let _ = self
            .tx
            .send(CleanupCommand::Unwatch(state_token.to_string()));
    }
}

pub(crate) fn channel() -> (CleanupHandle, mpsc::UnboundedReceiver<CleanupCommand>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CleanupHandle { tx }, rx)
}

/// Spawn the actor task.
pub(crate) fn spawn(
    manager: Weak<LockManager>,
    rx: mpsc::UnboundedReceiver<CleanupCommand>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(ExpirationQueue::default().run(manager, rx, cancel))
}

// ---------------------------------------------------------------------------
// ExpirationQueue
// ---------------------------------------------------------------------------

/// Deadline bookkeeping owned by the actor task.
///
/// `watched` is authoritative; the heap may carry superseded entries which
/// are pruned lazily when they reach the head.
#[derive(Default)]
struct ExpirationQueue {
    deadlines: BinaryHeap<Reverse<(Timestamp, String)>>,
    watched: HashMap<String, Timestamp>,
}

impl ExpirationQueue {
    fn arm(&mut self, state_token: String, at: Timestamp) {
        self.watched.insert(state_token.clone(), at);
        self.deadlines.push(Reverse((at, state_token)));
    }

    /// Drop heap heads that no longer reflect `watched`.
    fn prune_stale(&mut self) {
        loop {
            let stale = match self.deadlines.peek() {
                Some(Reverse((at, token))) => self.watched.get(token) != Some(at),
                None => false,
            };
            if !stale {
                break;
            }
            self.deadlines.pop();
        }
    }

    fn next_deadline(&mut self) -> Option<Timestamp> {
        self.prune_stale();
        self.deadlines.peek().map(|Reverse((at, _))| *at)
    }

    /// Pop the next entry that is due at `now`, if any.
    fn pop_due(&mut self, now: Timestamp) -> Option<(Timestamp, String)> {
        self.prune_stale();
        let due = matches!(self.deadlines.peek(), Some(Reverse((at, _))) if *at <= now);
        if !due {
            return None;
        }
        let Reverse((at, token)) = self.deadlines.pop()?;
        self.watched.remove(&token);
        Some((at, token))
    }

    async fn run(
        mut self,
        manager: Weak<LockManager>,
        mut rx: mpsc::UnboundedReceiver<CleanupCommand>,
        cancel: CancellationToken,
    ) {
        loop {
            let sleep_for = match self.next_deadline() {
                Some(at) => {
                    let Some(mgr) = manager.upgrade() else { return };
                    Some(duration_until(mgr.clock_now(), at))
                }
                None => None,
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Expiration actor cancelled");
                    return;
                }
                command = rx.recv() => match command {
                    Some(CleanupCommand::Watch(lock)) => {
                        self.arm(lock.state_token.clone(), lock.expires_at());
                    }
                    Some(CleanupCommand::Unwatch(token)) => {
                        self.watched.remove(&token);
                    }
                    // All handles dropped; the manager is gone.
                    None => return,
                },
                _ = tokio::time::sleep(sleep_for.unwrap_or(IDLE_SLEEP)), if sleep_for.is_some() => {
                    let Some(mgr) = manager.upgrade() else { return };
                    self.evict_due(&mgr).await;
                }
            }
        }
    }

    /// Release every due lock, re-checking expiry against the manager's
    /// clock so a racing refresh simply re-arms the timer.
    async fn evict_due(&mut self, manager: &Arc<LockManager>) {
        let now = manager.clock_now();
        while let Some((_, token)) = self.pop_due(now) {
            match manager.release_expired(&token).await {
                Ok(Some(still_live)) => {
                    self.arm(still_live.state_token.clone(), still_live.expires_at());
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(error = %e, token = %token, "Failed to evict expired lock");
                    self.arm(token, now + chrono::Duration::seconds(RETRY_DELAY_SECS));
                }
            }
        }
    }
}

fn duration_until(now: Timestamp, at: Timestamp) -> Duration {
    (at - now).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> Timestamp {
        chrono::Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn pop_due_returns_earliest_first() {
        let mut queue = ExpirationQueue::default();
        queue.arm("t:late".into(), at(200));
        queue.arm("t:early".into(), at(100));

        assert_eq!(queue.pop_due(at(150)).unwrap().1, "t:early");
        assert!(queue.pop_due(at(150)).is_none());
        assert_eq!(queue.pop_due(at(300)).unwrap().1, "t:late");
    }

    #[test]
    fn rearming_supersedes_the_old_deadline() {
        let mut queue = ExpirationQueue::default();
        queue.arm("t:1".into(), at(100));
        queue.arm("t:1".into(), at(500));

        // The old entry is stale and must not fire.
        assert!(queue.pop_due(at(200)).is_none());
        assert_eq!(queue.next_deadline(), Some(at(500)));
        assert_eq!(queue.pop_due(at(500)).unwrap().1, "t:1");
    }

    #[test]
    fn unwatch_is_idempotent() {
        let mut queue = ExpirationQueue::default();
        queue.arm("t:1".into(), at(100));
        queue.watched.remove("t:1");
        queue.watched.remove("t:1");

        assert_eq!(queue.next_deadline(), None);
        assert!(queue.pop_due(at(900)).is_none());
    }
}
