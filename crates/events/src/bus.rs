//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`LockEventBus`] is the publish/subscribe hub for lock lifecycle events.
//! The lock manager publishes strictly after its storage transaction has
//! committed, in commit order; subscribers therefore never observe a lock
//! that was rolled back. Delivery is best-effort: a full buffer drops the
//! oldest events and slow receivers observe `RecvError::Lagged`.

use serde::Serialize;
use tokio::sync::broadcast;

use davlock_core::ActiveLock;

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// LockEvent
// ---------------------------------------------------------------------------

/// A committed lock lifecycle transition.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LockEvent {
    /// A new lock was granted and committed.
    Added(ActiveLock),
    /// A lock left the active set: explicit `UNLOCK` or expiry.
    Released(ActiveLock),
}

impl LockEvent {
    /// The lock the event is about.
    pub fn lock(&self) -> &ActiveLock {
        match self {
            Self::Added(lock) | Self::Released(lock) => lock,
        }
    }
}

// ---------------------------------------------------------------------------
// LockEventBus
// ---------------------------------------------------------------------------

/// In-process fan-out bus for [`LockEvent`]s.
///
/// Handlers must not call back into the publishing lock manager
/// synchronously; they receive on their own task.
pub struct LockEventBus {
    sender: broadcast::Sender<LockEvent>,
}

impl LockEventBus {
    /// Create a bus with a specific channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If nobody is subscribed the event is silently dropped.
    pub fn publish(&self, event: LockEvent) {
        // The SendError only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<LockEvent> {
        self.sender.subscribe()
    }
}

impl Default for LockEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
