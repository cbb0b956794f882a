//! Lock manager tunables.

use std::time::Duration;

use davlock_core::{LockUrlResolver, TimeRounding};

/// Default capacity of the lifecycle event channel.
const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Default cap on granted lock lifetimes: one week. `Timeout: Infinite`
/// resolves to this.
const DEFAULT_MAX_TIMEOUT_SECS: u64 = 7 * 24 * 3600;

/// Configuration for a [`LockManager`](crate::LockManager).
#[derive(Clone)]
pub struct LockManagerConfig {
    /// Buffer size of the broadcast event channel.
    pub event_capacity: usize,
    /// Upper bound on granted lock lifetimes.
    pub max_timeout: Duration,
    /// Rounding applied to issue instants and timeouts.
    pub rounding: TimeRounding,
    /// Canonical URL resolution, including any server-installed rewrite.
    pub resolver: LockUrlResolver,
}

impl LockManagerConfig {
    /// Defaults with environment overrides applied:
    ///
    /// | Variable                   | Default  | Meaning                      |
    /// |----------------------------|----------|------------------------------|
    /// | `DAVLOCK_EVENT_CAPACITY`   | `256`    | Event channel buffer size    |
    /// | `DAVLOCK_MAX_TIMEOUT_SECS` | `604800` | Cap on lock lifetimes (secs) |
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(capacity) = std::env::var("DAVLOCK_EVENT_CAPACITY")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.event_capacity = capacity;
        }
        if let Some(secs) = std::env::var("DAVLOCK_MAX_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.max_timeout = Duration::from_secs(secs);
        }
        config
    }
}

impl Default for LockManagerConfig {
    fn default() -> Self {
        Self {
            event_capacity: DEFAULT_EVENT_CAPACITY,
            max_timeout: Duration::from_secs(DEFAULT_MAX_TIMEOUT_SECS),
            rounding: TimeRounding::default(),
            resolver: LockUrlResolver::new(),
        }
    }
}
