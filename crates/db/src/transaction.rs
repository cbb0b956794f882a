//! The transaction contract every lock storage backend must satisfy.
//!
//! A transaction is an atomic read-mutate-commit unit over the active-lock
//! set. Backends must provide read-your-writes inside a transaction and
//! linearizable visibility between committed transactions; dropping a
//! transaction without calling [`LockTransaction::commit`] discards every
//! staged mutation.

use async_trait::async_trait;

use davlock_core::ActiveLock;

/// Failures originating in a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage failure: {0}")]
    Backend(String),
}

/// Handle to a lock storage backend.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Open a transaction over the active-lock set.
    async fn begin(&self) -> Result<Box<dyn LockTransaction>, StoreError>;
}

/// One open transaction.
///
/// All reads observe the transaction's own staged mutations. Two concurrent
/// exclusive acquires over the same scope cannot both commit: the backend's
/// concurrency control serializes them, so the later one observes the
/// earlier one's lock.
#[async_trait]
pub trait LockTransaction: Send {
    /// Every lock currently active, in a stable order.
    async fn get_active_locks(&mut self) -> Result<Vec<ActiveLock>, StoreError>;

    /// Insert a lock. Returns `false` without mutating anything when the
    /// state token is already taken.
    async fn add(&mut self, lock: &ActiveLock) -> Result<bool, StoreError>;

    /// Replace the lock with the same state token, inserting if absent.
    /// Returns `true` iff an existing record was replaced.
    async fn update(&mut self, lock: &ActiveLock) -> Result<bool, StoreError>;

    /// Delete by state token. Returns `true` iff a record was present.
    async fn remove(&mut self, state_token: &str) -> Result<bool, StoreError>;

    /// Look up a single lock by state token.
    async fn get(&mut self, state_token: &str) -> Result<Option<ActiveLock>, StoreError>;

    /// Atomically publish every staged mutation.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
