//! In-memory lock storage.
//!
//! A [`MemoryLockStore`] transaction takes the single store mutex for its
//! whole lifetime, so transactions are strictly serialized: the second
//! `begin` suspends until the first transaction commits or is dropped.
//! Mutations are staged on a working copy and swapped in on commit, which
//! makes rollback-on-drop free.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use davlock_core::ActiveLock;

use crate::transaction::{LockStore, LockTransaction, StoreError};

/// Token-keyed in-process lock set.
#[derive(Debug, Default, Clone)]
pub struct MemoryLockStore {
    state: Arc<Mutex<HashMap<String, ActiveLock>>>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn begin(&self) -> Result<Box<dyn LockTransaction>, StoreError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction { guard, working }))
    }
}

/// Transaction over a working copy; the held guard serializes writers.
struct MemoryTransaction {
    guard: OwnedMutexGuard<HashMap<String, ActiveLock>>,
    working: HashMap<String, ActiveLock>,
}

#[async_trait]
impl LockTransaction for MemoryTransaction {
    async fn get_active_locks(&mut self) -> Result<Vec<ActiveLock>, StoreError> {
        let mut locks: Vec<ActiveLock> = self.working.values().cloned().collect();
        locks.sort_by(|a, b| (&a.path, &a.state_token).cmp(&(&b.path, &b.state_token)));
        Ok(locks)
    }

    async fn add(&mut self, lock: &ActiveLock) -> Result<bool, StoreError> {
        if self.working.contains_key(&lock.state_token) {
            return Ok(false);
        }
        self.working.insert(lock.state_token.clone(), lock.clone());
        Ok(true)
    }

    async fn update(&mut self, lock: &ActiveLock) -> Result<bool, StoreError> {
        let replaced = self
            .working
            .insert(lock.state_token.clone(), lock.clone())
            .is_some();
        Ok(replaced)
    }

    async fn remove(&mut self, state_token: &str) -> Result<bool, StoreError> {
        Ok(self.working.remove(state_token).is_some())
    }

    async fn get(&mut self, state_token: &str) -> Result<Option<ActiveLock>, StoreError> {
        Ok(self.working.get(state_token).cloned())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        *self.guard = std::mem::take(&mut self.working);
        Ok(())
    }
}
