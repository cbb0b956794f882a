//! Storage backends for the davlock locking core.
//!
//! The lock manager talks to storage exclusively through the
//! [`LockStore`] / [`LockTransaction`] contract defined here:
//!
//! - [`MemoryLockStore`] — serialized in-process backend, the reference
//!   implementation and the test workhorse.
//! - [`SqliteLockStore`] — durable backend over `sqlx`/SQLite.

pub mod memory;
pub mod sqlite;
pub mod transaction;

pub use memory::MemoryLockStore;
pub use sqlite::SqliteLockStore;
pub use transaction::{LockStore, LockTransaction, StoreError};
