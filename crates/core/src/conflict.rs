//! Share-mode conflict analysis.
//!
//! Given the locks found around a requested scope, decide which of them deny
//! the request. An exclusive request tolerates nothing; a shared request
//! tolerates other shared locks regardless of their position in the
//! hierarchy.

use crate::types::{ActiveLock, LockShareMode, LockStatus};

/// Filter a [`LockStatus`] down to the locks that conflict with a request of
/// the given share mode. Bucket positions are preserved so the caller can
/// report exactly where the denial came from.
pub fn conflicting_locks(status: &LockStatus, requested: LockShareMode) -> LockStatus {
    let denies = |lock: &&ActiveLock| match requested {
        LockShareMode::Exclusive => true,
        LockShareMode::Shared => lock.share_mode == LockShareMode::Exclusive,
    };

    LockStatus {
        reference_locks: status.reference_locks.iter().filter(denies).cloned().collect(),
        parent_locks: status.parent_locks.iter().filter(denies).cloned().collect(),
        child_locks: status.child_locks.iter().filter(denies).cloned().collect(),
    }
}
