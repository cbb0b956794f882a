//! Outbound seam to the backing file system.
//!
//! The locking core never reads resource bodies; it only asks whether a path
//! currently maps to anything and, if so, what its entity tag is. Conditional
//! `If` evaluation and refresh are the sole callers.

use async_trait::async_trait;

use crate::error::LockError;

/// Outcome of resolving a path against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceLookup {
    /// Nothing is mapped at the path.
    Missing,
    /// The path resolves to a live entry. Stores that do not version their
    /// entries report `entity_tag: None`.
    Found { entity_tag: Option<String> },
}

/// Read-only view of the resource store backing the locked tree.
#[async_trait]
pub trait DavFileSystem: Send + Sync {
    /// Resolve `path` and report the entry's entity tag.
    async fn select(&self, path: &str) -> Result<ResourceLookup, LockError>;
}
