//! Domain model for the davlock WebDAV locking core.
//!
//! This crate is deliberately pure: it holds the value types and decision
//! logic that every other crate in the workspace builds on, with no storage
//! or runtime dependencies.
//!
//! - [`types`] — the [`ActiveLock`] record, share/access enums, lock status.
//! - [`url`] — canonical lock URLs and the four-valued scope comparator.
//! - [`ifheader`] — the `If` request header model, parser, and evaluator.
//! - [`conflict`] — share-mode conflict filtering over a [`LockStatus`].
//! - [`clock`] — the injectable wall clock and timestamp/timeout rounding.
//! - [`timeout`] — `Timeout` header values (`Second-<n>` / `Infinite`).
//! - [`fs`] — the outbound file-system seam used for entity-tag lookups.

pub mod clock;
pub mod conflict;
pub mod error;
pub mod fs;
pub mod ifheader;
pub mod timeout;
pub mod types;
pub mod url;

pub use clock::{Clock, SystemClock, TimeRounding};
pub use error::LockError;
pub use fs::{DavFileSystem, ResourceLookup};
pub use ifheader::{IfCondition, IfHeader, IfList, IfOperand};
pub use types::{ActiveLock, LockAccessType, LockRequest, LockShareMode, LockStatus, Timestamp};
pub use url::{LockUrlResolver, UrlComparison};
