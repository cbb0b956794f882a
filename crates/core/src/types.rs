//! Lock records and the closed wire enumerations.
//!
//! [`ActiveLock`] is an immutable value: a refresh never mutates a stored
//! record, it produces a copy with updated timestamps via
//! [`ActiveLock::refreshed`]. The authoritative set of active locks lives
//! behind the storage backend; values here are freely cloneable snapshots.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LockError;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

// ---------------------------------------------------------------------------
// Wire enumerations
// ---------------------------------------------------------------------------

/// Lock scope per RFC 4918 §6.2: `exclusive` or `shared`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockShareMode {
    Exclusive,
    Shared,
}

impl LockShareMode {
    /// Parse an RFC keyword, case-insensitively.
    pub fn parse(value: &str) -> Result<Self, LockError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "exclusive" => Ok(Self::Exclusive),
            "shared" => Ok(Self::Shared),
            other => Err(LockError::Protocol(format!(
                "Unknown lock scope keyword: {other:?}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exclusive => "exclusive",
            Self::Shared => "shared",
        }
    }
}

/// Lock type per RFC 4918 §7. Only `write` locks exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockAccessType {
    Write,
}

impl LockAccessType {
    /// Parse an RFC keyword, case-insensitively.
    pub fn parse(value: &str) -> Result<Self, LockError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "write" => Ok(Self::Write),
            other => Err(LockError::Protocol(format!(
                "Unknown lock type keyword: {other:?}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Write => "write",
        }
    }
}

// ---------------------------------------------------------------------------
// LockRequest
// ---------------------------------------------------------------------------

/// Parameters of a lock acquisition, as decoded from a `LOCK` request.
#[derive(Debug, Clone)]
pub struct LockRequest {
    /// Resource path; trailing `/` present iff the target is known to be a
    /// collection.
    pub path: String,
    /// `true` for a depth-infinity lock, `false` for depth 0.
    pub recursive: bool,
    /// Opaque client-supplied principal fragment from the lock body.
    pub owner: Option<String>,
    pub access_type: LockAccessType,
    pub share_mode: LockShareMode,
    /// Requested lifetime, before rounding and clamping.
    pub timeout: Duration,
}

// ---------------------------------------------------------------------------
// ActiveLock
// ---------------------------------------------------------------------------

/// A currently-held lock.
///
/// Invariants enforced at construction:
/// - `path` is non-empty,
/// - `timeout` is non-zero,
/// - `issued_at <= last_refreshed_at`.
///
/// `state_token` uniqueness across the active set is the storage backend's
/// responsibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveLock {
    /// Canonical path of the locked resource. Collections end in `/`.
    pub path: String,
    /// Client-visible href, preserved verbatim for responses.
    pub href: String,
    pub recursive: bool,
    pub owner: Option<String>,
    pub access_type: LockAccessType,
    pub share_mode: LockShareMode,
    /// Lifetime after rounding.
    pub timeout: Duration,
    pub issued_at: Timestamp,
    /// Equals `issued_at` until the first refresh.
    pub last_refreshed_at: Timestamp,
    /// The RFC 4918 lock token. Never changes across refreshes.
    pub state_token: String,
}

impl ActiveLock {
    /// Construct a freshly issued lock, validating the record invariants.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        path: impl Into<String>,
        href: impl Into<String>,
        recursive: bool,
        owner: Option<String>,
        access_type: LockAccessType,
        share_mode: LockShareMode,
        timeout: Duration,
        issued_at: Timestamp,
        state_token: impl Into<String>,
    ) -> Result<Self, LockError> {
        let path = path.into();
        if path.is_empty() {
            return Err(LockError::Protocol("Lock path must not be empty".into()));
        }
        if timeout.is_zero() {
            return Err(LockError::Protocol("Lock timeout must be positive".into()));
        }
        Ok(Self {
            path,
            href: href.into(),
            recursive,
            owner,
            access_type,
            share_mode,
            timeout,
            issued_at,
            last_refreshed_at: issued_at,
            state_token: state_token.into(),
        })
    }

    /// The instant at which this lock lapses unless refreshed.
    pub fn expires_at(&self) -> Timestamp {
        self.last_refreshed_at + chrono::Duration::seconds(self.timeout.as_secs() as i64)
    }

    /// `true` once the deadline has passed at `now`.
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.expires_at() <= now
    }

    /// Produce the refreshed copy of this lock.
    ///
    /// Identity fields (`state_token`, `issued_at`, scope, owner) are kept;
    /// only `last_refreshed_at` and `timeout` change.
    pub fn refreshed(&self, now: Timestamp, timeout: Duration) -> Self {
        Self {
            timeout,
            last_refreshed_at: now.max(self.last_refreshed_at),
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// LockStatus
// ---------------------------------------------------------------------------

/// Active locks found around a query path, grouped by the scope comparator.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LockStatus {
    /// Locks at exactly the query path.
    pub reference_locks: Vec<ActiveLock>,
    /// Depth-infinity locks on an ancestor of the query path.
    pub parent_locks: Vec<ActiveLock>,
    /// Locks below the query path (only populated for subtree queries).
    pub child_locks: Vec<ActiveLock>,
}

impl LockStatus {
    pub fn is_empty(&self) -> bool {
        self.reference_locks.is_empty()
            && self.parent_locks.is_empty()
            && self.child_locks.is_empty()
    }

    /// Flatten in the order parents, references, children.
    pub fn all(self) -> Vec<ActiveLock> {
        let mut out = self.parent_locks;
        out.extend(self.reference_locks);
        out.extend(self.child_locks);
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn instant() -> Timestamp {
        chrono::Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn sample_lock() -> ActiveLock {
        ActiveLock::new(
            "/docs/",
            "/docs/",
            true,
            Some("<D:href>alice</D:href>".into()),
            LockAccessType::Write,
            LockShareMode::Exclusive,
            Duration::from_secs(60),
            instant(),
            "opaquelocktoken:abc",
        )
        .unwrap()
    }

    #[test]
    fn share_mode_parse_is_case_insensitive() {
        assert_eq!(
            LockShareMode::parse("Exclusive").unwrap(),
            LockShareMode::Exclusive
        );
        assert_eq!(
            LockShareMode::parse(" SHARED ").unwrap(),
            LockShareMode::Shared
        );
    }

    #[test]
    fn share_mode_parse_rejects_unknown_keyword() {
        let err = LockShareMode::parse("advisory").unwrap_err();
        assert!(matches!(err, LockError::Protocol(_)));
    }

    #[test]
    fn access_type_parse_accepts_write_only() {
        assert_eq!(
            LockAccessType::parse("WRITE").unwrap(),
            LockAccessType::Write
        );
        assert!(LockAccessType::parse("read").is_err());
    }

    #[test]
    fn new_lock_rejects_empty_path() {
        let result = ActiveLock::new(
            "",
            "/x",
            false,
            None,
            LockAccessType::Write,
            LockShareMode::Shared,
            Duration::from_secs(1),
            instant(),
            "t",
        );
        assert!(result.is_err());
    }

    #[test]
    fn new_lock_rejects_zero_timeout() {
        let result = ActiveLock::new(
            "/x",
            "/x",
            false,
            None,
            LockAccessType::Write,
            LockShareMode::Shared,
            Duration::ZERO,
            instant(),
            "t",
        );
        assert!(result.is_err());
    }

    #[test]
    fn expiry_is_last_refresh_plus_timeout() {
        let lock = sample_lock();
        assert_eq!(
            lock.expires_at(),
            instant() + chrono::Duration::seconds(60)
        );
        assert!(!lock.is_expired_at(instant() + chrono::Duration::seconds(59)));
        assert!(lock.is_expired_at(instant() + chrono::Duration::seconds(60)));
    }

    #[test]
    fn refreshed_copy_keeps_identity_fields() {
        let lock = sample_lock();
        let later = instant() + chrono::Duration::seconds(30);
        let renewed = lock.refreshed(later, Duration::from_secs(120));

        assert_eq!(renewed.state_token, lock.state_token);
        assert_eq!(renewed.issued_at, lock.issued_at);
        assert_eq!(renewed.last_refreshed_at, later);
        assert_eq!(renewed.timeout, Duration::from_secs(120));
        assert_eq!(renewed.expires_at(), later + chrono::Duration::seconds(120));
        // The original value is untouched.
        assert_eq!(lock.timeout, Duration::from_secs(60));
    }

    #[test]
    fn refreshed_copy_never_moves_backwards() {
        let lock = sample_lock();
        let earlier = instant() - chrono::Duration::seconds(10);
        let renewed = lock.refreshed(earlier, Duration::from_secs(60));
        assert_eq!(renewed.last_refreshed_at, lock.last_refreshed_at);
    }

    #[test]
    fn active_lock_serializes_for_subscribers() {
        let json = serde_json::to_value(sample_lock()).unwrap();
        assert_eq!(json["path"], "/docs/");
        assert_eq!(json["share_mode"], "exclusive");
        assert_eq!(json["access_type"], "write");
        assert_eq!(json["state_token"], "opaquelocktoken:abc");
    }

    #[test]
    fn status_all_orders_parents_first() {
        let status = LockStatus {
            reference_locks: vec![sample_lock()],
            parent_locks: vec![{
                let mut l = sample_lock();
                l.path = "/".into();
                l.state_token = "opaquelocktoken:parent".into();
                l
            }],
            child_locks: vec![{
                let mut l = sample_lock();
                l.path = "/docs/a".into();
                l.state_token = "opaquelocktoken:child".into();
                l
            }],
        };
        let flat = status.all();
        assert_eq!(flat.len(), 3);
        assert_eq!(flat[0].path, "/");
        assert_eq!(flat[1].path, "/docs/");
        assert_eq!(flat[2].path, "/docs/a");
    }
}
