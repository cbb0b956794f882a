use std::fmt;

/// Errors surfaced by the locking core.
///
/// Domain outcomes that a WebDAV handler must translate into a response body
/// (lock conflicts, unknown tokens, range mismatches) are modelled as result
/// enums on the individual operations, not as errors.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Malformed wire input: an `If` header, a share/access keyword, or a
    /// `Timeout` value that does not follow RFC 4918.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Propagated from the storage backend. The caller may retry; no partial
    /// state has been published.
    #[error("Backend failure: {0}")]
    Backend(String),

    /// Cooperative cancellation observed at a suspension point.
    #[error("Operation cancelled")]
    Cancelled,
}

impl LockError {
    /// Wrap any displayable backend error.
    pub fn backend(err: impl fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}
