//! Canonical lock URLs and the four-valued scope comparator.
//!
//! Lock scopes are compared as absolute URLs under a fixed virtual base, so
//! hierarchy questions reduce to a segment-boundary prefix relation. The
//! trailing `/` carried by collection paths is what makes that relation exact
//! at the root of each subtree.

use std::sync::Arc;

/// Virtual base prepended to every canonical path.
pub const VIRTUAL_BASE: &str = "http://localhost";

/// Deterministic, idempotent path rewrite installed by an embedding server
/// (e.g. to map a user-visible prefix onto a canonical root).
pub type RewriteFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Relation between two scoped URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlComparison {
    /// Byte-equal after normalization.
    Reference,
    /// The left URL is a strict base of the right and the left scope is
    /// recursive.
    LeftIsParent,
    /// The right URL is a strict base of the left and the right scope is
    /// recursive.
    RightIsParent,
    NoMatch,
}

// ---------------------------------------------------------------------------
// LockUrlResolver
// ---------------------------------------------------------------------------

/// Builds canonical absolute URLs for lock paths.
#[derive(Clone, Default)]
pub struct LockUrlResolver {
    rewrite: Option<RewriteFn>,
}

impl LockUrlResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a rewrite hook. The hook must be deterministic and idempotent:
    /// `rewrite(rewrite(p)) == rewrite(p)` for every normalized path `p`.
    pub fn with_rewrite(rewrite: RewriteFn) -> Self {
        Self {
            rewrite: Some(rewrite),
        }
    }

    /// Canonical absolute URL for a resource path.
    pub fn url_for(&self, path: &str) -> String {
        let normalized = normalize_path(path);
        let mapped = match &self.rewrite {
            Some(rewrite) => rewrite(&normalized),
            None => normalized,
        };
        format!("{VIRTUAL_BASE}{mapped}")
    }
}

impl std::fmt::Debug for LockUrlResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockUrlResolver")
            .field("rewrite", &self.rewrite.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// Normalize a resource path: leading `/` enforced, duplicate separators
/// collapsed. A trailing `/` is preserved, never invented; the caller is the
/// authority on whether the target is a collection.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    let mut out = String::with_capacity(trimmed.len() + 1);
    if !trimmed.starts_with('/') {
        out.push('/');
    }
    let mut prev_slash = false;
    for c in trimmed.chars() {
        if c == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        out.push(c);
    }
    out
}

/// Extract the path component of a client-supplied href.
///
/// Tagged `If` lists and `Lock-Token` style references may carry absolute
/// URIs; scope comparison only ever looks at the path under the virtual base.
pub fn path_of(href: &str) -> String {
    let href = href.trim();
    let rest = href
        .strip_prefix("https://")
        .or_else(|| href.strip_prefix("http://"));
    match rest {
        Some(after_scheme) => match after_scheme.find('/') {
            Some(idx) => normalize_path(&after_scheme[idx..]),
            None => "/".to_string(),
        },
        None => normalize_path(href),
    }
}

/// `true` if `base` is a strict URL base of `candidate` at a segment boundary.
fn is_url_base_of(base: &str, candidate: &str) -> bool {
    if candidate.len() <= base.len() || !candidate.starts_with(base) {
        return false;
    }
    base.ends_with('/') || candidate.as_bytes()[base.len()] == b'/'
}

/// Compare two scoped URLs.
///
/// 1. Byte-equal → [`UrlComparison::Reference`].
/// 2. `left` a strict base of `right` and `left_recursive` →
///    [`UrlComparison::LeftIsParent`].
/// 3. `right` a strict base of `left` and `right_recursive` →
///    [`UrlComparison::RightIsParent`].
/// 4. Otherwise [`UrlComparison::NoMatch`].
pub fn compare(
    left: &str,
    left_recursive: bool,
    right: &str,
    right_recursive: bool,
) -> UrlComparison {
    if left == right {
        UrlComparison::Reference
    } else if left_recursive && is_url_base_of(left, right) {
        UrlComparison::LeftIsParent
    } else if right_recursive && is_url_base_of(right, left) {
        UrlComparison::RightIsParent
    } else {
        UrlComparison::NoMatch
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn url(path: &str) -> String {
        LockUrlResolver::new().url_for(path)
    }

    #[test]
    fn url_for_prepends_virtual_base() {
        assert_eq!(url("/a/b"), "http://localhost/a/b");
        assert_eq!(url("a/b"), "http://localhost/a/b");
    }

    #[test]
    fn normalize_collapses_duplicate_separators() {
        assert_eq!(normalize_path("//a///b/"), "/a/b/");
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize_path("a//b");
        assert_eq!(normalize_path(&once), once);
    }

    #[test]
    fn rewrite_hook_applies_after_normalization() {
        let resolver = LockUrlResolver::with_rewrite(Arc::new(|p: &str| {
            p.strip_prefix("/dav").unwrap_or(p).to_string()
        }));
        assert_eq!(resolver.url_for("/dav/a/"), "http://localhost/a/");
        assert_eq!(resolver.url_for("/other"), "http://localhost/other");
    }

    #[test]
    fn path_of_strips_scheme_and_authority() {
        assert_eq!(path_of("http://localhost/a/b"), "/a/b");
        assert_eq!(path_of("https://example.com:8080/x/"), "/x/");
        assert_eq!(path_of("http://example.com"), "/");
        assert_eq!(path_of("/plain/path"), "/plain/path");
    }

    #[test]
    fn equal_urls_are_reference() {
        assert_eq!(
            compare(&url("/a/"), false, &url("/a/"), false),
            UrlComparison::Reference
        );
    }

    #[test]
    fn recursive_collection_is_parent_of_member() {
        assert_eq!(
            compare(&url("/a/"), true, &url("/a/b"), false),
            UrlComparison::LeftIsParent
        );
        assert_eq!(
            compare(&url("/a"), true, &url("/a/b/c"), false),
            UrlComparison::LeftIsParent
        );
    }

    #[test]
    fn non_recursive_collection_does_not_reach_members() {
        assert_eq!(
            compare(&url("/a/"), false, &url("/a/b"), false),
            UrlComparison::NoMatch
        );
    }

    #[test]
    fn member_under_recursive_collection_reports_right_is_parent() {
        assert_eq!(
            compare(&url("/a/b"), false, &url("/a/"), true),
            UrlComparison::RightIsParent
        );
    }

    #[test]
    fn prefix_without_segment_boundary_is_no_match() {
        // "/ab" is not inside "/a".
        assert_eq!(
            compare(&url("/a"), true, &url("/ab"), false),
            UrlComparison::NoMatch
        );
    }

    #[test]
    fn root_collection_parents_everything() {
        assert_eq!(
            compare(&url("/"), true, &url("/deep/tree/leaf"), false),
            UrlComparison::LeftIsParent
        );
    }

    #[test]
    fn comparator_is_antisymmetric() {
        let pairs = [
            ("/a/", "/a/b"),
            ("/", "/x"),
            ("/col/", "/col/sub/leaf"),
        ];
        for (parent, child) in pairs {
            assert_eq!(
                compare(&url(parent), true, &url(child), true),
                UrlComparison::LeftIsParent
            );
            assert_eq!(
                compare(&url(child), true, &url(parent), true),
                UrlComparison::RightIsParent
            );
        }
    }
}
