//! Implicit lock acquisition.
//!
//! Mutating WebDAV methods need the request's scope to be writable. The
//! client either proves it already holds the relevant locks through its `If`
//! header, or the manager takes a fresh lock on the request's behalf. The
//! whole decision runs against one read of the active set, and any fresh
//! acquisition stays inside the same transaction as the conflict check.

use std::collections::{HashMap, HashSet};

use tokio_util::sync::CancellationToken;

use davlock_core::url::{self, UrlComparison};
use davlock_core::{
    ActiveLock, DavFileSystem, IfHeader, LockError, LockRequest, LockStatus, ResourceLookup,
};
use davlock_db::LockTransaction;

use crate::manager::{LockManager, StagedLock};

/// How a request's lock requirement was satisfied.
#[derive(Debug)]
pub enum ImplicitLock {
    /// A new lock was created on the request's behalf.
    Fresh(ActiveLock),
    /// The client's `If` header proved it holds these active locks; nothing
    /// was created.
    Existing(Vec<ActiveLock>),
    /// The requirement cannot be satisfied; the offending locks are reported
    /// as reference conflicts.
    Conflict(LockStatus),
    /// No lock requirement was supplied.
    None,
}

impl LockManager {
    /// Decide whether `requirement` is satisfied by the client's existing
    /// lock tokens, or acquire a fresh lock for it.
    ///
    /// Untagged `If` lists apply to the requirement's path; tagged lists
    /// participate when their resource relates to the required scope.
    pub async fn lock_implicit(
        &self,
        file_system: &dyn DavFileSystem,
        if_header: Option<&IfHeader>,
        requirement: Option<&LockRequest>,
        cancel: &CancellationToken,
    ) -> Result<ImplicitLock, LockError> {
        let Some(request) = requirement else {
            return Ok(ImplicitLock::None);
        };

        let mut tx = self.begin(cancel).await?;

        let Some(header) = if_header.filter(|h| !h.is_empty()) else {
            return self.acquire_in(tx, request, cancel).await;
        };

        self.checked(cancel)?;
        let locks = tx.get_active_locks().await.map_err(LockError::backend)?;

        let request_url = self.resolver().url_for(&request.path);
        let affecting = self
            .relate(&locks, &request_url, request.recursive, true)
            .all();

        let mut failed_against: Vec<ActiveLock> = Vec::new();
        let mut matched_without_token = false;
        let mut etags: HashMap<String, Option<String>> = HashMap::new();

        for list in &header.lists {
            let list_path = match &list.resource {
                Some(href) => url::path_of(href),
                None => url::normalize_path(&request.path),
            };
            let list_url = self.resolver().url_for(&list_path);
            if url::compare(&list_url, true, &request_url, true) == UrlComparison::NoMatch {
                continue;
            }

            // The per-path view: affecting locks whose scope reaches this
            // list's path, keyed by token for condition evaluation.
            let relevant: Vec<&ActiveLock> = affecting
                .iter()
                .filter(|lock| {
                    let lock_url = self.resolver().url_for(&lock.path);
                    url::compare(&list_url, true, &lock_url, lock.recursive)
                        != UrlComparison::NoMatch
                })
                .collect();
            let tokens: HashSet<String> = relevant
                .iter()
                .map(|lock| lock.state_token.clone())
                .collect();

            let entity_tag = if list.requires_entity_tag() {
                if !etags.contains_key(&list_path) {
                    self.checked(cancel)?;
                    let tag = self.entity_tag_for(file_system, &list_path).await?;
                    etags.insert(list_path.clone(), tag);
                }
                etags[&list_path].clone()
            } else {
                None
            };

            if list.matches(entity_tag.as_deref(), &tokens) {
                if list.requires_state_token() {
                    let satisfied = satisfying_locks(list.state_tokens(), &relevant);
                    tracing::debug!(
                        path = %request.path,
                        locks = satisfied.len(),
                        "Lock requirement satisfied by existing locks"
                    );
                    return Ok(ImplicitLock::Existing(satisfied));
                }
                matched_without_token = true;
            } else if !relevant.is_empty() {
                for lock in relevant {
                    if !failed_against
                        .iter()
                        .any(|seen| seen.state_token == lock.state_token)
                    {
                        failed_against.push(lock.clone());
                    }
                }
            }
        }

        if matched_without_token || failed_against.is_empty() {
            // Either a list passed without needing a token, or no list spoke
            // for this path at all: fall through to plain acquisition.
            return self.acquire_in(tx, request, cancel).await;
        }

        tracing::debug!(
            path = %request.path,
            conflicts = failed_against.len(),
            "Lock requirement denied: If header did not match the active locks"
        );
        Ok(ImplicitLock::Conflict(LockStatus {
            reference_locks: failed_against,
            ..Default::default()
        }))
    }

    /// Stage, commit, and announce a fresh implicit lock inside `tx`.
    async fn acquire_in(
        &self,
        mut tx: Box<dyn LockTransaction>,
        request: &LockRequest,
        cancel: &CancellationToken,
    ) -> Result<ImplicitLock, LockError> {
        match self.lock_in(&mut tx, request, cancel).await? {
            StagedLock::Conflict(status) => Ok(ImplicitLock::Conflict(status)),
            StagedLock::Staged(lock) => {
                self.checked(cancel)?;
                tx.commit().await.map_err(LockError::backend)?;
                self.after_added(&lock);
                Ok(ImplicitLock::Fresh(lock))
            }
        }
    }

    /// Look up a resource's entity tag, tolerating a missing target.
    pub(crate) async fn entity_tag_for(
        &self,
        file_system: &dyn DavFileSystem,
        path: &str,
    ) -> Result<Option<String>, LockError> {
        match file_system.select(path).await? {
            ResourceLookup::Found { entity_tag } => Ok(entity_tag),
            ResourceLookup::Missing => {
                tracing::debug!(path = %path, "Entity tag lookup skipped: target missing");
                Ok(None)
            }
        }
    }
}

/// The locks whose tokens satisfied a list's non-negated token conditions,
/// deduplicated, in condition order.
fn satisfying_locks(
    tokens: impl Iterator<Item = impl AsRef<str>>,
    relevant: &[&ActiveLock],
) -> Vec<ActiveLock> {
    let mut used: Vec<ActiveLock> = Vec::new();
    for token in tokens {
        let token = token.as_ref();
        if used.iter().any(|lock| lock.state_token == token) {
            continue;
        }
        if let Some(lock) = relevant.iter().find(|lock| lock.state_token == token) {
            used.push((*lock).clone());
        }
    }
    used
}
