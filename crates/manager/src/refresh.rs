//! Lock refresh.
//!
//! A refresh names its locks through `If` header token conditions. Each
//! token-bearing list is resolved against the locks covering its tagged
//! path; every match produces a value-typed copy with a new deadline, staged
//! for update and committed together. Untagged lists carry no resource here
//! and must be resolved against the request URI by the caller first (see
//! [`IfHeader::resolve_untagged`]).

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use davlock_core::url::{self, UrlComparison};
use davlock_core::{ActiveLock, DavFileSystem, IfHeader, LockError};

use crate::manager::LockManager;

/// Precondition code reported when no presented token matched, per
/// RFC 4918 §9.10.6.
pub const PRECONDITION_LOCK_TOKEN_MATCHES: &str = "lock-token-matches-request-uri";

/// Structured refresh failure: the hrefs whose lists found no matching lock,
/// plus the precondition code for the response body.
#[derive(Debug, Clone)]
pub struct RefreshFailure {
    pub hrefs: Vec<String>,
    pub condition: &'static str,
}

/// Outcome of a refresh.
#[derive(Debug)]
pub enum RefreshOutcome {
    /// At least one lock was refreshed; the new records, in header order.
    Refreshed(Vec<ActiveLock>),
    Failed(RefreshFailure),
}

impl LockManager {
    /// Refresh the locks named by `if_header` to `new_timeout`.
    ///
    /// Only lists carrying a non-negated token condition participate. A
    /// list refreshes the unique covering lock whose token it names; lists
    /// that resolve no lock are collected into the failure report. The
    /// refresh succeeds if at least one lock was renewed.
    pub async fn refresh(
        &self,
        file_system: &dyn DavFileSystem,
        if_header: &IfHeader,
        new_timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<RefreshOutcome, LockError> {
        let mut tx = self.begin(cancel).await?;
        self.checked(cancel)?;
        let locks = tx.get_active_locks().await.map_err(LockError::backend)?;

        let now = self.rounding().round_timestamp(self.clock_now());
        let timeout = self
            .rounding()
            .round_timeout(new_timeout.min(self.max_timeout()));

        let mut refreshed: Vec<ActiveLock> = Vec::new();
        let mut failed_hrefs: Vec<String> = Vec::new();
        let mut etags: HashMap<String, Option<String>> = HashMap::new();

        for list in if_header.lists.iter().filter(|l| l.requires_state_token()) {
            let Some(href) = list.resource.clone() else {
                // Unresolved untagged list; nothing to cover.
                failed_hrefs.push(String::new());
                continue;
            };
            let list_path = url::path_of(&href);
            let list_url = self.resolver().url_for(&list_path);

            // Locks covering the path: at it exactly, or a recursive
            // ancestor of it.
            let covering: Vec<&ActiveLock> = locks
                .iter()
                .filter(|lock| {
                    let lock_url = self.resolver().url_for(&lock.path);
                    matches!(
                        url::compare(&list_url, false, &lock_url, lock.recursive),
                        UrlComparison::Reference | UrlComparison::RightIsParent
                    )
                })
                .collect();

            if covering.is_empty() {
                failed_hrefs.push(href);
                continue;
            }

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

            // The unique covering lock whose token the list names. Tokens
            // are unique, so at most one lock can satisfy the conditions.
            let hit = covering.iter().find(|lock| {
                let single: HashSet<String> = HashSet::from([lock.state_token.clone()]);
                list.matches(entity_tag.as_deref(), &single)
            });

            match hit {
                Some(lock) => {
                    if refreshed
                        .iter()
                        .any(|r| r.state_token == lock.state_token)
                    {
                        continue;
                    }
                    self.cleanup().unwatch(&lock.state_token);
                    refreshed.push(lock.refreshed(now, timeout));
                }
                None => failed_hrefs.push(href),
            }
        }

        if refreshed.is_empty() {
            tracing::debug!(
                failed = failed_hrefs.len(),
                "Refresh matched no active lock"
            );
            return Ok(RefreshOutcome::Failed(RefreshFailure {
                hrefs: failed_hrefs,
                condition: PRECONDITION_LOCK_TOKEN_MATCHES,
            }));
        }

        for lock in &refreshed {
            self.checked(cancel)?;
            tx.update(lock).await.map_err(LockError::backend)?;
        }
        tx.commit().await.map_err(LockError::backend)?;

        for lock in &refreshed {
            self.cleanup().watch(lock.clone());
            tracing::info!(
                token = %lock.state_token,
                path = %lock.path,
                timeout_secs = lock.timeout.as_secs(),
                "Lock refreshed"
            );
        }
        Ok(RefreshOutcome::Refreshed(refreshed))
    }
}
