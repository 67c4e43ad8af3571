//! Reconciliation store: the single owner of all local PR state.
//!
//! The store holds the repository tree (repositories → pull requests →
//! comments) behind a `RwLock` and persists it as one keyed JSON record
//! after every mutation. Both the sync orchestrator and the presentation
//! boundary mutate state exclusively through these methods, so the two
//! count invariants are restored before any caller can observe the tree:
//!
//! - `pr.unread_count == count(comments where !read)`
//! - `repo.unread_count == Σ pr.unread_count`
//!
//! Persistence failures are logged and swallowed; an in-memory-only pass
//! still completes and the next successful write catches up.

use crate::db::{self, DbPool, PR_DATA_KEY};
use crate::error::AppError;
use crate::models::{PullRequest, Repository};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Serialized form of the store: the full tree plus the last sync time.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    repositories: Vec<Repository>,
    last_sync_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct StoreState {
    repositories: Vec<Repository>,
    last_sync_time: Option<DateTime<Utc>>,
    /// Set when unread counts changed and the badge consumer must refresh.
    dirty: bool,
}

/// In-memory store for repositories, pull requests and comments, backed by
/// a SQLite keyed record.
pub struct PrStore {
    pool: DbPool,
    state: RwLock<StoreState>,
}

impl PrStore {
    /// Create an empty store on top of an initialized database pool.
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            state: RwLock::new(StoreState::default()),
        }
    }

    /// Restore the last persisted snapshot.
    ///
    /// Returns `true` if a snapshot existed. An absent record is a first
    /// run, not an error.
    pub async fn load(&self) -> Result<bool, AppError> {
        let Some(raw) = db::get_record(&self.pool, PR_DATA_KEY)
            .await
            .map_err(|e| AppError::database(e.to_string()))?
        else {
            return Ok(false);
        };

        let snapshot: Snapshot = serde_json::from_str(&raw)?;
        let mut state = self.state.write().await;
        state.repositories = snapshot.repositories;
        state.last_sync_time = snapshot.last_sync_time;
        Ok(true)
    }

    /// Read-only view of all repositories.
    pub async fn repositories(&self) -> Vec<Repository> {
        self.state.read().await.repositories.clone()
    }

    /// Look up one repository by slug.
    pub async fn find_repository(&self, slug: &str) -> Option<Repository> {
        self.state
            .read()
            .await
            .repositories
            .iter()
            .find(|r| r.slug == slug)
            .cloned()
    }

    /// Look up one pull request by repository slug and PR id.
    pub async fn find_pull_request(&self, repo_slug: &str, pr_id: &str) -> Option<PullRequest> {
        self.state
            .read()
            .await
            .repositories
            .iter()
            .find(|r| r.slug == repo_slug)
            .and_then(|r| r.find_pull_request(pr_id))
            .cloned()
    }

    /// Global unread total across every repository, for the badge signal.
    pub async fn total_unread_count(&self) -> usize {
        self.state
            .read()
            .await
            .repositories
            .iter()
            .map(|r| r.unread_count)
            .sum()
    }

    /// Timestamp of the last successful sync.
    pub async fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.last_sync_time
    }

    /// Record a successful sync completion and persist it.
    pub async fn set_last_sync_time(&self, time: DateTime<Utc>) {
        let mut state = self.state.write().await;
        state.last_sync_time = Some(time);
        self.persist(&state).await;
    }

    /// Flag the badge consumer for a refresh.
    pub async fn mark_dirty(&self) {
        self.state.write().await.dirty = true;
    }

    /// Consume the dirty flag. Returns whether a refresh was pending.
    pub async fn take_dirty(&self) -> bool {
        let mut state = self.state.write().await;
        std::mem::take(&mut state.dirty)
    }

    /// Insert a repository or replace it in place by slug.
    pub async fn upsert_repository(&self, repository: Repository) {
        let mut state = self.state.write().await;
        match state
            .repositories
            .iter_mut()
            .find(|r| r.slug == repository.slug)
        {
            Some(slot) => *slot = repository,
            None => state.repositories.push(repository),
        }
        Self::recompute(&mut state);
        self.persist(&state).await;
    }

    /// Insert a pull request or replace it in place by id.
    ///
    /// An unknown repository slug creates the repository lazily with a
    /// provisional display name equal to the slug.
    pub async fn upsert_pull_request(&self, repo_slug: &str, pull_request: PullRequest) {
        let mut state = self.state.write().await;

        let index = match state.repositories.iter().position(|r| r.slug == repo_slug) {
            Some(index) => index,
            None => {
                state.repositories.push(Repository::provisional(repo_slug));
                state.repositories.len() - 1
            }
        };
        let repo = &mut state.repositories[index];

        match repo
            .pull_requests
            .iter_mut()
            .find(|pr| pr.id == pull_request.id)
        {
            Some(slot) => *slot = pull_request,
            None => repo.pull_requests.push(pull_request),
        }

        Self::recompute(&mut state);
        self.persist(&state).await;
    }

    /// Correct a repository's display name once real metadata is known.
    pub async fn rename_repository(&self, slug: &str, name: &str) {
        let mut state = self.state.write().await;
        if let Some(repo) = state.repositories.iter_mut().find(|r| r.slug == slug) {
            repo.name = name.to_string();
            self.persist(&state).await;
        }
    }

    /// Toggle the read flag of one comment.
    pub async fn set_comment_read(
        &self,
        repo_slug: &str,
        pr_id: &str,
        comment_id: &str,
        read: bool,
    ) -> Result<(), AppError> {
        let mut state = self.state.write().await;

        let comment = state
            .repositories
            .iter_mut()
            .find(|r| r.slug == repo_slug)
            .and_then(|r| r.pull_requests.iter_mut().find(|pr| pr.id == pr_id))
            .and_then(|pr| pr.comments.iter_mut().find(|c| c.id == comment_id))
            .ok_or_else(|| AppError::not_found_with_id("Comment", comment_id))?;

        comment.read = read;
        state.dirty = true;
        Self::recompute(&mut state);
        self.persist(&state).await;
        Ok(())
    }

    /// Mark every comment of one pull request as read.
    pub async fn mark_all_read(&self, repo_slug: &str, pr_id: &str) -> Result<(), AppError> {
        let mut state = self.state.write().await;

        let pr = state
            .repositories
            .iter_mut()
            .find(|r| r.slug == repo_slug)
            .and_then(|r| r.pull_requests.iter_mut().find(|pr| pr.id == pr_id))
            .ok_or_else(|| AppError::not_found_with_id("PullRequest", pr_id))?;

        for comment in &mut pr.comments {
            comment.read = true;
        }
        state.dirty = true;
        Self::recompute(&mut state);
        self.persist(&state).await;
        Ok(())
    }

    /// Mark every comment everywhere as read and zero all counts.
    pub async fn clear_all_unread(&self) {
        let mut state = self.state.write().await;
        for repo in &mut state.repositories {
            for pr in &mut repo.pull_requests {
                for comment in &mut pr.comments {
                    comment.read = true;
                }
            }
        }
        state.dirty = true;
        Self::recompute(&mut state);
        self.persist(&state).await;
    }

    /// Walk the whole tree, restore both count invariants and persist.
    pub async fn recompute_counts(&self) {
        let mut state = self.state.write().await;
        Self::recompute(&mut state);
        self.persist(&state).await;
    }

    fn recompute(state: &mut StoreState) {
        for repo in &mut state.repositories {
            for pr in &mut repo.pull_requests {
                pr.recompute_unread();
            }
            repo.recompute_unread();
        }
    }

    /// Persist a snapshot. Failures are logged, never propagated.
    async fn persist(&self, state: &StoreState) {
        let snapshot = Snapshot {
            repositories: state.repositories.clone(),
            last_sync_time: state.last_sync_time,
        };

        let serialized = match serde_json::to_string(&snapshot) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("Failed to serialize snapshot: {}", e);
                return;
            }
        };

        if let Err(e) = db::put_record(&self.pool, PR_DATA_KEY, &serialized).await {
            log::warn!("Failed to persist snapshot: {}", e);
        }
    }
}
