//! Sync orchestrator.
//!
//! Drives the polling loop against the remote: fetch the dashboard
//! listings, fetch comments per PR, convert, diff against the store to find
//! comments that are new since the last pass, notify for exactly those, and
//! upsert. At most one pass runs at a time; a trigger arriving mid-pass is
//! dropped, not queued. A failure fetching a top-level listing aborts the
//! pass with the store untouched, while per-PR failures only skip that PR.

use crate::error::AppError;
use crate::services::bitbucket_client::{RawPullRequest, RawRepository, RemoteSource};
use crate::services::convert;
use crate::services::notifier::Notifier;
use crate::store::PrStore;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time;

/// Default sync interval in seconds (5 minutes).
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 300;

/// Maximum number of comment characters quoted in a notification summary.
const NOTIFICATION_PREVIEW_CHARS: usize = 50;

/// Which listings a sync pass covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncScope {
    /// Union pass plus both single-role passes plus repository backfill.
    Full,
    /// Reviewer-role listing only.
    ReviewerOnly,
    /// Author-role listing only.
    AuthorOnly,
}

/// Observable state of the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct SyncStatus {
    /// Whether a pass is currently running.
    pub is_syncing: bool,

    /// Completion time of the last successful pass. Unchanged on failure.
    pub last_sync_time: Option<DateTime<Utc>>,

    /// Errors from the last pass, joined, if any.
    pub last_error: Option<String>,

    /// Number of PRs processed in the last successful pass.
    pub last_sync_pr_count: usize,
}

/// Result of one sync pass.
#[derive(Debug, Default)]
pub struct SyncResult {
    /// PRs fetched and upserted.
    pub pr_count: usize,

    /// Comments that were new to the store, each of which produced one
    /// notification.
    pub new_comment_count: usize,

    /// Tolerated per-step and per-PR errors.
    pub errors: Vec<String>,

    /// Pass duration in milliseconds.
    pub duration_ms: i64,

    /// True when the pass was dropped because another was in flight.
    pub skipped: bool,
}

impl SyncResult {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }
}

/// Orchestrates periodic and manual sync passes against one remote.
pub struct SyncEngine<R: RemoteSource> {
    store: Arc<PrStore>,
    remote: R,
    notifier: Arc<Notifier>,

    /// Single-flight guard. Checked and set in one atomic step.
    syncing: AtomicBool,

    status: RwLock<SyncStatus>,
    periodic_task: Mutex<Option<JoinHandle<()>>>,
}

impl<R: RemoteSource + 'static> SyncEngine<R> {
    /// Create an engine around an existing store and notifier.
    pub fn new(store: Arc<PrStore>, remote: R, notifier: Arc<Notifier>) -> Self {
        Self {
            store,
            remote,
            notifier,
            syncing: AtomicBool::new(false),
            status: RwLock::new(SyncStatus::default()),
            periodic_task: Mutex::new(None),
        }
    }

    /// Current orchestrator status.
    pub async fn status(&self) -> SyncStatus {
        let mut status = self.status.read().await.clone();
        status.is_syncing = self.syncing.load(Ordering::SeqCst);
        status
    }

    /// Run a full sync pass: the reviewer/author union, both single-role
    /// listings again, then repository display-name backfill.
    ///
    /// No-op (logged, `skipped` set) when a pass is already in flight.
    pub async fn run_sync(&self) -> Result<SyncResult, AppError> {
        self.run_scoped(SyncScope::Full).await
    }

    /// Sync only PRs where the user is a reviewer.
    pub async fn sync_review_requests(&self) -> Result<SyncResult, AppError> {
        self.run_scoped(SyncScope::ReviewerOnly).await
    }

    /// Sync only PRs the user authored.
    pub async fn sync_authored_requests(&self) -> Result<SyncResult, AppError> {
        self.run_scoped(SyncScope::AuthorOnly).await
    }

    async fn run_scoped(&self, scope: SyncScope) -> Result<SyncResult, AppError> {
        // Guard check and transition must be one atomic step
        if self
            .syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            eprintln!("[sync] Sync already in progress, skipping this request");
            return Ok(SyncResult::skipped());
        }

        let start = Instant::now();
        let outcome = self.run_pass(scope).await;
        self.syncing.store(false, Ordering::SeqCst);

        let mut status = self.status.write().await;
        match outcome {
            Ok(mut result) => {
                result.duration_ms = start.elapsed().as_millis() as i64;
                let completed_at = Utc::now();
                self.store.set_last_sync_time(completed_at).await;

                status.last_sync_time = Some(completed_at);
                status.last_sync_pr_count = result.pr_count;
                status.last_error = if result.errors.is_empty() {
                    None
                } else {
                    Some(result.errors.join("; "))
                };
                drop(status);

                eprintln!(
                    "[sync] Pass complete: {} PRs, {} new comments, {} errors",
                    result.pr_count,
                    result.new_comment_count,
                    result.errors.len()
                );
                Ok(result)
            }
            Err(e) => {
                // Aborted before any mutation: last_sync_time stays put and
                // the local model is unchanged
                status.last_error = Some(e.to_string());
                drop(status);

                eprintln!("[sync] Pass aborted: {}", e);
                Err(e)
            }
        }
    }

    async fn run_pass(&self, scope: SyncScope) -> Result<SyncResult, AppError> {
        let mut result = SyncResult::default();

        match scope {
            SyncScope::Full => {
                // Step 1: the union listing is the backbone of the pass;
                // failing to fetch it aborts before any store mutation
                let union = self.remote.fetch_all_relevant_requests().await?;
                let union_count = self.process_pull_requests(&union, &mut result).await;
                result.pr_count = union_count;

                // Steps 2-3: re-process each role listing. Overlap with
                // step 1 is safe: the new-comment diff reads the store as
                // it stands right before each upsert, so nothing is
                // notified twice.
                match self.remote.fetch_review_requests().await {
                    Ok(batch) => {
                        self.process_pull_requests(&batch, &mut result).await;
                    }
                    Err(e) => result.errors.push(format!("reviewer listing: {}", e)),
                }
                match self.remote.fetch_authored_requests().await {
                    Ok(batch) => {
                        self.process_pull_requests(&batch, &mut result).await;
                    }
                    Err(e) => result.errors.push(format!("author listing: {}", e)),
                }

                // Step 4: backfill provisional repository names
                match self.remote.fetch_recent_repositories().await {
                    Ok(repos) => self.backfill_repository_names(&repos).await,
                    Err(e) => result.errors.push(format!("recent repositories: {}", e)),
                }
            }
            SyncScope::ReviewerOnly => {
                let batch = self.remote.fetch_review_requests().await?;
                let count = self.process_pull_requests(&batch, &mut result).await;
                result.pr_count = count;
            }
            SyncScope::AuthorOnly => {
                let batch = self.remote.fetch_authored_requests().await?;
                let count = self.process_pull_requests(&batch, &mut result).await;
                result.pr_count = count;
            }
        }

        self.store.recompute_counts().await;
        self.store.mark_dirty().await;
        self.flush_badge().await;

        Ok(result)
    }

    /// Process one batch of raw PRs, strictly sequentially. Returns the
    /// number of PRs upserted.
    ///
    /// The existing-PR lookup happens immediately before each individual
    /// conversion and upsert; a concurrent upsert racing that lookup would
    /// corrupt the new-comment diff, which is why nothing here is spawned.
    async fn process_pull_requests(
        &self,
        batch: &[RawPullRequest],
        result: &mut SyncResult,
    ) -> usize {
        let mut processed = 0;
        for raw in batch {
            let (project_key, repo_slug) = convert::repo_coords(raw);
            let path = format!("{}/{}", project_key, repo_slug);
            let pr_id = raw.id.to_string();

            // Current store state, read before conversion so read flags and
            // the diff baseline reflect every earlier upsert of this pass
            let existing = self.store.find_pull_request(&path, &pr_id).await;

            let comments = match self
                .remote
                .fetch_comments(&project_key, &repo_slug, raw.id)
                .await
            {
                Ok(comments) => comments,
                Err(e) => {
                    // One unreachable thread must not abort the pass
                    log::warn!("Skipping PR {} in {}: {}", pr_id, path, e);
                    result.errors.push(format!("PR {}: {}", pr_id, e));
                    continue;
                }
            };

            let pr = convert::to_local_pull_request(raw, &comments, existing.as_ref());

            // Every comment id absent from the previous local state is new.
            // A PR seen for the first time notifies nothing: its whole
            // thread predates our interest in it. Placeholder comments
            // carry no real content and are never worth a notification.
            if let Some(existing) = &existing {
                for comment in &pr.comments {
                    if comment.is_placeholder() {
                        continue;
                    }
                    if existing.find_comment(&comment.id).is_none() {
                        result.new_comment_count += 1;
                        self.notifier
                            .notify(format!(
                                "New comment on {}/{}: {}",
                                path,
                                pr.id,
                                truncate_content(&comment.content, NOTIFICATION_PREVIEW_CHARS)
                            ))
                            .await;
                    }
                }
            }

            self.store.upsert_pull_request(&path, pr).await;
            processed += 1;
        }
        processed
    }

    /// Replace provisional repository names with the ones the remote
    /// reports.
    async fn backfill_repository_names(&self, repos: &[RawRepository]) {
        for raw in repos {
            let (Some(name), Some(slug)) = (&raw.name, &raw.slug) else {
                continue;
            };
            let Some(key) = raw.project.as_ref().and_then(|p| p.key.as_ref()) else {
                continue;
            };
            let path = format!("{}/{}", key, slug);

            if let Some(repo) = self.store.find_repository(&path).await {
                if repo.has_provisional_name() {
                    self.store.rename_repository(&path, name).await;
                }
            }
        }
    }

    /// Emit the badge count if the store is flagged dirty.
    pub async fn flush_badge(&self) {
        if self.store.take_dirty().await {
            let count = self.store.total_unread_count().await;
            self.notifier.update_badge(count).await;
        }
    }

    /// Install the repeating sync timer, replacing any previous one.
    ///
    /// Each tick spawns an independent pass so that stopping the timer
    /// never cancels a pass already in flight; a tick that finds a pass
    /// running is skipped outright.
    pub async fn start_periodic_sync(self: &Arc<Self>, interval_secs: u64) {
        let mut slot = self.periodic_task.lock().await;
        if let Some(previous) = slot.take() {
            previous.abort();
        }

        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = time::interval(Duration::from_secs(interval_secs.max(1)));
            // Consume the immediate first tick; the caller decides whether
            // an initial sync happens right away
            interval.tick().await;

            loop {
                interval.tick().await;
                if engine.syncing.load(Ordering::SeqCst) {
                    eprintln!("[sync] Skipping periodic sync, previous pass still running");
                    continue;
                }
                eprintln!("[sync] Running periodic sync");
                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    if let Err(e) = engine.run_sync().await {
                        eprintln!("[sync] Periodic sync error: {}", e);
                    }
                });
            }
        });

        *slot = Some(handle);
        eprintln!("[sync] Periodic sync started, interval {}s", interval_secs);
    }

    /// Cancel the repeating timer. Only future ticks are prevented.
    pub async fn stop_periodic_sync(&self) {
        if let Some(handle) = self.periodic_task.lock().await.take() {
            handle.abort();
            eprintln!("[sync] Periodic sync stopped");
        }
    }
}

/// Truncate to at most `max_chars` characters, on a char boundary.
fn truncate_content(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        content.to_string()
    } else {
        let truncated: String = content.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_content() {
        assert_eq!(truncate_content("short", 50), "short");

        let long = "x".repeat(80);
        let truncated = truncate_content(&long, 50);
        assert_eq!(truncated.len(), 53);
        assert!(truncated.ends_with("..."));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let content = "é".repeat(60);
        let truncated = truncate_content(&content, 50);
        assert_eq!(truncated.chars().count(), 53);
        assert!(truncated.ends_with("..."));
    }

    #[test]
    fn test_sync_result_skipped() {
        let result = SyncResult::skipped();
        assert!(result.skipped);
        assert_eq!(result.pr_count, 0);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_sync_status_initial() {
        let status = SyncStatus::default();
        assert!(!status.is_syncing);
        assert!(status.last_sync_time.is_none());
        assert!(status.last_error.is_none());
    }
}
