//! Pull request model.

use crate::models::Comment;
use serde::{Deserialize, Serialize};

/// A pull request with its comment thread and derived unread count.
///
/// The id is unique within a repository. On re-sync the PR is replaced in
/// place but comments are merged by id beforehand, so read flags survive the
/// full refetch of the comment payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    /// Server-assigned PR id, unique within the repository.
    pub id: String,

    /// PR title.
    pub title: String,

    /// Author display name.
    pub author: String,

    /// Repository path this PR belongs to (`projectKey/repoSlug`).
    pub repository: String,

    /// Creation timestamp (ISO 8601).
    pub created_on: String,

    /// Last update timestamp (ISO 8601).
    pub updated_on: String,

    /// Remote state string (`OPEN`, `MERGED`, ... or `ERROR` for
    /// placeholders).
    pub status: String,

    /// Ordered comment thread, parents before replies.
    pub comments: Vec<Comment>,

    /// Number of unread comments. Derived; restored by
    /// [`recompute_unread`](Self::recompute_unread).
    pub unread_count: usize,

    /// Whether at least one reviewer has approved.
    pub approved: bool,

    /// Human-readable approval summary, e.g. `"APPROVED (2/3)"`.
    pub approval_status: String,
}

impl PullRequest {
    /// Recompute the unread count from the comment read flags.
    pub fn recompute_unread(&mut self) {
        self.unread_count = self.comments.iter().filter(|c| !c.read).count();
    }

    /// Look up a comment by id.
    pub fn find_comment(&self, comment_id: &str) -> Option<&Comment> {
        self.comments.iter().find(|c| c.id == comment_id)
    }
}

/// Build the human-readable approval summary from reviewer counts.
///
/// `"APPROVED"` when every reviewer approved, `"APPROVED (k/n)"` for a
/// partial approval, `"UNAPPROVED"` otherwise (including zero reviewers).
pub fn approval_summary(approved_count: usize, reviewer_count: usize) -> String {
    if reviewer_count > 0 && approved_count == reviewer_count {
        "APPROVED".to_string()
    } else if approved_count > 0 {
        format!("APPROVED ({}/{})", approved_count, reviewer_count)
    } else {
        "UNAPPROVED".to_string()
    }
}
