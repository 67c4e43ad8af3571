//! Repository model.

use crate::models::PullRequest;
use serde::{Deserialize, Serialize};

/// A repository holding the pull requests observed for it.
///
/// Repositories are created lazily the first time a PR belonging to them is
/// seen. At that point the display name is the slug itself; the name is
/// corrected once the recent-repositories listing provides the real one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    /// Composite key `projectKey/repoSlug`, globally unique in the store.
    pub slug: String,

    /// Display name. Equals the slug until backfilled.
    pub name: String,

    /// Pull requests observed for this repository, in discovery order.
    pub pull_requests: Vec<PullRequest>,

    /// Sum of the unread counts of all pull requests. Derived.
    pub unread_count: usize,
}

impl Repository {
    /// Create an empty repository with a provisional name equal to its slug.
    pub fn provisional(slug: impl Into<String>) -> Self {
        let slug = slug.into();
        Self {
            name: slug.clone(),
            slug,
            pull_requests: Vec::new(),
            unread_count: 0,
        }
    }

    /// Whether the display name was never backfilled from repository
    /// metadata.
    pub fn has_provisional_name(&self) -> bool {
        self.name == self.slug
    }

    /// Look up a pull request by id.
    pub fn find_pull_request(&self, pr_id: &str) -> Option<&PullRequest> {
        self.pull_requests.iter().find(|pr| pr.id == pr_id)
    }

    /// Recompute the repository unread count from its pull requests.
    ///
    /// Assumes each PR's own count is already up to date.
    pub fn recompute_unread(&mut self) {
        self.unread_count = self.pull_requests.iter().map(|pr| pr.unread_count).sum();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provisional_name() {
        let mut repo = Repository::provisional("PROJ/backend");
        assert_eq!(repo.slug, "PROJ/backend");
        assert_eq!(repo.name, "PROJ/backend");
        assert!(repo.has_provisional_name());

        repo.name = "Backend Service".to_string();
        assert!(!repo.has_provisional_name());
    }

    #[test]
    fn test_recompute_unread_sums_pull_requests() {
        let mut repo = Repository::provisional("PROJ/repo");
        for (id, unread) in [("1", 2usize), ("2", 0), ("3", 5)] {
            repo.pull_requests.push(PullRequest {
                id: id.to_string(),
                title: "PR".to_string(),
                author: "Author".to_string(),
                repository: repo.slug.clone(),
                created_on: "2024-01-15T10:30:00+00:00".to_string(),
                updated_on: "2024-01-15T10:30:00+00:00".to_string(),
                status: "OPEN".to_string(),
                comments: Vec::new(),
                unread_count: unread,
                approved: false,
                approval_status: "UNAPPROVED".to_string(),
            });
        }

        repo.recompute_unread();
        assert_eq!(repo.unread_count, 7);
    }
}
