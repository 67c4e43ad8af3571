//! Conversion from Bitbucket wire types to the canonical local entities.
//!
//! Conversion never fails: a payload whose identity is unusable degrades to
//! a placeholder entity with a synthetic id instead of aborting the batch,
//! and every other missing field has an explicit fallback. Read flags are
//! carried over from the existing entity wherever a comment id matches, so
//! refetching the full comment payload every sync cannot lose read state.

use crate::models::{approval_summary, Comment, PullRequest, Repository};
use crate::services::bitbucket_client::{
    RawComment, RawParticipant, RawPullRequest, RawRepository,
};
use chrono::{TimeZone, Utc};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Author substituted when the payload carries no usable name.
pub const UNKNOWN_USER: &str = "Unknown User";

/// Repository path substituted when the target ref carries no repository.
pub const UNKNOWN_REPO_PATH: &str = "UNKNOWN/unknown-repo";

/// Synthetic id for a placeholder comment, derived from a fingerprint of
/// the raw payload. Refetching the same malformed payload yields the same
/// id, so the merge replaces the placeholder in place instead of
/// accumulating a copy per sync pass.
fn synthetic_comment_id(raw: &RawComment) -> String {
    let mut hasher = DefaultHasher::new();
    raw.id.hash(&mut hasher);
    raw.text.hash(&mut hasher);
    raw.created_date.hash(&mut hasher);
    raw.updated_date.hash(&mut hasher);
    if let Some(author) = &raw.author {
        author.name.hash(&mut hasher);
        author.display_name.hash(&mut hasher);
    }
    format!("error-{:x}", hasher.finish())
}

/// Synthetic id for a placeholder pull request, stable across passes for
/// the same reason as [`synthetic_comment_id`].
fn synthetic_pull_request_id(raw: &RawPullRequest) -> String {
    let mut hasher = DefaultHasher::new();
    raw.id.hash(&mut hasher);
    raw.title.hash(&mut hasher);
    raw.created_date.hash(&mut hasher);
    raw.updated_date.hash(&mut hasher);
    format!("error-{:x}", hasher.finish())
}

/// The id a raw comment will carry locally after conversion.
fn local_comment_id(raw: &RawComment) -> String {
    if raw.id > 0 {
        raw.id.to_string()
    } else {
        synthetic_comment_id(raw)
    }
}

/// Convert epoch milliseconds to an ISO 8601 string, falling back to the
/// secondary value and finally to the current time.
fn millis_to_iso(primary: Option<i64>, secondary: Option<i64>) -> String {
    primary
        .or(secondary)
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or_else(Utc::now)
        .to_rfc3339()
}

/// Project key and repository slug from a PR's target ref, with defaults.
pub fn repo_coords(raw: &RawPullRequest) -> (String, String) {
    let repository = raw.to_ref.as_ref().and_then(|r| r.repository.as_ref());

    let project_key = repository
        .and_then(|r| r.project.as_ref())
        .and_then(|p| p.key.clone())
        .unwrap_or_else(|| "UNKNOWN".to_string());
    let repo_slug = repository
        .and_then(|r| r.slug.clone())
        .unwrap_or_else(|| "unknown-repo".to_string());

    (project_key, repo_slug)
}

/// Composite repository path for a PR (`projectKey/repoSlug`).
pub fn repo_path(raw: &RawPullRequest) -> String {
    let (project_key, repo_slug) = repo_coords(raw);
    format!("{}/{}", project_key, repo_slug)
}

/// Ordered fallback chain for a participant's display name.
fn participant_name(participant: &RawParticipant) -> String {
    participant
        .user
        .as_ref()
        .and_then(|u| u.display_name.clone())
        .or_else(|| participant.user.as_ref().and_then(|u| u.name.clone()))
        .or_else(|| participant.display_name.clone())
        .or_else(|| participant.name.clone())
        .unwrap_or_else(|| UNKNOWN_USER.to_string())
}

/// Convert one raw comment, preserving the read flag of an existing local
/// comment with the same id.
///
/// A comment without a usable server id degrades to a placeholder rather
/// than failing, so one bad record cannot lose the rest of the list.
pub fn to_local_comment(raw: &RawComment, existing: Option<&Comment>) -> Comment {
    if raw.id <= 0 {
        let now = Utc::now().to_rfc3339();
        return Comment {
            id: synthetic_comment_id(raw),
            content: "Error loading comment".to_string(),
            author: "Unknown".to_string(),
            created_on: existing
                .map(|c| c.created_on.clone())
                .unwrap_or_else(|| now.clone()),
            updated_on: now,
            read: existing.map(|c| c.read).unwrap_or(false),
        };
    }

    let author = raw
        .author
        .as_ref()
        .and_then(|a| a.display_name.clone())
        .or_else(|| raw.author.as_ref().and_then(|a| a.name.clone()))
        .unwrap_or_else(|| UNKNOWN_USER.to_string());

    Comment {
        id: raw.id.to_string(),
        content: raw.text.clone().unwrap_or_default(),
        author,
        created_on: millis_to_iso(raw.created_date, None),
        updated_on: millis_to_iso(raw.updated_date, raw.created_date),
        read: existing.map(|c| c.read).unwrap_or(false),
    }
}

/// Convert a raw PR and its flattened comment payload into the local model.
///
/// Comments are merged by id against `existing`: refetched comments replace
/// their counterpart in place (keeping the read flag), unseen ones are
/// appended, and comments the payload no longer carries are retained.
/// Locally a comment is append-only once discovered.
pub fn to_local_pull_request(
    raw: &RawPullRequest,
    comments: &[RawComment],
    existing: Option<&PullRequest>,
) -> PullRequest {
    if raw.id <= 0 {
        return placeholder_pull_request(raw);
    }

    let author = raw
        .author
        .as_ref()
        .map(participant_name)
        .unwrap_or_else(|| UNKNOWN_USER.to_string());

    let mut merged: Vec<Comment> = existing.map(|pr| pr.comments.clone()).unwrap_or_default();
    for raw_comment in comments {
        let existing_comment = existing.and_then(|pr| pr.find_comment(&local_comment_id(raw_comment)));
        let converted = to_local_comment(raw_comment, existing_comment);
        match merged.iter_mut().find(|c| c.id == converted.id) {
            Some(slot) => *slot = converted,
            None => merged.push(converted),
        }
    }

    let reviewers = raw.reviewers.as_deref().unwrap_or_default();
    let approved_count = reviewers
        .iter()
        .filter(|r| r.approved == Some(true))
        .count();

    let mut pr = PullRequest {
        id: raw.id.to_string(),
        title: raw
            .title
            .clone()
            .unwrap_or_else(|| "Untitled Pull Request".to_string()),
        author,
        repository: repo_path(raw),
        created_on: millis_to_iso(raw.created_date, None),
        updated_on: millis_to_iso(raw.updated_date, raw.created_date),
        status: raw.state.clone().unwrap_or_else(|| "UNKNOWN".to_string()),
        comments: merged,
        unread_count: 0,
        approved: approved_count > 0,
        approval_status: approval_summary(approved_count, reviewers.len()),
    };
    pr.recompute_unread();
    pr
}

/// Placeholder PR substituted when conversion of a raw PR is impossible.
fn placeholder_pull_request(raw: &RawPullRequest) -> PullRequest {
    let now = Utc::now().to_rfc3339();
    PullRequest {
        id: synthetic_pull_request_id(raw),
        title: "Error loading pull request".to_string(),
        author: "Unknown".to_string(),
        repository: UNKNOWN_REPO_PATH.to_string(),
        created_on: now.clone(),
        updated_on: now,
        status: "ERROR".to_string(),
        comments: Vec::new(),
        unread_count: 0,
        approved: false,
        approval_status: "UNKNOWN".to_string(),
    }
}

/// Convert a raw repository listing entry plus its known pull requests.
pub fn to_local_repository(raw: &RawRepository, pull_requests: Vec<PullRequest>) -> Repository {
    let project_key = raw
        .project
        .as_ref()
        .and_then(|p| p.key.clone())
        .unwrap_or_else(|| "UNKNOWN".to_string());
    let repo_slug = raw
        .slug
        .clone()
        .unwrap_or_else(|| "unknown-repo".to_string());

    let mut repo = Repository {
        slug: format!("{}/{}", project_key, repo_slug),
        name: raw.name.clone().unwrap_or(repo_slug),
        pull_requests,
        unread_count: 0,
    };
    repo.recompute_unread();
    repo
}
