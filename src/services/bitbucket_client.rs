//! Bitbucket Server API client.
//!
//! Provides the HTTP client for the `/rest/api/latest` REST surface with
//! Basic auth and paged-response handling, plus the wire types the dashboard
//! and per-PR endpoints return. The remote is free to omit almost any field,
//! so every non-identity field is optional here and the converter decides
//! the fallbacks.

use crate::error::AppError;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{header, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Bitbucket API client configuration.
#[derive(Debug, Clone)]
pub struct BitbucketClientConfig {
    /// Base URL of the Bitbucket instance (e.g. `https://git.example.com`).
    pub base_url: String,

    /// Username for HTTP Basic auth.
    pub username: String,

    /// API key (or password) for HTTP Basic auth.
    pub api_key: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for BitbucketClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            username: String::new(),
            api_key: String::new(),
            timeout_secs: 30,
        }
    }
}

/// Bitbucket API client.
#[derive(Debug, Clone)]
pub struct BitbucketClient {
    client: Client,
    config: BitbucketClientConfig,
}

/// Paged envelope wrapping every Bitbucket list endpoint.
#[derive(Debug, Deserialize)]
pub struct PagedResponse<T> {
    /// The page of results.
    pub values: Vec<T>,

    /// Whether this is the final page.
    #[serde(rename = "isLastPage")]
    pub is_last_page: Option<bool>,

    /// Offset of the next page, absent on the last page.
    #[serde(rename = "nextPageStart")]
    pub next_page_start: Option<i64>,
}

/// Project metadata nested inside repository refs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawProject {
    pub key: Option<String>,
    pub name: Option<String>,
}

/// Repository metadata nested inside a PR's target ref.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRefRepository {
    pub slug: Option<String>,
    pub name: Option<String>,
    pub project: Option<RawProject>,
}

/// A branch ref on a pull request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRef {
    pub repository: Option<RawRefRepository>,
}

/// User record as it appears nested in participants and comment authors.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawUser {
    pub name: Option<String>,
    pub display_name: Option<String>,
}

/// PR participant: the author entry or one reviewer.
///
/// Depending on server version the user fields appear nested under `user`
/// or flat on the participant itself; the converter probes both.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawParticipant {
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub user: Option<RawUser>,
    pub approved: Option<bool>,
}

/// Pull request from the dashboard or per-repository listings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPullRequest {
    pub id: i64,
    pub title: Option<String>,
    pub state: Option<String>,
    /// Epoch milliseconds.
    pub created_date: Option<i64>,
    /// Epoch milliseconds.
    pub updated_date: Option<i64>,
    pub author: Option<RawParticipant>,
    pub reviewers: Option<Vec<RawParticipant>>,
    pub to_ref: Option<RawRef>,
}

/// Comment from the comments endpoint or an activity payload.
///
/// Replies arrive nested under `comments`; [`flatten_comment_tree`] turns
/// the tree into the flat ordered list the rest of the core works with.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawComment {
    pub id: i64,
    pub text: Option<String>,
    pub author: Option<RawUser>,
    /// Epoch milliseconds.
    pub created_date: Option<i64>,
    /// Epoch milliseconds.
    pub updated_date: Option<i64>,
    /// Nested replies.
    pub comments: Option<Vec<RawComment>>,
}

/// Entry from the per-PR activity log, used as the comment fallback path.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawActivity {
    pub action: Option<String>,
    pub comment: Option<RawComment>,
}

/// Repository from the recent-repositories listing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRepository {
    pub slug: Option<String>,
    pub name: Option<String>,
    pub project: Option<RawProject>,
}

/// The remote operations the sync orchestrator depends on.
///
/// `BitbucketClient` is the production implementation; tests drive the
/// orchestrator with a scripted one.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Open pull requests where the authenticated user is a reviewer.
    async fn fetch_review_requests(&self) -> Result<Vec<RawPullRequest>, AppError>;

    /// Open pull requests authored by the authenticated user.
    async fn fetch_authored_requests(&self) -> Result<Vec<RawPullRequest>, AppError>;

    /// Union of reviewer and authored PRs, deduplicated by id with the
    /// reviewer set winning.
    async fn fetch_all_relevant_requests(&self) -> Result<Vec<RawPullRequest>, AppError> {
        let reviewing = self.fetch_review_requests().await?;
        let authored = self.fetch_authored_requests().await?;
        Ok(dedup_pull_requests(reviewing, authored))
    }

    /// Flattened comment list for one PR. The production implementation
    /// degrades to an empty list when both comment paths fail; a scripted
    /// remote may return an error to exercise the skip-this-PR path.
    async fn fetch_comments(
        &self,
        project_key: &str,
        repo_slug: &str,
        pr_id: i64,
    ) -> Result<Vec<RawComment>, AppError>;

    /// Repositories the user touched recently, for display-name backfill.
    async fn fetch_recent_repositories(&self) -> Result<Vec<RawRepository>, AppError>;
}

/// Merge two PR listings, keeping the first occurrence of each id.
pub fn dedup_pull_requests(
    first: Vec<RawPullRequest>,
    second: Vec<RawPullRequest>,
) -> Vec<RawPullRequest> {
    let mut all = first;
    for pr in second {
        if !all.iter().any(|existing| existing.id == pr.id) {
            all.push(pr);
        }
    }
    all
}

/// Flatten nested reply trees into a single ordered list.
///
/// Depth-first with the parent before its replies. Iterative with an
/// explicit stack so adversarial reply depth cannot overflow the call
/// stack.
pub fn flatten_comment_tree(roots: Vec<RawComment>) -> Vec<RawComment> {
    let mut flat = Vec::new();
    let mut stack: Vec<RawComment> = roots.into_iter().rev().collect();

    while let Some(mut comment) = stack.pop() {
        let replies = comment.comments.take().unwrap_or_default();
        flat.push(comment);
        for reply in replies.into_iter().rev() {
            stack.push(reply);
        }
    }

    flat
}

impl BitbucketClient {
    /// Create a new Bitbucket client.
    pub fn new(config: BitbucketClientConfig) -> Result<Self, AppError> {
        if config.base_url.trim().is_empty() {
            return Err(AppError::invalid_input("Base URL must not be empty"));
        }

        let mut headers = header::HeaderMap::new();

        // Basic auth header from username:apiKey
        let auth = BASE64.encode(format!("{}:{}", config.username, config.api_key));
        let mut auth_value = header::HeaderValue::from_str(&format!("Basic {}", auth))
            .map_err(|_| AppError::authentication("Invalid credential format"))?;
        auth_value.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth_value);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Get the full URL for an API path.
    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/rest/api/latest{}",
            self.config.base_url.trim_end_matches('/'),
            path
        )
    }

    /// Handle API response errors.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: Response,
        endpoint: &str,
    ) -> Result<T, AppError> {
        let status = response.status();

        if status.is_success() {
            response
                .json::<T>()
                .await
                .map_err(|e| AppError::internal(format!("Failed to parse response: {}", e)))
        } else if status == StatusCode::UNAUTHORIZED {
            Err(AppError::authentication(
                "Bitbucket rejected the credentials. Check username and API key.",
            ))
        } else {
            let status_code = status.as_u16();
            let body = response.text().await.unwrap_or_default();
            // Bitbucket returns errors as {"errors":[{"message":"..."}]}
            let body_message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| {
                    v.get("errors")?
                        .get(0)?
                        .get("message")?
                        .as_str()
                        .map(String::from)
                });

            let message = match (status, &body_message) {
                (StatusCode::FORBIDDEN, _) => "Access denied".to_string(),
                (StatusCode::NOT_FOUND, _) => "Resource not found".to_string(),
                (StatusCode::TOO_MANY_REQUESTS, _) => "Rate limit exceeded".to_string(),
                (_, Some(msg)) => msg.clone(),
                _ => format!("Request failed ({}): {}", status_code, body),
            };

            Err(AppError::api_full(message, status_code, endpoint))
        }
    }

    /// Fetch all pages of a paged endpoint.
    async fn get_all_pages<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, AppError> {
        let mut all_values = Vec::new();
        let mut start = 0i64;

        loop {
            let url = self.api_url(endpoint);
            let response = self
                .client
                .get(&url)
                .query(query)
                .query(&[("start", start.to_string()), ("limit", "100".to_string())])
                .send()
                .await?;

            let page: PagedResponse<T> = self.handle_response(response, endpoint).await?;
            all_values.extend(page.values);

            match (page.is_last_page, page.next_page_start) {
                (Some(false), Some(next)) => start = next,
                _ => break,
            }
        }

        Ok(all_values)
    }

    /// List open pull requests for one repository.
    pub async fn fetch_repository_pull_requests(
        &self,
        project_key: &str,
        repo_slug: &str,
    ) -> Result<Vec<RawPullRequest>, AppError> {
        let endpoint = format!(
            "/projects/{}/repos/{}/pull-requests",
            urlencoding::encode(project_key),
            urlencoding::encode(repo_slug)
        );
        self.get_all_pages(&endpoint, &[("state", "OPEN")]).await
    }

    /// Primary comment path: the per-PR comments endpoint.
    async fn fetch_comments_direct(
        &self,
        project_key: &str,
        repo_slug: &str,
        pr_id: i64,
    ) -> Result<Vec<RawComment>, AppError> {
        let endpoint = format!(
            "/projects/{}/repos/{}/pull-requests/{}/comments",
            urlencoding::encode(project_key),
            urlencoding::encode(repo_slug),
            pr_id
        );
        let comments: Vec<RawComment> = self.get_all_pages(&endpoint, &[]).await?;
        Ok(flatten_comment_tree(comments))
    }

    /// Fallback comment path: filter the activity log down to comment
    /// activities and flatten their reply trees.
    async fn fetch_comments_from_activities(
        &self,
        project_key: &str,
        repo_slug: &str,
        pr_id: i64,
    ) -> Result<Vec<RawComment>, AppError> {
        let endpoint = format!(
            "/projects/{}/repos/{}/pull-requests/{}/activities",
            urlencoding::encode(project_key),
            urlencoding::encode(repo_slug),
            pr_id
        );
        let activities: Vec<RawActivity> = self.get_all_pages(&endpoint, &[]).await?;

        let roots: Vec<RawComment> = activities
            .into_iter()
            .filter(|a| a.action.as_deref() == Some("COMMENTED"))
            .filter_map(|a| a.comment)
            .collect();

        Ok(flatten_comment_tree(roots))
    }
}

#[async_trait]
impl RemoteSource for BitbucketClient {
    async fn fetch_review_requests(&self) -> Result<Vec<RawPullRequest>, AppError> {
        self.get_all_pages(
            "/dashboard/pull-requests",
            &[("state", "OPEN"), ("role", "REVIEWER")],
        )
        .await
    }

    async fn fetch_authored_requests(&self) -> Result<Vec<RawPullRequest>, AppError> {
        self.get_all_pages(
            "/dashboard/pull-requests",
            &[("state", "OPEN"), ("role", "AUTHOR")],
        )
        .await
    }

    async fn fetch_all_relevant_requests(&self) -> Result<Vec<RawPullRequest>, AppError> {
        // The two role queries have no ordering dependency, run them
        // concurrently
        let (reviewing, authored) =
            tokio::try_join!(self.fetch_review_requests(), self.fetch_authored_requests())?;
        Ok(dedup_pull_requests(reviewing, authored))
    }

    async fn fetch_comments(
        &self,
        project_key: &str,
        repo_slug: &str,
        pr_id: i64,
    ) -> Result<Vec<RawComment>, AppError> {
        match self
            .fetch_comments_direct(project_key, repo_slug, pr_id)
            .await
        {
            Ok(comments) => Ok(comments),
            Err(e) => {
                log::warn!(
                    "Comments endpoint failed for PR {} in {}/{}: {}, trying activities",
                    pr_id,
                    project_key,
                    repo_slug,
                    e
                );
                match self
                    .fetch_comments_from_activities(project_key, repo_slug, pr_id)
                    .await
                {
                    Ok(comments) => Ok(comments),
                    Err(e) => {
                        // An unreachable comment thread must not abort the
                        // whole sync
                        log::warn!(
                            "Activity fallback failed for PR {} in {}/{}: {}",
                            pr_id,
                            project_key,
                            repo_slug,
                            e
                        );
                        Ok(Vec::new())
                    }
                }
            }
        }
    }

    async fn fetch_recent_repositories(&self) -> Result<Vec<RawRepository>, AppError> {
        self.get_all_pages("/profile/recent/repos", &[]).await
    }
}
