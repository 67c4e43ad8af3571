//! Data models for the sync core.
//!
//! These are the canonical local entities the reconciliation store owns.
//! They serialize to the JSON snapshot record persisted in SQLite, so the
//! serde field names are part of the on-disk format.

pub mod comment;
pub mod notification_settings;
pub mod pull_request;
pub mod repository;

// Re-exports for convenient access
pub use comment::Comment;
pub use notification_settings::NotificationSettings;
pub use pull_request::{approval_summary, PullRequest};
pub use repository::Repository;
