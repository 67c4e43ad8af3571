//! Comment model for pull request discussions.

use serde::{Deserialize, Serialize};

/// A single comment on a pull request.
///
/// Comments are created the first time a sync observes them and are never
/// deleted afterwards; the only mutable field is the read flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    /// Server-assigned comment id, opaque to the core.
    pub id: String,

    /// Comment text (Markdown).
    pub content: String,

    /// Author display name.
    pub author: String,

    /// Creation timestamp (ISO 8601).
    pub created_on: String,

    /// Last update timestamp (ISO 8601).
    pub updated_on: String,

    /// Whether the local user has read this comment.
    #[serde(rename = "isRead")]
    pub read: bool,
}

impl Comment {
    /// Check if this comment was substituted for a payload that failed to
    /// convert.
    pub fn is_placeholder(&self) -> bool {
        self.id.starts_with("error-")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_placeholder() {
        let mut comment = Comment {
            id: "42".to_string(),
            content: "Looks good".to_string(),
            author: "Reviewer".to_string(),
            created_on: "2024-01-15T10:30:00+00:00".to_string(),
            updated_on: "2024-01-15T10:30:00+00:00".to_string(),
            read: false,
        };
        assert!(!comment.is_placeholder());

        comment.id = "error-a1b2c3".to_string();
        assert!(comment.is_placeholder());
    }

    #[test]
    fn test_serde_field_names() {
        let comment = Comment {
            id: "1".to_string(),
            content: "text".to_string(),
            author: "A".to_string(),
            created_on: "2024-01-15T10:30:00+00:00".to_string(),
            updated_on: "2024-01-15T10:30:00+00:00".to_string(),
            read: true,
        };
        let json = serde_json::to_string(&comment).unwrap();
        // Snapshot format matches the persisted record layout
        assert!(json.contains("\"isRead\":true"));
        assert!(json.contains("\"createdOn\""));
    }
}
