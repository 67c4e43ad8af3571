//! Notification preference flags.

use serde::{Deserialize, Serialize};

/// User preferences for how sync results are surfaced.
///
/// Persisted as the `notification-settings` keyed record. An absent record
/// means defaults, not an error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationSettings {
    /// Forward new-comment events to the OS notification sink.
    pub show_notifications: bool,

    /// Forward unread-count changes to the badge sink.
    pub badge_enabled: bool,

    /// Ask the sink to play a sound with each notification.
    pub sound_enabled: bool,

    /// Keep an in-memory history of delivered notifications.
    pub history_enabled: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            show_notifications: true,
            badge_enabled: true,
            sound_enabled: true,
            history_enabled: true,
        }
    }
}
