//! Notification delivery adapter.
//!
//! The core does not talk to the OS notification center directly; it emits
//! discrete [`SyncEvent`]s over a channel whose receiver belongs to the
//! external delivery collaborator. This module applies the user's
//! notification preferences before anything reaches that channel and keeps
//! an in-memory history of what was delivered.

use crate::db::{self, DbPool, NOTIFICATION_SETTINGS_KEY};
use crate::error::AppError;
use crate::models::NotificationSettings;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex, RwLock};

/// Events emitted toward the external notification/badge sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// A comment not seen before arrived during a sync pass.
    NewComment {
        /// Human-readable summary, content already truncated.
        summary: String,
        /// Whether the sink should play a sound.
        sound: bool,
    },

    /// The global unread count changed.
    BadgeCount { count: usize },
}

/// One delivered notification, kept in history.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationRecord {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Preference-aware front of the notification sink channel.
pub struct Notifier {
    pool: DbPool,
    settings: RwLock<NotificationSettings>,
    history: Mutex<Vec<NotificationRecord>>,
    tx: mpsc::UnboundedSender<SyncEvent>,
}

impl Notifier {
    /// Create a notifier with default settings. Returns the receiver half
    /// of the sink channel for the external delivery mechanism.
    pub fn new(pool: DbPool) -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                pool,
                settings: RwLock::new(NotificationSettings::default()),
                history: Mutex::new(Vec::new()),
                tx,
            },
            rx,
        )
    }

    /// Restore persisted preference flags. An absent record keeps the
    /// defaults.
    pub async fn load_settings(&self) -> Result<(), AppError> {
        let Some(raw) = db::get_record(&self.pool, NOTIFICATION_SETTINGS_KEY)
            .await
            .map_err(|e| AppError::database(e.to_string()))?
        else {
            return Ok(());
        };

        let settings: NotificationSettings = serde_json::from_str(&raw)?;
        *self.settings.write().await = settings;
        Ok(())
    }

    /// Replace and persist the preference flags.
    pub async fn save_settings(&self, settings: NotificationSettings) -> Result<(), AppError> {
        let serialized = serde_json::to_string(&settings)?;
        db::put_record(&self.pool, NOTIFICATION_SETTINGS_KEY, &serialized)
            .await
            .map_err(|e| AppError::database(e.to_string()))?;
        *self.settings.write().await = settings;
        Ok(())
    }

    /// Current preference flags.
    pub async fn settings(&self) -> NotificationSettings {
        self.settings.read().await.clone()
    }

    /// Surface a new-comment notification, honoring the preference flags.
    pub async fn notify(&self, message: impl Into<String>) {
        let message = message.into();
        let settings = self.settings.read().await.clone();

        if settings.history_enabled {
            self.history.lock().await.push(NotificationRecord {
                message: message.clone(),
                timestamp: Utc::now(),
            });
        }

        if settings.show_notifications {
            // A dropped receiver means no sink is attached; not an error
            if self
                .tx
                .send(SyncEvent::NewComment {
                    summary: message,
                    sound: settings.sound_enabled,
                })
                .is_err()
            {
                log::debug!("Notification sink detached, event dropped");
            }
        }
    }

    /// Push the current global unread count to the badge sink.
    pub async fn update_badge(&self, count: usize) {
        if !self.settings.read().await.badge_enabled {
            return;
        }
        if self.tx.send(SyncEvent::BadgeCount { count }).is_err() {
            log::debug!("Badge sink detached, event dropped");
        }
    }

    /// History of delivered notifications, newest last.
    pub async fn history(&self) -> Vec<NotificationRecord> {
        self.history.lock().await.clone()
    }

    /// Drop all history entries.
    pub async fn clear_history(&self) {
        self.history.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn make_notifier(
        dir: &tempfile::TempDir,
    ) -> (Notifier, mpsc::UnboundedReceiver<SyncEvent>) {
        let pool = crate::db::initialize(&dir.path().join("test.db"))
            .await
            .unwrap();
        Notifier::new(pool)
    }

    #[tokio::test]
    async fn test_notify_records_history_and_emits() {
        let dir = tempdir().unwrap();
        let (notifier, mut rx) = make_notifier(&dir).await;

        notifier.notify("New comment on PROJ/repo/1: hi").await;

        let history = notifier.history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].message, "New comment on PROJ/repo/1: hi");

        match rx.try_recv().unwrap() {
            SyncEvent::NewComment { summary, sound } => {
                assert_eq!(summary, "New comment on PROJ/repo/1: hi");
                assert!(sound);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_disabled_notifications_still_record_history() {
        let dir = tempdir().unwrap();
        let (notifier, mut rx) = make_notifier(&dir).await;

        notifier
            .save_settings(NotificationSettings {
                show_notifications: false,
                ..Default::default()
            })
            .await
            .unwrap();

        notifier.notify("quiet").await;
        assert_eq!(notifier.history().await.len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_badge_respects_flag() {
        let dir = tempdir().unwrap();
        let (notifier, mut rx) = make_notifier(&dir).await;

        notifier.update_badge(3).await;
        assert_eq!(rx.try_recv().unwrap(), SyncEvent::BadgeCount { count: 3 });

        notifier
            .save_settings(NotificationSettings {
                badge_enabled: false,
                ..Default::default()
            })
            .await
            .unwrap();
        notifier.update_badge(4).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_settings_roundtrip() {
        let dir = tempdir().unwrap();
        let pool = crate::db::initialize(&dir.path().join("test.db"))
            .await
            .unwrap();

        let custom = NotificationSettings {
            show_notifications: false,
            badge_enabled: true,
            sound_enabled: false,
            history_enabled: false,
        };

        {
            let (notifier, _rx) = Notifier::new(pool.clone());
            notifier.save_settings(custom.clone()).await.unwrap();
        }

        let (reloaded, _rx) = Notifier::new(pool);
        reloaded.load_settings().await.unwrap();
        assert_eq!(reloaded.settings().await, custom);
    }

    #[tokio::test]
    async fn test_clear_history() {
        let dir = tempdir().unwrap();
        let (notifier, _rx) = make_notifier(&dir).await;

        notifier.notify("one").await;
        notifier.notify("two").await;
        assert_eq!(notifier.history().await.len(), 2);

        notifier.clear_history().await;
        assert!(notifier.history().await.is_empty());
    }
}
