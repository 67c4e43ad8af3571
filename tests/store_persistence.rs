//! Verifies that the cached PR model and notification settings survive a
//! process restart: everything is reloaded from SQLite by a fresh store,
//! including per-comment read flags and the last sync timestamp.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use pr_notify_core::db;
use pr_notify_core::models::{Comment, NotificationSettings, PullRequest, Repository};
use pr_notify_core::services::Notifier;
use pr_notify_core::store::PrStore;

fn comment(id: &str, content: &str, read: bool) -> Comment {
    Comment {
        id: id.to_string(),
        content: content.to_string(),
        author: "Rita Reviewer".to_string(),
        created_on: "2026-08-01T10:00:00+00:00".to_string(),
        updated_on: "2026-08-01T10:00:00+00:00".to_string(),
        read,
    }
}

fn pull_request(id: &str, repo_path: &str, comments: Vec<Comment>) -> PullRequest {
    let mut pr = PullRequest {
        id: id.to_string(),
        title: format!("PR {}", id),
        author: "Alice Author".to_string(),
        repository: repo_path.to_string(),
        created_on: "2026-08-01T09:00:00+00:00".to_string(),
        updated_on: "2026-08-01T10:00:00+00:00".to_string(),
        status: "OPEN".to_string(),
        comments,
        unread_count: 0,
        approved: false,
        approval_status: "UNAPPROVED".to_string(),
    };
    pr.recompute_unread();
    pr
}

#[tokio::test]
async fn test_model_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("persistence.db");

    {
        let pool = db::initialize(&db_path).await.unwrap();
        let store = PrStore::new(pool);

        let mut repo = Repository::provisional("PROJ/backend");
        repo.name = "Backend Service".to_string();
        store.upsert_repository(repo).await;
        store
            .upsert_pull_request(
                "PROJ/backend",
                pull_request(
                    "42",
                    "PROJ/backend",
                    vec![comment("1", "seen this", true), comment("2", "not yet", false)],
                ),
            )
            .await;

        let sync_time = Utc.with_ymd_and_hms(2026, 8, 26, 12, 0, 0).unwrap();
        store.set_last_sync_time(sync_time).await;
    }

    let pool = db::initialize(&db_path).await.unwrap();
    let store = PrStore::new(pool);
    assert!(store.load().await.unwrap());

    let repo = store.find_repository("PROJ/backend").await.unwrap();
    assert_eq!(repo.name, "Backend Service");
    assert_eq!(repo.unread_count, 1);

    let pr = store.find_pull_request("PROJ/backend", "42").await.unwrap();
    assert!(pr.find_comment("1").unwrap().read);
    assert!(!pr.find_comment("2").unwrap().read);
    assert_eq!(pr.unread_count, 1);

    let sync_time = store.last_sync_time().await.unwrap();
    assert_eq!(sync_time, Utc.with_ymd_and_hms(2026, 8, 26, 12, 0, 0).unwrap());
}

#[tokio::test]
async fn test_load_without_snapshot_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let pool = db::initialize(&dir.path().join("fresh.db")).await.unwrap();

    let store = PrStore::new(pool);
    assert!(!store.load().await.unwrap());
    assert!(store.repositories().await.is_empty());
    assert!(store.last_sync_time().await.is_none());
    assert_eq!(store.total_unread_count().await, 0);
}

#[tokio::test]
async fn test_read_flag_change_persists_across_stores() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("read-flags.db");
    let pool = db::initialize(&db_path).await.unwrap();

    let store = Arc::new(PrStore::new(pool.clone()));
    store
        .upsert_pull_request(
            "PROJ/web",
            pull_request("7", "PROJ/web", vec![comment("10", "ping", false)]),
        )
        .await;
    store
        .set_comment_read("PROJ/web", "7", "10", true)
        .await
        .unwrap();

    let reopened = PrStore::new(pool);
    assert!(reopened.load().await.unwrap());
    let pr = reopened.find_pull_request("PROJ/web", "7").await.unwrap();
    assert!(pr.find_comment("10").unwrap().read);
    assert_eq!(reopened.total_unread_count().await, 0);
}

#[tokio::test]
async fn test_mark_all_read_persists() {
    let dir = tempfile::tempdir().unwrap();
    let pool = db::initialize(&dir.path().join("mark-all.db")).await.unwrap();

    let store = PrStore::new(pool.clone());
    store
        .upsert_pull_request(
            "PROJ/web",
            pull_request(
                "9",
                "PROJ/web",
                vec![comment("1", "a", false), comment("2", "b", false)],
            ),
        )
        .await;
    store.mark_all_read("PROJ/web", "9").await.unwrap();

    let reopened = PrStore::new(pool);
    reopened.load().await.unwrap();
    let pr = reopened.find_pull_request("PROJ/web", "9").await.unwrap();
    assert_eq!(pr.unread_count, 0);
    assert!(pr.comments.iter().all(|c| c.read));
}

#[tokio::test]
async fn test_notification_settings_roundtrip_across_notifiers() {
    let dir = tempfile::tempdir().unwrap();
    let pool = db::initialize(&dir.path().join("settings.db")).await.unwrap();

    let (notifier, _events) = Notifier::new(pool.clone());
    let custom = NotificationSettings {
        show_notifications: false,
        badge_enabled: true,
        sound_enabled: false,
        history_enabled: true,
    };
    notifier.save_settings(custom.clone()).await.unwrap();

    let (reloaded, _events) = Notifier::new(pool);
    reloaded.load_settings().await.unwrap();
    let settings = reloaded.settings().await;
    assert!(!settings.show_notifications);
    assert!(!settings.sound_enabled);
    assert!(settings.badge_enabled);
    assert!(settings.history_enabled);
}
