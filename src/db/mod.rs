//! SQLite-backed keyed record storage.
//!
//! The store persists its state as opaque keyed records (one JSON document
//! per key) rather than a relational schema: the snapshot is structural, not
//! versioned, and an absent record means first run. This module owns the
//! connection pool, the migration bookkeeping and the get/put primitives.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Type alias for the SQLite connection pool.
pub type DbPool = Pool<Sqlite>;

/// Record key for the repository tree snapshot.
pub const PR_DATA_KEY: &str = "pr-data";

/// Record key for the notification preference flags.
pub const NOTIFICATION_SETTINGS_KEY: &str = "notification-settings";

/// Database-related errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(String),
}

/// Get the path to the SQLite database file inside a data directory.
pub fn get_db_path(data_dir: &Path) -> PathBuf {
    data_dir.join("pr-notify.db")
}

/// Initialize the database: create the file if needed and run migrations.
///
/// Returns a connection pool configured with WAL mode.
pub async fn initialize(db_path: &Path) -> Result<DbPool, DbError> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| DbError::Migration(format!("Failed to create database directory: {}", e)))?;
    }

    let pool = create_pool(db_path).await?;
    run_migrations(&pool).await?;

    Ok(pool)
}

/// Create a connection pool with WAL mode enabled.
async fn create_pool(db_path: &Path) -> Result<DbPool, sqlx::Error> {
    let db_url = format!("sqlite:{}", db_path.display());

    let connect_options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        // WAL allows the badge reader to see snapshots mid-write
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    SqlitePoolOptions::new()
        .max_connections(5)
        .min_connections(1)
        .acquire_timeout(std::time::Duration::from_secs(10))
        .connect_with(connect_options)
        .await
}

/// Run all pending migrations.
async fn run_migrations(pool: &DbPool) -> Result<(), DbError> {
    let mut conn = pool.acquire().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            applied_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    let applied: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM _migrations WHERE name = '0001_initial_schema'")
            .fetch_optional(&mut *conn)
            .await?;

    if applied.is_none() {
        let migration_sql = include_str!("migrations/0001_initial_schema.sql");
        for statement in migration_sql.split(';') {
            let stmt: String = statement
                .lines()
                .filter(|l| !l.trim_start().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n");
            if !stmt.trim().is_empty() {
                sqlx::query(&stmt).execute(&mut *conn).await?;
            }
        }

        sqlx::query("INSERT INTO _migrations (name) VALUES ('0001_initial_schema')")
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

/// Fetch a keyed record. `None` means the record was never written.
pub async fn get_record(pool: &DbPool, key: &str) -> Result<Option<String>, DbError> {
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM records WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|(value,)| value))
}

/// Insert or replace a keyed record.
pub async fn put_record(pool: &DbPool, key: &str, value: &str) -> Result<(), DbError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    sqlx::query(
        r#"
        INSERT INTO records (key, value, updated_at)
        VALUES (?, ?, ?)
        ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(key)
    .bind(value)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_initialize_creates_database() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");

        let pool = initialize(&db_path).await.unwrap();
        assert!(db_path.exists());

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        let table_names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();
        assert!(table_names.contains(&"records"));
        assert!(table_names.contains(&"_migrations"));
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");

        let _pool1 = initialize(&db_path).await.unwrap();
        let pool2 = initialize(&db_path).await.unwrap();

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM _migrations")
            .fetch_one(&pool2)
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    async fn test_record_roundtrip() {
        let dir = tempdir().unwrap();
        let pool = initialize(&dir.path().join("test.db")).await.unwrap();

        // Absent record is None, not an error
        assert!(get_record(&pool, PR_DATA_KEY).await.unwrap().is_none());

        put_record(&pool, PR_DATA_KEY, r#"{"repositories":[]}"#)
            .await
            .unwrap();
        assert_eq!(
            get_record(&pool, PR_DATA_KEY).await.unwrap().as_deref(),
            Some(r#"{"repositories":[]}"#)
        );

        // Overwrite replaces in place
        put_record(&pool, PR_DATA_KEY, "{}").await.unwrap();
        assert_eq!(
            get_record(&pool, PR_DATA_KEY).await.unwrap().as_deref(),
            Some("{}")
        );
    }
}
