pub mod bitbucket_client;
pub mod convert;
pub mod notifier;
pub mod sync_engine;

pub use bitbucket_client::{BitbucketClient, BitbucketClientConfig, RemoteSource};
pub use notifier::{NotificationRecord, Notifier, SyncEvent};
pub use sync_engine::{SyncEngine, SyncResult, SyncStatus, DEFAULT_SYNC_INTERVAL_SECS};
