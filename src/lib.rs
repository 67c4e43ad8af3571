//! Core sync engine for a Bitbucket Server pull-request review notifier.
//!
//! Polls the Bitbucket dashboard for open pull requests the user reviews or
//! authored, merges remote state into a local model that preserves
//! per-comment read flags, and emits a notification event for every comment
//! that is new since the previous pass. The local model is cached in SQLite
//! so unread state survives restarts.

pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod store;

pub use error::AppError;
