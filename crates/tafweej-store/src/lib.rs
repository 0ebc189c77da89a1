//! # tafweej-store
//!
//! SQLite persistence for TAFWEEJ alerts and the notification outbox.
//!
//! This crate provides:
//! - [`AlertDatabase`] - the rusqlite-backed store (alerts + notifications)
//! - [`SqliteAlertStore`] - adapter implementing the core
//!   `AlertStore`/`NotificationLog` collaborator traits
//! - [`StoreError`] - store error types

pub mod adapter;
pub mod db;
pub mod error;

pub use adapter::SqliteAlertStore;
pub use db::{AlertDatabase, NotificationRecord, NotificationStatus};
pub use error::{Result, StoreError};
