//! Error types for the alert store.

use thiserror::Error;

/// Alert store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON column encoding/decoding error
    #[error("JSON column error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration error
    #[error("migration error: {0}")]
    Migration(String),

    /// Row contained a value outside the expected domain
    #[error("invalid row data: {0}")]
    InvalidRow(String),

    /// Connection lock could not be acquired
    #[error("connection lock poisoned: {0}")]
    Lock(String),

    /// Alert not found
    #[error("alert not found: {0}")]
    AlertNotFound(i64),
}

impl StoreError {
    /// Check if this error is retryable (e.g., database busy).
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Database(rusqlite::Error::SqliteFailure(e, _)) => {
                e.code == rusqlite::ErrorCode::DatabaseBusy
                    || e.code == rusqlite::ErrorCode::DatabaseLocked
            }
            _ => false,
        }
    }
}

/// Result type for alert store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
