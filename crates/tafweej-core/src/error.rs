//! Error types for TAFWEEJ operations.
//!
//! This module defines [`TafweejError`], the error enum shared by the core
//! crates. Failures are contained locally: a stage with a bad timestamp or a
//! channel that refuses delivery never aborts the surrounding evaluation
//! pass, so most variants here are logged-and-skipped rather than fatal.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`TafweejError`].
pub type Result<T> = std::result::Result<T, TafweejError>;

/// Comprehensive error type for core TAFWEEJ operations.
#[derive(Debug, Error)]
pub enum TafweejError {
    // =========================================================================
    // Stage Data Errors
    // =========================================================================
    /// A stage carries a date/time pair that cannot be parsed
    #[error("Invalid time format for stage: date={date} time={time}: {message}")]
    InvalidTimeFormat {
        date: String,
        time: String,
        message: String,
    },

    /// Stage snapshot file could not be parsed
    #[error("Invalid stage file {path}: {message}")]
    StageFileParse { path: PathBuf, message: String },

    /// Stage not found in the repository
    #[error("Stage not found: {stage_id}")]
    StageNotFound { stage_id: i64 },

    // =========================================================================
    // Collaborator Errors
    // =========================================================================
    /// The stage repository could not be reached or queried
    #[error("Stage repository unavailable: {message}")]
    RepositoryUnavailable { message: String },

    /// Persisting an alert failed
    #[error("Failed to persist alert for stage {stage_id}: {message}")]
    AlertPersistence { stage_id: i64, message: String },

    /// A single notification channel failed to deliver
    #[error("Delivery failed on channel {channel}: {message}")]
    ChannelDelivery { channel: String, message: String },

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Generic I/O error with context
    #[error("I/O error {operation}: {path}")]
    Io {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory creation failed
    #[error("Failed to create directory: {path}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // =========================================================================
    // Parsing Errors
    // =========================================================================
    /// JSON parsing error
    #[error("JSON parse error in {context}: {message}")]
    JsonParse {
        context: String,
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// YAML configuration parsing error
    #[error("YAML parse error in {path}: {message}")]
    YamlParse { path: PathBuf, message: String },

    // =========================================================================
    // Watcher Errors
    // =========================================================================
    /// Stage change watcher initialization failed
    #[error("Failed to initialize stage watcher: {message}")]
    WatcherInit { message: String },

    /// Stage change watcher runtime error
    #[error("Stage watcher error: {message}")]
    WatcherError { message: String },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal error (bug in TAFWEEJ)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl TafweejError {
    // =========================================================================
    // Constructor helpers for common error patterns
    // =========================================================================

    /// Create an InvalidTimeFormat error.
    pub fn invalid_time_format(
        date: impl Into<String>,
        time: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidTimeFormat {
            date: date.into(),
            time: time.into(),
            message: message.into(),
        }
    }

    /// Create a RepositoryUnavailable error.
    pub fn repository_unavailable(message: impl Into<String>) -> Self {
        Self::RepositoryUnavailable {
            message: message.into(),
        }
    }

    /// Create an AlertPersistence error.
    pub fn alert_persistence(stage_id: i64, message: impl Into<String>) -> Self {
        Self::AlertPersistence {
            stage_id,
            message: message.into(),
        }
    }

    /// Create a ChannelDelivery error.
    pub fn channel_delivery(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ChannelDelivery {
            channel: channel.into(),
            message: message.into(),
        }
    }

    /// Create an I/O error.
    pub fn io(operation: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    /// Create a JSON parse error.
    pub fn json_parse(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::JsonParse {
            context: context.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    // =========================================================================
    // Error classification helpers
    // =========================================================================

    /// Returns true if the failing operation heals itself on the next
    /// scheduled pass (the condition that produced it is re-evaluated).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidTimeFormat { .. }
                | Self::RepositoryUnavailable { .. }
                | Self::AlertPersistence { .. }
                | Self::ChannelDelivery { .. }
                | Self::WatcherError { .. }
        )
    }

    /// Returns true if this error must not abort the pass for other
    /// stages or channels.
    pub fn is_contained(&self) -> bool {
        matches!(
            self,
            Self::InvalidTimeFormat { .. }
                | Self::StageFileParse { .. }
                | Self::AlertPersistence { .. }
                | Self::ChannelDelivery { .. }
        )
    }

    /// Returns true if this error relates to stage snapshot data.
    pub fn is_stage_data_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidTimeFormat { .. } | Self::StageFileParse { .. } | Self::StageNotFound { .. }
        )
    }
}
