//! Error types for notification delivery.

use thiserror::Error;

/// Notification delivery errors.
///
/// Every variant is scoped to a single channel attempt; the dispatcher
/// never lets one channel's failure touch another channel or the alert
/// row itself.
#[derive(Error, Debug)]
pub enum NotifyError {
    /// Gateway request timed out
    #[error("gateway request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// Could not reach the gateway
    #[error("gateway connection failed: {0}")]
    ConnectionFailed(String),

    /// Gateway answered with a non-success status
    #[error("gateway returned {status}: {body}")]
    GatewayStatus { status: u16, body: String },

    /// Payload could not be serialized
    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No sender registered for the requested channel
    #[error("no sender registered for channel {0}")]
    UnknownChannel(String),

    /// HTTP client construction failed
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),
}

impl NotifyError {
    /// Classify a reqwest failure into the local taxonomy.
    pub fn from_request_error(error: reqwest::Error, timeout_secs: u64) -> Self {
        if error.is_timeout() {
            Self::Timeout { timeout_secs }
        } else {
            Self::ConnectionFailed(error.to_string())
        }
    }

    /// True when the same attempt might succeed on a later pass.
    ///
    /// No retry happens inside a pass either way; the next evaluation
    /// re-raises the alert while the underlying condition persists.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::ConnectionFailed(_) => true,
            Self::GatewayStatus { status, .. } => *status >= 500,
            Self::Serialization(_) | Self::UnknownChannel(_) | Self::ClientBuild(_) => false,
        }
    }
}

/// Result type for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;
