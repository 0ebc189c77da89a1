//! Service configuration.
//!
//! Defaults are rooted at `~/.tafweej/`; a YAML file can override any of
//! them. The monitor block carries the duplicate-suppression switch: by
//! default every qualifying pass inserts a fresh alert row even when an
//! open alert for the same stage already exists, and
//! `suppress_duplicate_open_alerts` turns on per-stage+priority
//! suppression instead. Both behaviors are exercised by tests.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TafweejError};

/// Default evaluation interval in seconds (5 minutes).
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;

/// Default gateway request timeout in seconds.
pub const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 10;

/// Configuration for the monitor scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between scheduled evaluation passes
    pub poll_interval_secs: u64,

    /// Suppress inserting an alert when an open one with the same
    /// stage and priority already exists
    pub suppress_duplicate_open_alerts: bool,

    /// Run an evaluation pass immediately on start
    pub run_on_start: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            suppress_duplicate_open_alerts: false,
            run_on_start: true,
        }
    }
}

impl MonitorConfig {
    /// Evaluation interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Set the poll interval in seconds.
    pub fn with_poll_interval_secs(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs;
        self
    }

    /// Set duplicate suppression.
    pub fn with_suppress_duplicates(mut self, suppress: bool) -> Self {
        self.suppress_duplicate_open_alerts = suppress;
        self
    }

    /// Set whether a pass runs immediately on start.
    pub fn with_run_on_start(mut self, run: bool) -> Self {
        self.run_on_start = run;
        self
    }
}

/// Notification gateway endpoints, one path per transport channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base URL of the delivery gateway
    pub base_url: String,

    /// Endpoint path for push notifications
    pub push_path: String,

    /// Endpoint path for SMS
    pub sms_path: String,

    /// Endpoint path for WhatsApp
    pub whatsapp_path: String,

    /// Endpoint path for email
    pub email_path: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8085".to_string(),
            push_path: "/send/push".to_string(),
            sms_path: "/send/sms".to_string(),
            whatsapp_path: "/send/whatsapp".to_string(),
            email_path: "/send/email".to_string(),
            timeout_secs: DEFAULT_GATEWAY_TIMEOUT_SECS,
        }
    }
}

impl GatewayConfig {
    /// Set the gateway base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the request timeout in seconds.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Directory of stage snapshot files
    pub stages_dir: PathBuf,

    /// Path of the alert database
    pub database_path: PathBuf,

    /// Delivery gateway endpoints
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Monitor scheduler settings
    #[serde(default)]
    pub monitor: MonitorConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let root = default_root_dir();
        Self {
            stages_dir: root.join("stages"),
            database_path: root.join("alerts.db"),
            gateway: GatewayConfig::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| TafweejError::Io {
            operation: "reading config file".to_string(),
            path: path.to_path_buf(),
            source: e,
        })?;

        serde_yaml::from_str(&content).map_err(|e| TafweejError::YamlParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load from a YAML file, falling back to defaults when it is absent.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write the configuration as YAML.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).map_err(|e| TafweejError::YamlParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        std::fs::write(path, content).map_err(|e| TafweejError::Io {
            operation: "writing config file".to_string(),
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Default config file location (`~/.tafweej/config.yaml`).
    pub fn default_path() -> PathBuf {
        default_root_dir().join("config.yaml")
    }
}

/// Root data directory (`~/.tafweej`, or the cwd when HOME is unset).
fn default_root_dir() -> PathBuf {
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home).join(".tafweej"),
        Err(_) => PathBuf::from(".tafweej"),
    }
}
