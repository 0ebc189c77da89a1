//! Logging infrastructure for TAFWEEJ.
//!
//! Structured logging through the `tracing` ecosystem: JSON lines to a
//! daily-rolled file for machine parsing, plus a compact human-readable
//! console layer on stderr. The monitor is a long-lived service, so the
//! file log is the primary record of what each evaluation pass decided.
//!
//! ## Example
//!
//! ```no_run
//! use tafweej_core::logging;
//!
//! // Initialize logging (call once at startup)
//! let _guard = logging::init_logging(None, false).expect("logging init");
//!
//! tracing::info!("monitor started");
//! tracing::debug!(stage_id = 12, "evaluating stage");
//! ```

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::error::{Result, TafweejError};

/// Guard that must be held to ensure log flushing on shutdown.
///
/// When this guard is dropped, pending log entries are flushed. Keep it
/// alive for the lifetime of the application.
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the TAFWEEJ logging system.
///
/// Sets up file logging to `<log_dir>/tafweej.log` (JSON lines, daily
/// rotation) and console logging to stderr.
///
/// # Arguments
///
/// * `log_dir` - Optional custom log directory. Defaults to `~/.tafweej/logs/`
/// * `verbose` - If true, sets log level to DEBUG. Otherwise uses INFO.
pub fn init_logging(log_dir: Option<PathBuf>, verbose: bool) -> Result<LogGuard> {
    let log_dir = match log_dir {
        Some(dir) => dir,
        None => default_log_dir()?,
    };

    std::fs::create_dir_all(&log_dir).map_err(|e| TafweejError::DirectoryCreation {
        path: log_dir.clone(),
        source: e,
    })?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "tafweej.log");
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tafweej={default_level}")));

    // JSON layer for file output
    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .json()
        .with_span_events(FmtSpan::CLOSE)
        .with_current_span(true)
        .with_span_list(true);

    // Human-readable layer for console output
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(verbose)
        .with_line_number(verbose)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    tracing::debug!(log_dir = %log_dir.display(), verbose, "logging initialized");

    Ok(LogGuard {
        _file_guard: Some(file_guard),
    })
}

/// Initialize minimal console-only logging for testing.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

/// Get the default log directory path (`~/.tafweej/logs/`).
pub fn default_log_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").map_err(|_| TafweejError::Internal {
        message: "HOME environment variable not set".into(),
    })?;

    Ok(PathBuf::from(home).join(".tafweej").join("logs"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_dir_under_home() {
        if std::env::var("HOME").is_err() {
            return;
        }
        let dir = default_log_dir().unwrap();
        assert!(dir.ends_with(".tafweej/logs"));
    }

    #[test]
    fn test_init_test_logging() {
        // Should not panic when called repeatedly
        init_test_logging();
        init_test_logging();
    }
}
