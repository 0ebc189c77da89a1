//! TAFWEEJ - Pilgrim-flow stage monitoring service
//!
//! A long-lived daemon that watches cohort-movement stages, classifies
//! their health against the alert policy, persists operational alerts, and
//! fans out notifications.
//!
//! ## Usage
//!
//! ```bash
//! # Start the monitor with defaults (~/.tafweej/)
//! tafweej
//!
//! # With verbose logging
//! tafweej -v
//!
//! # With a config file and overridden stage directory
//! tafweej --config /etc/tafweej.yaml --stages-dir /var/lib/tafweej/stages
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use tafweej_core::{init_logging, LogGuard, ServiceConfig, TafweejError};
use tafweej_monitor::{FileStageRepository, StageMonitor};
use tafweej_notify::NotificationDispatcher;
use tafweej_store::{AlertDatabase, SqliteAlertStore};

/// TAFWEEJ stage monitoring daemon
///
/// Watches pilgrim-flow stages, raises operational alerts when stages
/// approach or exceed their time and capacity thresholds, and dispatches
/// notifications through the configured delivery gateway.
#[derive(Parser, Debug)]
#[command(name = "tafweej")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging (increases log level)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file (defaults to ~/.tafweej/config.yaml)
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Directory for log files (defaults to ~/.tafweej/logs/)
    #[arg(long)]
    log_dir: Option<std::path::PathBuf>,

    /// Override the stage snapshot directory
    #[arg(long)]
    stages_dir: Option<std::path::PathBuf>,

    /// Override the alert database path
    #[arg(long)]
    database: Option<std::path::PathBuf>,

    /// Override the evaluation interval in seconds
    #[arg(long)]
    poll_interval_secs: Option<u64>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match setup_logging(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::from(1);
        }
    };

    info!("starting TAFWEEJ");

    match run_daemon(&cli) {
        Ok(()) => {
            info!("TAFWEEJ exited normally");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("TAFWEEJ error: {}", e);
            eprintln!("Error: {}", e);
            ExitCode::from(1)
        }
    }
}

/// Set up logging based on CLI arguments.
fn setup_logging(cli: &Cli) -> tafweej_core::Result<LogGuard> {
    let verbose = cli.verbose > 0;
    init_logging(cli.log_dir.clone(), verbose)
}

/// Resolve configuration from the file plus CLI overrides.
fn load_config(cli: &Cli) -> tafweej_core::Result<ServiceConfig> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(ServiceConfig::default_path);
    let mut config = ServiceConfig::load_or_default(&path)?;

    if let Some(dir) = &cli.stages_dir {
        config.stages_dir = dir.clone();
    }
    if let Some(db) = &cli.database {
        config.database_path = db.clone();
    }
    if let Some(secs) = cli.poll_interval_secs {
        config.monitor.poll_interval_secs = secs;
    }

    Ok(config)
}

/// Build the runtime, wire the collaborators, and run until interrupted.
fn run_daemon(cli: &Cli) -> tafweej_core::Result<()> {
    let config = load_config(cli)?;

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| TafweejError::internal(format!("failed to build tokio runtime: {e}")))?;

    runtime.block_on(async {
        if let Some(parent) = config.database_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TafweejError::DirectoryCreation {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let db = Arc::new(AlertDatabase::open(&config.database_path).map_err(|e| {
            TafweejError::internal(format!(
                "failed to open alert database {}: {e}",
                config.database_path.display()
            ))
        })?);
        let store = Arc::new(SqliteAlertStore::new(db));

        let dispatcher = Arc::new(
            NotificationDispatcher::from_gateway_config(store.clone(), &config.gateway)
                .map_err(|e| TafweejError::internal(format!("failed to build dispatcher: {e}")))?,
        );

        let repository = Arc::new(FileStageRepository::new(config.stages_dir.clone())?);

        let mut monitor = StageMonitor::new(repository, store, dispatcher, config.monitor.clone());
        monitor.start().await;

        info!(
            stages_dir = %config.stages_dir.display(),
            database = %config.database_path.display(),
            "monitor running, press ctrl-c to stop"
        );

        tokio::signal::ctrl_c()
            .await
            .map_err(|e| TafweejError::internal(format!("failed to listen for ctrl-c: {e}")))?;

        info!("shutdown requested");
        monitor.stop();

        Ok(())
    })
}
