//! # tafweej-core
//!
//! Core types, errors, and the alert policy engine for the TAFWEEJ
//! pilgrim-flow monitoring system.
//!
//! This crate provides:
//! - [`TafweejError`] - Error types shared across the TAFWEEJ crates
//! - [`types`] - Stage and alert data model
//! - [`clock`] - Deadline arithmetic over stored date/time pairs
//! - [`policy`] - The pure classification policies ([`policy::classify`]
//!   and [`policy::needs_attention`])
//! - [`stages`] / [`watcher`] - Stage snapshot reading and change watching
//! - [`repo`] - Collaborator traits the monitor depends on
//! - [`config`] - Service configuration
//! - [`logging`] - Tracing setup
//!
//! ## Example
//!
//! ```no_run
//! use chrono::Utc;
//! use tafweej_core::policy;
//! use tafweej_core::types::{Stage, StageStatus};
//!
//! fn main() -> tafweej_core::Result<()> {
//!     let mut stage = Stage::new(1, "Mina to Arafat", StageStatus::Active);
//!     stage.end_date = "2025-06-05".to_string();
//!     stage.end_time = "17:00".to_string();
//!
//!     let analysis = policy::classify(&stage, Utc::now())?;
//!     if analysis.needs_alert {
//!         println!("{}", analysis.message);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod policy;
pub mod repo;
pub mod stages;
pub mod types;
pub mod watcher;

// Re-export main types for convenience
pub use config::{GatewayConfig, MonitorConfig, ServiceConfig};
pub use error::{Result, TafweejError};
pub use logging::{init_logging, LogGuard};
pub use policy::{classify, needs_attention, AlertAnalysis, AttentionFinding, AttentionKind};
pub use repo::{AlertStore, NewNotification, NotificationLog, StageChange, StageRepository};
pub use stages::StageReader;
pub use types::{Alert, AlertMetadata, AlertPriority, NewAlert, NotificationChannel, Stage, StageStatus};
pub use watcher::{StageFileEvent, StageWatcher, StageWatcherConfig};
