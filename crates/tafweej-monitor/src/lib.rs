//! # tafweej-monitor
//!
//! The stage monitor scheduler for TAFWEEJ.
//!
//! This crate provides:
//! - [`StageMonitor`] - the owned-instance scheduler (periodic sweep +
//!   reactive change subscription)
//! - [`FileStageRepository`] - stage repository over the snapshot directory
//! - [`PassSummary`] - per-pass outcome counts

pub mod file_repo;
pub mod monitor;

pub use file_repo::FileStageRepository;
pub use monitor::{PassSummary, StageMonitor};
