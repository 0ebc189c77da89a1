//! Stage snapshot reader for `<stages_dir>/*.json`.
//!
//! The operational workflow that admits and moves pilgrim cohorts maintains
//! one JSON snapshot file per stage. This module reads those snapshots,
//! handling missing files, invalid JSON, and partial data gracefully: a
//! corrupt file is logged and skipped for the current pass, never fatal.
//!
//! ## Example
//!
//! ```no_run
//! use tafweej_core::stages::StageReader;
//!
//! fn main() -> tafweej_core::Result<()> {
//!     let reader = StageReader::new(None)?;
//!
//!     for stage in reader.read_all()? {
//!         println!("{}: {}", stage.name, stage.status);
//!     }
//!
//!     Ok(())
//! }
//! ```

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Result, TafweejError};
use crate::types::{Stage, StageStatus};

/// Reader for stage snapshot files.
#[derive(Debug, Clone)]
pub struct StageReader {
    /// Directory containing stage snapshot files
    stages_dir: PathBuf,
}

impl StageReader {
    /// Create a new StageReader.
    ///
    /// If `stages_dir` is None, uses the default `~/.tafweej/stages/`
    /// directory.
    pub fn new(stages_dir: Option<PathBuf>) -> Result<Self> {
        let stages_dir = match stages_dir {
            Some(dir) => dir,
            None => Self::default_stages_dir()?,
        };

        debug!(dir = %stages_dir.display(), "StageReader initialized");

        Ok(Self { stages_dir })
    }

    /// Get the default stages directory (`~/.tafweej/stages/`).
    pub fn default_stages_dir() -> Result<PathBuf> {
        let home = std::env::var("HOME").map_err(|_| TafweejError::Internal {
            message: "HOME environment variable not set".into(),
        })?;

        Ok(PathBuf::from(home).join(".tafweej").join("stages"))
    }

    /// Get the path to a stage's snapshot file.
    pub fn stage_file_path(&self, stage_id: i64) -> PathBuf {
        self.stages_dir.join(format!("{}.json", stage_id))
    }

    /// Read a specific stage's snapshot.
    ///
    /// Returns `None` if the file doesn't exist. A corrupt file is an
    /// error so callers can distinguish it from absence.
    pub fn read_stage(&self, stage_id: i64) -> Result<Option<Stage>> {
        let path = self.stage_file_path(stage_id);

        if !path.exists() {
            debug!(stage_id, "stage file not found");
            return Ok(None);
        }

        parse_stage_file(&path).map(Some)
    }

    /// Read all stage snapshots in the stages directory.
    ///
    /// Corrupt files are logged and skipped; the stage retries on the next
    /// pass once the workflow rewrites it. Returns an empty list when the
    /// directory doesn't exist yet.
    pub fn read_all(&self) -> Result<Vec<Stage>> {
        if !self.stages_dir.exists() {
            debug!(dir = %self.stages_dir.display(), "stages directory does not exist");
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&self.stages_dir).map_err(|e| TafweejError::Io {
            operation: "reading stages directory".to_string(),
            path: self.stages_dir.clone(),
            source: e,
        })?;

        let mut stages = Vec::new();

        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "failed to read directory entry");
                    continue;
                }
            };

            let path = entry.path();

            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            match parse_stage_file(&path) {
                Ok(stage) => stages.push(stage),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unparsable stage file");
                }
            }
        }

        // Sort by id for consistent ordering
        stages.sort_by_key(|s| s.id);

        debug!(count = stages.len(), "read stage snapshots");
        Ok(stages)
    }

    /// Read all stages whose status is in `filter`.
    pub fn read_with_status(&self, filter: &[StageStatus]) -> Result<Vec<Stage>> {
        let mut stages = self.read_all()?;
        stages.retain(|s| filter.contains(&s.status));
        Ok(stages)
    }

    /// List stage IDs from snapshot filenames without parsing file bodies.
    pub fn list_stage_ids(&self) -> Result<Vec<i64>> {
        if !self.stages_dir.exists() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&self.stages_dir).map_err(|e| TafweejError::Io {
            operation: "listing stages directory".to_string(),
            path: self.stages_dir.clone(),
            source: e,
        })?;

        let mut ids = Vec::new();

        for entry in entries.flatten() {
            let path = entry.path();

            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<i64>().ok())
            {
                ids.push(id);
            }
        }

        ids.sort_unstable();
        Ok(ids)
    }

    /// Directory being read.
    pub fn stages_dir(&self) -> &Path {
        &self.stages_dir
    }
}

/// Parse a snapshot file into a Stage.
pub(crate) fn parse_stage_file(path: &Path) -> Result<Stage> {
    let content = std::fs::read_to_string(path).map_err(|e| TafweejError::Io {
        operation: "reading stage file".to_string(),
        path: path.to_path_buf(),
        source: e,
    })?;

    serde_json::from_str(&content).map_err(|e| TafweejError::StageFileParse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
