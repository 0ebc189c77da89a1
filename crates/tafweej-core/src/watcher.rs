//! Real-time file watching for stage snapshot updates.
//!
//! The operational workflow rewrites `<stages_dir>/<id>.json` whenever a
//! stage mutates. This module watches that directory with the `notify`
//! crate, debouncing rapid rewrites, and emits typed events on a tokio
//! channel. It is the concrete transport behind the abstract stage-change
//! subscription; the monitor never touches `notify` directly, so the feed
//! can be replaced by any other pub/sub mechanism.
//!
//! ## Example
//!
//! ```no_run
//! use tafweej_core::watcher::{StageFileEvent, StageWatcher};
//!
//! #[tokio::main]
//! async fn main() -> tafweej_core::Result<()> {
//!     let (_watcher, mut rx) = StageWatcher::new(None)?;
//!
//!     while let Some(event) = rx.recv().await {
//!         match event {
//!             StageFileEvent::Created { stage, .. } => println!("new stage {}", stage.name),
//!             StageFileEvent::Modified { stage, .. } => println!("updated {}", stage.name),
//!             StageFileEvent::Removed { stage_id } => println!("removed {stage_id}"),
//!             StageFileEvent::Error { stage_id, error } => eprintln!("{stage_id}: {error}"),
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, RecommendedCache};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::{Result, TafweejError};
use crate::stages::{parse_stage_file, StageReader};
use crate::types::Stage;

/// Default debounce duration in milliseconds.
///
/// The workflow often rewrites a snapshot twice in quick succession
/// (counts, then status); 50ms coalesces those into one event.
pub const DEFAULT_DEBOUNCE_MS: u64 = 50;

/// Default channel buffer size for events.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Event types emitted by the stage watcher.
#[derive(Debug, Clone)]
pub enum StageFileEvent {
    /// A new stage snapshot file appeared.
    Created {
        stage_id: i64,
        stage: Stage,
    },

    /// An existing stage snapshot was rewritten.
    Modified {
        stage_id: i64,
        stage: Stage,
    },

    /// A stage snapshot file was removed.
    Removed {
        stage_id: i64,
    },

    /// A snapshot could not be read or parsed.
    ///
    /// Non-fatal; other stages continue to be watched.
    Error {
        stage_id: i64,
        error: String,
    },
}

impl StageFileEvent {
    /// Stage ID associated with this event.
    pub fn stage_id(&self) -> i64 {
        match self {
            Self::Created { stage_id, .. }
            | Self::Modified { stage_id, .. }
            | Self::Removed { stage_id }
            | Self::Error { stage_id, .. } => *stage_id,
        }
    }

    /// Returns true if this is an error event.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// Configuration for the stage watcher.
#[derive(Debug, Clone)]
pub struct StageWatcherConfig {
    /// Directory to watch
    pub stages_dir: PathBuf,

    /// Debounce duration for coalescing rapid rewrites
    pub debounce_duration: Duration,

    /// Channel buffer size for events
    pub channel_buffer: usize,

    /// Whether to emit the current directory contents on startup
    pub emit_initial_state: bool,
}

impl StageWatcherConfig {
    /// Create a new config with the given stages directory.
    pub fn new(stages_dir: PathBuf) -> Self {
        Self {
            stages_dir,
            debounce_duration: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            channel_buffer: DEFAULT_CHANNEL_BUFFER,
            emit_initial_state: false,
        }
    }

    /// Create a config with the default stages directory.
    pub fn default_config() -> Result<Self> {
        let stages_dir = StageReader::default_stages_dir()?;
        Ok(Self::new(stages_dir))
    }

    /// Set the debounce duration.
    pub fn with_debounce(mut self, duration: Duration) -> Self {
        self.debounce_duration = duration;
        self
    }

    /// Set the channel buffer size.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.channel_buffer = size;
        self
    }

    /// Set whether to emit initial state on startup.
    pub fn with_initial_state(mut self, emit: bool) -> Self {
        self.emit_initial_state = emit;
        self
    }
}

/// Debounced filesystem watcher over the stages directory.
///
/// Keep the watcher alive for as long as events are wanted; dropping it
/// cancels the subscription and closes the receiver.
pub struct StageWatcher {
    /// The underlying debounced watcher
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,

    /// Directory being watched
    stages_dir: PathBuf,
}

impl StageWatcher {
    /// Create a new stage watcher with default configuration.
    ///
    /// Returns the watcher and a receiver for stage file events.
    pub fn new(stages_dir: Option<PathBuf>) -> Result<(Self, mpsc::Receiver<StageFileEvent>)> {
        let config = match stages_dir {
            Some(dir) => StageWatcherConfig::new(dir),
            None => StageWatcherConfig::default_config()?,
        };

        Self::with_config(config)
    }

    /// Create a new stage watcher with custom configuration.
    pub fn with_config(
        config: StageWatcherConfig,
    ) -> Result<(Self, mpsc::Receiver<StageFileEvent>)> {
        let (event_tx, event_rx) = mpsc::channel(config.channel_buffer);

        if !config.stages_dir.exists() {
            std::fs::create_dir_all(&config.stages_dir).map_err(|e| {
                TafweejError::DirectoryCreation {
                    path: config.stages_dir.clone(),
                    source: e,
                }
            })?;
            info!(dir = %config.stages_dir.display(), "created stages directory");
        }

        let stages_dir = config.stages_dir.clone();
        let reader = StageReader::new(Some(stages_dir.clone()))?;

        // Track known files for create vs modify detection
        let known_ids = Arc::new(std::sync::Mutex::new(HashSet::new()));
        if let Ok(ids) = reader.list_stage_ids() {
            let mut known = known_ids.lock().unwrap();
            for id in ids {
                known.insert(id);
            }
        }

        let known_ids_clone = Arc::clone(&known_ids);
        let event_tx_clone = event_tx.clone();

        let mut debouncer = new_debouncer(
            config.debounce_duration,
            None,
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    for event in events {
                        process_event(&event.event, &known_ids_clone, &event_tx_clone);
                    }
                }
                Err(errors) => {
                    for e in errors {
                        error!(error = ?e, "stage watcher error");
                        let _ = event_tx_clone.blocking_send(StageFileEvent::Error {
                            stage_id: 0,
                            error: format!("{e:?}"),
                        });
                    }
                }
            },
        )
        .map_err(|e| TafweejError::WatcherInit {
            message: format!("failed to create debouncer: {e}"),
        })?;

        debouncer
            .watch(&config.stages_dir, RecursiveMode::NonRecursive)
            .map_err(|e| TafweejError::WatcherInit {
                message: format!(
                    "failed to watch directory {}: {e}",
                    config.stages_dir.display()
                ),
            })?;

        info!(dir = %config.stages_dir.display(), "watching stages directory");

        if config.emit_initial_state {
            if let Ok(stages) = reader.read_all() {
                for stage in stages {
                    if event_tx
                        .try_send(StageFileEvent::Created {
                            stage_id: stage.id,
                            stage,
                        })
                        .is_err()
                    {
                        warn!("event channel full during initial state emission");
                    }
                }
            }
        }

        Ok((
            Self {
                _debouncer: debouncer,
                stages_dir,
            },
            event_rx,
        ))
    }

    /// Directory being watched.
    pub fn stages_dir(&self) -> &Path {
        &self.stages_dir
    }
}

/// Process a filesystem event and emit the matching StageFileEvent.
fn process_event(
    event: &Event,
    known_ids: &Arc<std::sync::Mutex<HashSet<i64>>>,
    tx: &mpsc::Sender<StageFileEvent>,
) {
    for path in &event.paths {
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }

        // Snapshot filenames are the numeric stage id
        let stage_id = match path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<i64>().ok())
        {
            Some(id) => id,
            None => continue,
        };

        debug!(stage_id, kind = ?event.kind, "processing stage file event");

        let stage_event = match event.kind {
            EventKind::Create(_) => {
                known_ids.lock().unwrap().insert(stage_id);

                match parse_stage_file(path) {
                    Ok(stage) => StageFileEvent::Created { stage_id, stage },
                    Err(e) => StageFileEvent::Error {
                        stage_id,
                        error: e.to_string(),
                    },
                }
            }

            EventKind::Modify(_) => {
                // An editor/workflow may surface a brand-new file as Modify
                let is_new = {
                    let mut known = known_ids.lock().unwrap();
                    known.insert(stage_id)
                };

                match parse_stage_file(path) {
                    Ok(stage) => {
                        if is_new {
                            StageFileEvent::Created { stage_id, stage }
                        } else {
                            StageFileEvent::Modified { stage_id, stage }
                        }
                    }
                    Err(e) => StageFileEvent::Error {
                        stage_id,
                        error: e.to_string(),
                    },
                }
            }

            EventKind::Remove(_) => {
                known_ids.lock().unwrap().remove(&stage_id);
                StageFileEvent::Removed { stage_id }
            }

            _ => {
                debug!(kind = ?event.kind, "ignoring event kind");
                continue;
            }
        };

        if tx.blocking_send(stage_event).is_err() {
            warn!(stage_id, "event channel closed, dropping stage event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StageStatus;
    use tempfile::TempDir;

    fn write_stage(dir: &Path, id: i64, status: &str) {
        let content = format!(r#"{{"id": {id}, "name": "Stage {id}", "status": "{status}"}}"#);
        std::fs::write(dir.join(format!("{id}.json")), content).unwrap();
    }

    #[test]
    fn test_watcher_config_builders() {
        let config = StageWatcherConfig::new(PathBuf::from("/tmp/stages"))
            .with_debounce(Duration::from_millis(100))
            .with_buffer_size(512)
            .with_initial_state(true);

        assert_eq!(config.stages_dir, PathBuf::from("/tmp/stages"));
        assert_eq!(config.debounce_duration, Duration::from_millis(100));
        assert_eq!(config.channel_buffer, 512);
        assert!(config.emit_initial_state);
    }

    #[test]
    fn test_event_stage_id() {
        let event = StageFileEvent::Removed { stage_id: 4 };
        assert_eq!(event.stage_id(), 4);
        assert!(!event.is_error());

        let event = StageFileEvent::Error {
            stage_id: 9,
            error: "bad".to_string(),
        };
        assert!(event.is_error());
    }

    #[tokio::test]
    async fn test_watcher_creates_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("stages");

        let (_watcher, _rx) = StageWatcher::new(Some(dir.clone())).unwrap();
        assert!(dir.exists());
    }

    #[tokio::test]
    async fn test_watcher_emits_created_event() {
        let tmp = TempDir::new().unwrap();
        let (_watcher, mut rx) = StageWatcher::new(Some(tmp.path().to_path_buf())).unwrap();

        // Let the watcher arm before mutating the directory
        tokio::time::sleep(Duration::from_millis(100)).await;
        write_stage(tmp.path(), 12, "active");

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("channel closed");

        match event {
            StageFileEvent::Created { stage_id, stage } => {
                assert_eq!(stage_id, 12);
                assert_eq!(stage.status, StageStatus::Active);
            }
            other => panic!("expected Created, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_watcher_emits_modified_event() {
        let tmp = TempDir::new().unwrap();
        write_stage(tmp.path(), 3, "active");

        let (_watcher, mut rx) = StageWatcher::new(Some(tmp.path().to_path_buf())).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        write_stage(tmp.path(), 3, "waiting_departure");

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("channel closed");

        match event {
            StageFileEvent::Modified { stage, .. } => {
                assert_eq!(stage.status, StageStatus::WaitingDeparture);
            }
            other => panic!("expected Modified, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_watcher_emits_removed_event() {
        let tmp = TempDir::new().unwrap();
        write_stage(tmp.path(), 6, "active");

        let (_watcher, mut rx) = StageWatcher::new(Some(tmp.path().to_path_buf())).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        std::fs::remove_file(tmp.path().join("6.json")).unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("channel closed");

        match event {
            StageFileEvent::Removed { stage_id } => assert_eq!(stage_id, 6),
            other => panic!("expected Removed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_watcher_emits_error_for_corrupt_file() {
        let tmp = TempDir::new().unwrap();
        let (_watcher, mut rx) = StageWatcher::new(Some(tmp.path().to_path_buf())).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        std::fs::write(tmp.path().join("7.json"), "{not json").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("channel closed");

        assert!(event.is_error());
        assert_eq!(event.stage_id(), 7);
    }

    #[tokio::test]
    async fn test_watcher_initial_state_emission() {
        let tmp = TempDir::new().unwrap();
        write_stage(tmp.path(), 1, "active");
        write_stage(tmp.path(), 2, "completed");

        let config = StageWatcherConfig::new(tmp.path().to_path_buf()).with_initial_state(true);
        let (_watcher, mut rx) = StageWatcher::with_config(config).unwrap();

        let mut seen = Vec::new();
        for _ in 0..2 {
            let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("timed out")
                .expect("channel closed");
            seen.push(event.stage_id());
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_watcher_ignores_non_numeric_files() {
        let tmp = TempDir::new().unwrap();
        let (_watcher, mut rx) = StageWatcher::new(Some(tmp.path().to_path_buf())).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        std::fs::write(tmp.path().join("template.json"), "{}").unwrap();

        let result = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
        assert!(result.is_err(), "no event expected for non-numeric filename");
    }
}
