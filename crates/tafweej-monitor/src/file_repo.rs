//! File-backed stage repository.
//!
//! Implements the [`StageRepository`] contract over the snapshot directory
//! maintained by the operational workflow: listing reads the JSON files
//! directly, and the change feed adapts [`StageWatcher`] filesystem events
//! into [`StageChange`] values. A snapshot cache supplies the `previous`
//! side of each change so the monitor can detect status transitions.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use tafweej_core::error::{Result, TafweejError};
use tafweej_core::repo::{StageChange, StageRepository};
use tafweej_core::stages::StageReader;
use tafweej_core::types::{Stage, StageStatus};
use tafweej_core::watcher::{StageFileEvent, StageWatcher, StageWatcherConfig};

/// Buffer size for the converted change channel.
const CHANGE_CHANNEL_BUFFER: usize = 64;

/// [`StageRepository`] reading snapshots from a watched directory.
pub struct FileStageRepository {
    reader: StageReader,
    stages_dir: PathBuf,
    /// Last snapshot seen per stage, for previous-state diffing
    snapshots: Arc<Mutex<HashMap<i64, Stage>>>,
}

impl FileStageRepository {
    /// Create a repository over the given stages directory.
    pub fn new(stages_dir: PathBuf) -> Result<Self> {
        let reader = StageReader::new(Some(stages_dir.clone()))?;
        Ok(Self {
            reader,
            stages_dir,
            snapshots: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Directory the repository reads from.
    pub fn stages_dir(&self) -> &PathBuf {
        &self.stages_dir
    }

    /// Seed the snapshot cache with the current directory contents.
    fn seed_snapshots(&self) -> Result<()> {
        let stages = self.reader.read_all()?;
        let mut cache = self.snapshots.lock().map_err(|e| {
            TafweejError::internal(format!("snapshot cache lock poisoned: {e}"))
        })?;
        for stage in stages {
            cache.insert(stage.id, stage);
        }
        Ok(())
    }
}

#[async_trait]
impl StageRepository for FileStageRepository {
    async fn list_stages(&self, filter: &[StageStatus]) -> Result<Vec<Stage>> {
        self.reader
            .read_with_status(filter)
            .map_err(|e| TafweejError::repository_unavailable(e.to_string()))
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<StageChange>> {
        self.seed_snapshots()
            .map_err(|e| TafweejError::repository_unavailable(e.to_string()))?;

        let config = StageWatcherConfig::new(self.stages_dir.clone());
        let (watcher, mut file_rx) = StageWatcher::with_config(config)?;

        let (change_tx, change_rx) = mpsc::channel(CHANGE_CHANNEL_BUFFER);
        let snapshots = Arc::clone(&self.snapshots);

        tokio::spawn(async move {
            // The watcher must outlive the loop for events to keep flowing.
            let _watcher = watcher;

            while let Some(event) = file_rx.recv().await {
                let change = match event {
                    StageFileEvent::Created { stage, .. }
                    | StageFileEvent::Modified { stage, .. } => {
                        let previous = match snapshots.lock() {
                            Ok(mut cache) => cache.insert(stage.id, stage.clone()),
                            Err(e) => {
                                warn!(error = %e, "snapshot cache lock poisoned");
                                None
                            }
                        };
                        StageChange {
                            previous,
                            current: stage,
                        }
                    }
                    StageFileEvent::Removed { stage_id } => {
                        // Deletion is not a stage mutation to classify.
                        if let Ok(mut cache) = snapshots.lock() {
                            cache.remove(&stage_id);
                        }
                        continue;
                    }
                    StageFileEvent::Error { stage_id, error } => {
                        warn!(stage_id, error = %error, "unreadable stage snapshot in change feed");
                        continue;
                    }
                };

                if change_tx.send(change).await.is_err() {
                    debug!("change subscriber dropped, stopping feed");
                    break;
                }
            }
        });

        Ok(change_rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    fn write_stage(dir: &Path, id: i64, status: &str, pilgrims: u32) {
        let content = format!(
            r#"{{"id": {id}, "name": "Stage {id}", "status": "{status}",
                "current_pilgrims": {pilgrims},
                "end_date": "2025-06-10", "end_time": "18:00"}}"#
        );
        std::fs::write(dir.join(format!("{id}.json")), content).unwrap();
    }

    #[tokio::test]
    async fn test_list_stages_applies_filter() {
        let tmp = TempDir::new().unwrap();
        write_stage(tmp.path(), 1, "active", 100);
        write_stage(tmp.path(), 2, "inactive", 0);
        write_stage(tmp.path(), 3, "completed", 0);

        let repo = FileStageRepository::new(tmp.path().to_path_buf()).unwrap();
        let stages = repo
            .list_stages(&[StageStatus::Active, StageStatus::Completed])
            .await
            .unwrap();

        let ids: Vec<_> = stages.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_subscribe_emits_change_with_previous() {
        let tmp = TempDir::new().unwrap();
        write_stage(tmp.path(), 5, "active", 100);

        let repo = FileStageRepository::new(tmp.path().to_path_buf()).unwrap();
        let mut rx = repo.subscribe().await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        write_stage(tmp.path(), 5, "waiting_departure", 100);

        let change = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for change")
            .expect("feed closed");

        assert_eq!(change.current.status, StageStatus::WaitingDeparture);
        let previous = change.previous.expect("previous snapshot cached");
        assert_eq!(previous.status, StageStatus::Active);
        assert!(change.status_changed());
    }

    #[tokio::test]
    async fn test_subscribe_new_stage_has_no_previous() {
        let tmp = TempDir::new().unwrap();
        let repo = FileStageRepository::new(tmp.path().to_path_buf()).unwrap();
        let mut rx = repo.subscribe().await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        write_stage(tmp.path(), 9, "active", 50);

        let change = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for change")
            .expect("feed closed");

        assert_eq!(change.current.id, 9);
        assert!(change.previous.is_none());
    }
}
