//! Collaborator contracts consumed by the monitor.
//!
//! The monitor only ever talks to its surroundings through these traits:
//! a [`StageRepository`] for snapshots and change events, an [`AlertStore`]
//! for persisted alerts, and a [`NotificationLog`] for the outbound
//! notification records written before delivery is attempted. Any storage
//! or transport can sit behind them; the shipped implementations live in
//! `tafweej-store` and `tafweej-monitor`.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::types::{Alert, AlertPriority, NewAlert, NotificationChannel, Stage, StageStatus};

/// A stage mutation observed through the change feed.
///
/// `previous` is absent when the stage was first observed (no earlier
/// snapshot to compare against).
#[derive(Debug, Clone)]
pub struct StageChange {
    pub previous: Option<Stage>,
    pub current: Stage,
}

impl StageChange {
    /// True when the lifecycle status differs from the previous snapshot.
    ///
    /// A first observation counts as changed, since the monitor has no
    /// baseline to rule a transition out.
    pub fn status_changed(&self) -> bool {
        match &self.previous {
            Some(prev) => prev.status != self.current.status,
            None => true,
        }
    }
}

/// Read access to stage snapshots plus a change-notification feed.
#[async_trait]
pub trait StageRepository: Send + Sync {
    /// Fetch all stages whose status is in `filter`.
    async fn list_stages(&self, filter: &[StageStatus]) -> Result<Vec<Stage>>;

    /// Subscribe to stage mutations.
    ///
    /// Dropping the receiver cancels the subscription.
    async fn subscribe(&self) -> Result<mpsc::Receiver<StageChange>>;
}

/// Persistence for alerts.
///
/// The store assigns `id` and `created_at` on insert. Resolution is
/// one-shot: `resolved_at` is set exactly once and a resolved alert is
/// never mutated back to open.
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn insert_alert(&self, alert: NewAlert) -> Result<Alert>;

    async fn list_open_alerts(&self) -> Result<Vec<Alert>>;

    async fn resolve_alert(&self, alert_id: i64) -> Result<()>;

    /// Whether an open alert already exists for this stage and priority.
    /// Serves the optional duplicate-suppression mode; the default
    /// monitor behavior never consults it.
    async fn has_open_alert(&self, stage_id: i64, priority: AlertPriority) -> Result<bool>;
}

/// Outbound notification record, written before delivery is attempted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub alert_id: i64,
    pub channel: NotificationChannel,
    pub title: String,
    pub body: String,
}

/// Persist-then-send log for outbound notifications.
///
/// Each channel attempt first records a pending row, then flips it to sent
/// or failed. Downstream reconciliation reads this log; the core never
/// waits for delivery receipts.
#[async_trait]
pub trait NotificationLog: Send + Sync {
    /// Record a pending outbound notification, returning its id.
    async fn record_pending(&self, notification: NewNotification) -> Result<i64>;

    async fn mark_sent(&self, notification_id: i64) -> Result<()>;

    async fn mark_failed(&self, notification_id: i64, error: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StageStatus;

    #[test]
    fn test_status_changed_with_previous() {
        let mut prev = Stage::new(1, "Mina", StageStatus::Active);
        let mut curr = prev.clone();

        let change = StageChange {
            previous: Some(prev.clone()),
            current: curr.clone(),
        };
        assert!(!change.status_changed());

        curr.status = StageStatus::WaitingDeparture;
        prev.status = StageStatus::Active;
        let change = StageChange {
            previous: Some(prev),
            current: curr,
        };
        assert!(change.status_changed());
    }

    #[test]
    fn test_status_changed_first_observation() {
        let change = StageChange {
            previous: None,
            current: Stage::new(1, "Mina", StageStatus::Active),
        };
        assert!(change.status_changed());
    }
}
