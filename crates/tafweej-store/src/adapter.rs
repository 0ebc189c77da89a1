//! Trait adapter exposing [`AlertDatabase`] through the core collaborator
//! contracts.
//!
//! The monitor and dispatcher only know the [`AlertStore`] and
//! [`NotificationLog`] traits; this adapter maps [`StoreError`] values into
//! the core error taxonomy at that boundary.

use std::sync::Arc;

use async_trait::async_trait;

use tafweej_core::error::{Result, TafweejError};
use tafweej_core::repo::{AlertStore, NewNotification, NotificationLog};
use tafweej_core::types::{Alert, AlertPriority, NewAlert};

use crate::db::AlertDatabase;

/// [`AlertStore`] + [`NotificationLog`] backed by SQLite.
#[derive(Clone)]
pub struct SqliteAlertStore {
    db: Arc<AlertDatabase>,
}

impl SqliteAlertStore {
    pub fn new(db: Arc<AlertDatabase>) -> Self {
        Self { db }
    }

    /// Access the underlying database (queries not covered by the traits).
    pub fn database(&self) -> &AlertDatabase {
        &self.db
    }
}

#[async_trait]
impl AlertStore for SqliteAlertStore {
    async fn insert_alert(&self, alert: NewAlert) -> Result<Alert> {
        let stage_id = alert.stage_id;
        self.db
            .insert_alert(&alert)
            .map_err(|e| TafweejError::alert_persistence(stage_id, e.to_string()))
    }

    async fn list_open_alerts(&self) -> Result<Vec<Alert>> {
        self.db
            .list_open_alerts()
            .map_err(|e| TafweejError::internal(format!("listing open alerts: {e}")))
    }

    async fn resolve_alert(&self, alert_id: i64) -> Result<()> {
        self.db
            .resolve_alert(alert_id)
            .map_err(|e| TafweejError::internal(format!("resolving alert {alert_id}: {e}")))
    }

    async fn has_open_alert(&self, stage_id: i64, priority: AlertPriority) -> Result<bool> {
        self.db
            .has_open_alert(stage_id, priority)
            .map_err(|e| TafweejError::internal(format!("checking open alerts: {e}")))
    }
}

#[async_trait]
impl NotificationLog for SqliteAlertStore {
    async fn record_pending(&self, notification: NewNotification) -> Result<i64> {
        self.db
            .insert_notification(
                notification.alert_id,
                notification.channel,
                &notification.title,
                &notification.body,
            )
            .map_err(|e| TafweejError::internal(format!("recording notification: {e}")))
    }

    async fn mark_sent(&self, notification_id: i64) -> Result<()> {
        self.db
            .mark_notification_sent(notification_id)
            .map_err(|e| TafweejError::internal(format!("marking notification sent: {e}")))
    }

    async fn mark_failed(&self, notification_id: i64, error: &str) -> Result<()> {
        self.db
            .mark_notification_failed(notification_id, error)
            .map_err(|e| TafweejError::internal(format!("marking notification failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tafweej_core::types::{AlertMetadata, NotificationChannel};

    fn store() -> SqliteAlertStore {
        SqliteAlertStore::new(Arc::new(AlertDatabase::open_in_memory().unwrap()))
    }

    #[tokio::test]
    async fn test_insert_through_trait() {
        let store = store();

        let alert = AlertStore::insert_alert(
            &store,
            NewAlert {
                stage_id: 11,
                priority: AlertPriority::High,
                message: "Mina inbound: approximately 20 hours remaining".to_string(),
                channels: vec![NotificationChannel::Push, NotificationChannel::InApp],
                metadata: AlertMetadata::default(),
            },
        )
        .await
        .unwrap();

        assert_eq!(alert.stage_id, 11);
        assert!(store.has_open_alert(11, AlertPriority::High).await.unwrap());

        store.resolve_alert(alert.id).await.unwrap();
        assert!(store.list_open_alerts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_outbox_through_trait() {
        let store = store();
        let alert = AlertStore::insert_alert(
            &store,
            NewAlert {
                stage_id: 1,
                priority: AlertPriority::Critical,
                message: "m".to_string(),
                channels: vec![NotificationChannel::Sms],
                metadata: AlertMetadata::default(),
            },
        )
        .await
        .unwrap();

        let id = store
            .record_pending(NewNotification {
                alert_id: alert.id,
                channel: NotificationChannel::Sms,
                title: "Critical stage alert".to_string(),
                body: "m".to_string(),
            })
            .await
            .unwrap();

        store.mark_failed(id, "timeout").await.unwrap();

        let records = store.database().list_notifications_for_alert(alert.id).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].error.as_deref(), Some("timeout"));
    }
}
