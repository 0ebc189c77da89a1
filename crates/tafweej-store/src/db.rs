//! SQLite database layer for alerts and notification records.
//!
//! Two tables: `alerts` (unbounded history, one row per created alert) and
//! `notifications` (the persist-then-send outbox written before each
//! delivery attempt). Channel sets and metadata are stored as JSON text
//! columns; timestamps are RFC 3339 strings.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use tracing::{debug, info};

use tafweej_core::types::{Alert, AlertMetadata, AlertPriority, NewAlert, NotificationChannel};

use crate::error::{Result, StoreError};

/// Current schema version for migrations.
const SCHEMA_VERSION: i32 = 2;

/// SQLite database for alert persistence.
pub struct AlertDatabase {
    conn: Arc<Mutex<Connection>>,
}

/// A row in the notifications outbox.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRecord {
    pub id: i64,
    pub alert_id: i64,
    pub channel: NotificationChannel,
    pub title: String,
    pub body: String,
    pub status: NotificationStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Delivery status of an outbox row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl AlertDatabase {
    /// Open or create an alert database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))
    }

    // =========================================================================
    // Migrations
    // =========================================================================

    fn migrate(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            [],
        )?;

        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if current_version < SCHEMA_VERSION {
            info!(
                current = current_version,
                target = SCHEMA_VERSION,
                "running alert database migrations"
            );
            if current_version < 1 {
                Self::migration_v1(&conn)?;
            }
            if current_version < 2 {
                Self::migration_v2(&conn)?;
            }
            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )?;
        }

        Ok(())
    }

    /// Migration to version 1: alerts table.
    fn migration_v1(conn: &Connection) -> Result<()> {
        debug!("running migration v1: alerts table");

        conn.execute(
            "CREATE TABLE IF NOT EXISTS alerts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                stage_id INTEGER NOT NULL,
                type TEXT NOT NULL,
                message TEXT NOT NULL,
                channels TEXT NOT NULL,
                metadata TEXT,
                created_at TEXT NOT NULL,
                resolved_at TEXT,
                is_resolved INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_alerts_stage
             ON alerts(stage_id)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_alerts_open
             ON alerts(is_resolved, stage_id, type)",
            [],
        )?;

        Ok(())
    }

    /// Migration to version 2: notifications outbox.
    fn migration_v2(conn: &Connection) -> Result<()> {
        debug!("running migration v2: notifications outbox");

        conn.execute(
            "CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                alert_id INTEGER NOT NULL,
                channel TEXT NOT NULL,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                error TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (alert_id) REFERENCES alerts(id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_notifications_alert
             ON notifications(alert_id)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_notifications_status
             ON notifications(status)",
            [],
        )?;

        Ok(())
    }

    // =========================================================================
    // Alerts
    // =========================================================================

    /// Insert a new alert, assigning id and creation time.
    pub fn insert_alert(&self, alert: &NewAlert) -> Result<Alert> {
        let created_at = Utc::now();
        let channels_json = serde_json::to_string(&alert.channels)?;
        let metadata_json = if alert.metadata.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&alert.metadata)?)
        };

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO alerts (stage_id, type, message, channels, metadata, created_at, is_resolved)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
            params![
                alert.stage_id,
                alert.priority.as_str(),
                alert.message,
                channels_json,
                metadata_json,
                created_at.to_rfc3339(),
            ],
        )?;

        let id = conn.last_insert_rowid();
        debug!(alert_id = id, stage_id = alert.stage_id, priority = %alert.priority, "alert inserted");

        Ok(Alert {
            id,
            stage_id: alert.stage_id,
            priority: alert.priority,
            message: alert.message.clone(),
            created_at,
            resolved_at: None,
            is_resolved: false,
            channels: alert.channels.clone(),
            metadata: alert.metadata.clone(),
        })
    }

    /// Fetch a single alert by id.
    pub fn get_alert(&self, alert_id: i64) -> Result<Alert> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, stage_id, type, message, channels, metadata, created_at, resolved_at, is_resolved
             FROM alerts WHERE id = ?1",
        )?;

        stmt.query_row(params![alert_id], row_to_alert)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::AlertNotFound(alert_id),
                other => StoreError::Database(other),
            })?
    }

    /// List all unresolved alerts, newest first.
    pub fn list_open_alerts(&self) -> Result<Vec<Alert>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, stage_id, type, message, channels, metadata, created_at, resolved_at, is_resolved
             FROM alerts WHERE is_resolved = 0 ORDER BY created_at DESC, id DESC",
        )?;

        let rows = stmt.query_map([], row_to_alert)?;
        let mut alerts = Vec::new();
        for row in rows {
            alerts.push(row??);
        }
        Ok(alerts)
    }

    /// List the full alert history for a stage, newest first.
    pub fn list_alerts_for_stage(&self, stage_id: i64) -> Result<Vec<Alert>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, stage_id, type, message, channels, metadata, created_at, resolved_at, is_resolved
             FROM alerts WHERE stage_id = ?1 ORDER BY created_at DESC, id DESC",
        )?;

        let rows = stmt.query_map(params![stage_id], row_to_alert)?;
        let mut alerts = Vec::new();
        for row in rows {
            alerts.push(row??);
        }
        Ok(alerts)
    }

    /// Mark an alert resolved. One-shot: a resolved alert is left
    /// untouched, so `resolved_at` is only ever written once.
    pub fn resolve_alert(&self, alert_id: i64) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE alerts SET is_resolved = 1, resolved_at = ?1
             WHERE id = ?2 AND is_resolved = 0",
            params![Utc::now().to_rfc3339(), alert_id],
        )?;

        if updated > 0 {
            debug!(alert_id, "alert resolved");
        }
        Ok(())
    }

    /// Whether an open alert exists for the given stage and priority.
    pub fn has_open_alert(&self, stage_id: i64, priority: AlertPriority) -> Result<bool> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM alerts
             WHERE stage_id = ?1 AND type = ?2 AND is_resolved = 0",
            params![stage_id, priority.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Total number of alert rows (open and resolved).
    pub fn count_alerts(&self) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM alerts", [], |row| row.get(0))?;
        Ok(count)
    }

    // =========================================================================
    // Notifications outbox
    // =========================================================================

    /// Record a pending outbound notification, returning its id.
    pub fn insert_notification(
        &self,
        alert_id: i64,
        channel: NotificationChannel,
        title: &str,
        body: &str,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO notifications (alert_id, channel, title, body, status, created_at)
             VALUES (?1, ?2, ?3, ?4, 'pending', ?5)",
            params![
                alert_id,
                channel.as_str(),
                title,
                body,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Flip a pending notification to sent.
    pub fn mark_notification_sent(&self, notification_id: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE notifications SET status = 'sent' WHERE id = ?1",
            params![notification_id],
        )?;
        Ok(())
    }

    /// Flip a pending notification to failed, recording the error.
    pub fn mark_notification_failed(&self, notification_id: i64, error: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE notifications SET status = 'failed', error = ?1 WHERE id = ?2",
            params![error, notification_id],
        )?;
        Ok(())
    }

    /// List all outbox rows for an alert, oldest first.
    pub fn list_notifications_for_alert(&self, alert_id: i64) -> Result<Vec<NotificationRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, alert_id, channel, title, body, status, error, created_at
             FROM notifications WHERE alert_id = ?1 ORDER BY id ASC",
        )?;

        let rows = stmt.query_map(params![alert_id], row_to_notification)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row??);
        }
        Ok(records)
    }
}

/// Map an alerts row into an [`Alert`].
///
/// Returns a nested Result so rusqlite sees its own error type while JSON
/// and domain failures surface as [`StoreError`].
fn row_to_alert(row: &Row<'_>) -> rusqlite::Result<Result<Alert>> {
    let id: i64 = row.get(0)?;
    let stage_id: i64 = row.get(1)?;
    let type_str: String = row.get(2)?;
    let message: String = row.get(3)?;
    let channels_json: String = row.get(4)?;
    let metadata_json: Option<String> = row.get(5)?;
    let created_at_str: String = row.get(6)?;
    let resolved_at_str: Option<String> = row.get(7)?;
    let is_resolved: bool = row.get(8)?;

    Ok(build_alert(
        id,
        stage_id,
        type_str,
        message,
        channels_json,
        metadata_json,
        created_at_str,
        resolved_at_str,
        is_resolved,
    ))
}

#[allow(clippy::too_many_arguments)]
fn build_alert(
    id: i64,
    stage_id: i64,
    type_str: String,
    message: String,
    channels_json: String,
    metadata_json: Option<String>,
    created_at_str: String,
    resolved_at_str: Option<String>,
    is_resolved: bool,
) -> Result<Alert> {
    let priority = AlertPriority::parse(&type_str)
        .ok_or_else(|| StoreError::InvalidRow(format!("unknown alert type '{type_str}'")))?;

    let channels: Vec<NotificationChannel> = serde_json::from_str(&channels_json)?;

    let metadata: AlertMetadata = match metadata_json {
        Some(json) => serde_json::from_str(&json)?,
        None => AlertMetadata::default(),
    };

    let created_at = parse_timestamp(&created_at_str)?;
    let resolved_at = match resolved_at_str {
        Some(s) => Some(parse_timestamp(&s)?),
        None => None,
    };

    Ok(Alert {
        id,
        stage_id,
        priority,
        message,
        created_at,
        resolved_at,
        is_resolved,
        channels,
        metadata,
    })
}

/// Map a notifications row into a [`NotificationRecord`].
fn row_to_notification(row: &Row<'_>) -> rusqlite::Result<Result<NotificationRecord>> {
    let id: i64 = row.get(0)?;
    let alert_id: i64 = row.get(1)?;
    let channel_str: String = row.get(2)?;
    let title: String = row.get(3)?;
    let body: String = row.get(4)?;
    let status_str: String = row.get(5)?;
    let error: Option<String> = row.get(6)?;
    let created_at_str: String = row.get(7)?;

    Ok(build_notification(
        id,
        alert_id,
        channel_str,
        title,
        body,
        status_str,
        error,
        created_at_str,
    ))
}

#[allow(clippy::too_many_arguments)]
fn build_notification(
    id: i64,
    alert_id: i64,
    channel_str: String,
    title: String,
    body: String,
    status_str: String,
    error: Option<String>,
    created_at_str: String,
) -> Result<NotificationRecord> {
    let channel = NotificationChannel::parse(&channel_str)
        .ok_or_else(|| StoreError::InvalidRow(format!("unknown channel '{channel_str}'")))?;
    let status = NotificationStatus::parse(&status_str)
        .ok_or_else(|| StoreError::InvalidRow(format!("unknown status '{status_str}'")))?;
    let created_at = parse_timestamp(&created_at_str)?;

    Ok(NotificationRecord {
        id,
        alert_id,
        channel,
        title,
        body,
        status,
        error,
        created_at,
    })
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidRow(format!("bad timestamp '{s}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tafweej_core::types::AlertMetadata;

    fn new_alert(stage_id: i64, priority: AlertPriority) -> NewAlert {
        NewAlert {
            stage_id,
            priority,
            message: format!("stage {stage_id} message"),
            channels: vec![NotificationChannel::Push, NotificationChannel::InApp],
            metadata: AlertMetadata {
                time_remaining: Some(-2.0),
                departure_rate: Some(25.0),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_insert_and_get_alert() {
        let db = AlertDatabase::open_in_memory().unwrap();

        let inserted = db.insert_alert(&new_alert(7, AlertPriority::Critical)).unwrap();
        assert!(inserted.id > 0);
        assert!(!inserted.is_resolved);

        let fetched = db.get_alert(inserted.id).unwrap();
        assert_eq!(fetched.stage_id, 7);
        assert_eq!(fetched.priority, AlertPriority::Critical);
        assert_eq!(fetched.channels, inserted.channels);
        assert_eq!(fetched.metadata.time_remaining, Some(-2.0));
        assert_eq!(fetched.resolved_at, None);
    }

    #[test]
    fn test_get_alert_missing() {
        let db = AlertDatabase::open_in_memory().unwrap();
        assert!(matches!(
            db.get_alert(99),
            Err(StoreError::AlertNotFound(99))
        ));
    }

    #[test]
    fn test_open_alert_history_is_unbounded() {
        let db = AlertDatabase::open_in_memory().unwrap();

        // Repeated passes over a still-overdue stage keep inserting rows.
        for _ in 0..5 {
            db.insert_alert(&new_alert(3, AlertPriority::Critical)).unwrap();
        }

        assert_eq!(db.count_alerts().unwrap(), 5);
        assert_eq!(db.list_open_alerts().unwrap().len(), 5);
        assert_eq!(db.list_alerts_for_stage(3).unwrap().len(), 5);
    }

    #[test]
    fn test_resolve_alert_is_one_shot() {
        let db = AlertDatabase::open_in_memory().unwrap();
        let alert = db.insert_alert(&new_alert(1, AlertPriority::High)).unwrap();

        db.resolve_alert(alert.id).unwrap();
        let resolved = db.get_alert(alert.id).unwrap();
        assert!(resolved.is_resolved);
        let first_resolved_at = resolved.resolved_at.expect("resolved_at set");

        // Second resolve leaves the original timestamp untouched.
        db.resolve_alert(alert.id).unwrap();
        let again = db.get_alert(alert.id).unwrap();
        assert_eq!(again.resolved_at, Some(first_resolved_at));
    }

    #[test]
    fn test_resolved_alerts_leave_open_list() {
        let db = AlertDatabase::open_in_memory().unwrap();
        let a = db.insert_alert(&new_alert(1, AlertPriority::High)).unwrap();
        let _b = db.insert_alert(&new_alert(2, AlertPriority::Low)).unwrap();

        db.resolve_alert(a.id).unwrap();

        let open = db.list_open_alerts().unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].stage_id, 2);
    }

    #[test]
    fn test_has_open_alert_by_stage_and_priority() {
        let db = AlertDatabase::open_in_memory().unwrap();
        let alert = db.insert_alert(&new_alert(4, AlertPriority::Critical)).unwrap();

        assert!(db.has_open_alert(4, AlertPriority::Critical).unwrap());
        assert!(!db.has_open_alert(4, AlertPriority::High).unwrap());
        assert!(!db.has_open_alert(5, AlertPriority::Critical).unwrap());

        db.resolve_alert(alert.id).unwrap();
        assert!(!db.has_open_alert(4, AlertPriority::Critical).unwrap());
    }

    #[test]
    fn test_notification_outbox_lifecycle() {
        let db = AlertDatabase::open_in_memory().unwrap();
        let alert = db.insert_alert(&new_alert(2, AlertPriority::Critical)).unwrap();

        let n1 = db
            .insert_notification(alert.id, NotificationChannel::Push, "title", "body")
            .unwrap();
        let n2 = db
            .insert_notification(alert.id, NotificationChannel::Sms, "title", "body")
            .unwrap();

        db.mark_notification_sent(n1).unwrap();
        db.mark_notification_failed(n2, "gateway returned 502").unwrap();

        let records = db.list_notifications_for_alert(alert.id).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, NotificationStatus::Sent);
        assert_eq!(records[0].error, None);
        assert_eq!(records[1].status, NotificationStatus::Failed);
        assert_eq!(records[1].error.as_deref(), Some("gateway returned 502"));
    }

    #[test]
    fn test_metadata_round_trips_empty_as_default() {
        let db = AlertDatabase::open_in_memory().unwrap();
        let alert = db
            .insert_alert(&NewAlert {
                stage_id: 1,
                priority: AlertPriority::Low,
                message: "m".to_string(),
                channels: vec![NotificationChannel::InApp],
                metadata: AlertMetadata::default(),
            })
            .unwrap();

        let fetched = db.get_alert(alert.id).unwrap();
        assert!(fetched.metadata.is_empty());
    }
}
