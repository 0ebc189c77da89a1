//! Shared type definitions used across TAFWEEJ crates.
//!
//! The central entity is the [`Stage`]: a time-boxed cohort-movement phase
//! with a population count and a departure target. Stages are created and
//! mutated by the external operational workflow; this system only reads
//! their snapshots and reacts to mutation events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Scheduled but not yet active
    Pending,
    /// Cohort currently moving through the stage
    Active,
    /// Movement finished, departures still being counted out
    WaitingDeparture,
    /// Stage completed
    Completed,
    /// Stage disabled by operations
    Inactive,
}

impl StageStatus {
    /// Statuses the periodic evaluation sweep fetches.
    pub fn is_monitored(&self) -> bool {
        matches!(
            self,
            Self::Active | Self::WaitingDeparture | Self::Completed
        )
    }

    /// Statuses the ad-hoc attention sweep inspects.
    pub fn is_attention_candidate(&self) -> bool {
        matches!(self, Self::Active | Self::WaitingDeparture)
    }
}

impl Default for StageStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Active => write!(f, "active"),
            Self::WaitingDeparture => write!(f, "waiting_departure"),
            Self::Completed => write!(f, "completed"),
            Self::Inactive => write!(f, "inactive"),
        }
    }
}

/// Snapshot of a stage as maintained by the operational workflow.
///
/// Date and time-of-day are stored as separate string fields (`%Y-%m-%d`
/// and `%H:%M[:%S]`); [`crate::clock::to_instant`] combines them. The end
/// instant is logically after the start instant, but snapshots violating
/// that are tolerated and classified like any other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    /// Unique stage identifier
    pub id: i64,

    /// Display name (e.g. "Mina to Arafat - Group 12")
    pub name: String,

    /// Current lifecycle status
    #[serde(default)]
    pub status: StageStatus,

    /// Calendar date the stage opens (`%Y-%m-%d`)
    #[serde(default)]
    pub start_date: String,

    /// Local time-of-day the stage opens (`%H:%M` or `%H:%M:%S`)
    #[serde(default)]
    pub start_time: String,

    /// Calendar date the stage must finish
    #[serde(default)]
    pub end_date: String,

    /// Local time-of-day the stage must finish
    #[serde(default)]
    pub end_time: String,

    /// Pilgrims currently inside the stage
    #[serde(default)]
    pub current_pilgrims: u32,

    /// Pilgrims counted out so far (non-decreasing while active)
    #[serde(default)]
    pub departed_count: u32,

    /// Departure target for the stage
    #[serde(default)]
    pub required_departures: u32,

    /// Operational capacity of the hosting area
    #[serde(default)]
    pub max_capacity: u32,

    /// Opaque area foreign key, not interpreted here
    #[serde(default)]
    pub area_id: Option<i64>,

    /// Opaque group foreign key, not interpreted here
    #[serde(default)]
    pub group_id: Option<i64>,
}

impl Stage {
    /// Create a minimal stage snapshot (used by tests and placeholders).
    pub fn new(id: i64, name: impl Into<String>, status: StageStatus) -> Self {
        Self {
            id,
            name: name.into(),
            status,
            start_date: String::new(),
            start_time: String::new(),
            end_date: String::new(),
            end_time: String::new(),
            current_pilgrims: 0,
            departed_count: 0,
            required_departures: 0,
            max_capacity: 0,
            area_id: None,
            group_id: None,
        }
    }

    /// Departure progress as a percentage of the required target.
    ///
    /// Zero when no target is set; unclamped, so over-delivery exceeds 100.
    pub fn departure_rate(&self) -> f64 {
        if self.required_departures == 0 {
            0.0
        } else {
            f64::from(self.departed_count) / f64::from(self.required_departures) * 100.0
        }
    }

    /// Current population as a percentage of area capacity.
    ///
    /// `None` when the hosting area has no recorded capacity.
    pub fn occupancy_rate(&self) -> Option<f64> {
        if self.max_capacity == 0 {
            None
        } else {
            Some(f64::from(self.current_pilgrims) / f64::from(self.max_capacity) * 100.0)
        }
    }
}

/// Priority assigned to an alert.
///
/// Ordered from least to most severe so comparisons read naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertPriority {
    /// Wire representation (the persisted `type` column).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Parse the wire representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for AlertPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification delivery medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Push,
    Sms,
    Whatsapp,
    Email,
    InApp,
}

impl NotificationChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Sms => "sms",
            Self::Whatsapp => "whatsapp",
            Self::Email => "email",
            Self::InApp => "in_app",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "push" => Some(Self::Push),
            "sms" => Some(Self::Sms),
            "whatsapp" => Some(Self::Whatsapp),
            "email" => Some(Self::Email),
            "in_app" => Some(Self::InApp),
            _ => None,
        }
    }

    /// In-app presence is satisfied by alert persistence alone; no sender
    /// is invoked for it.
    pub fn requires_transport(&self) -> bool {
        !matches!(self, Self::InApp)
    }
}

impl std::fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Numeric context attached to an alert for downstream display.
///
/// All fields are optional; the wire names are camelCase to match the
/// consuming dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_remaining: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub occupancy_rate: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub departure_rate: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_pilgrims: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_capacity: Option<u32>,
}

impl AlertMetadata {
    /// True when no field carries a value.
    pub fn is_empty(&self) -> bool {
        self.time_remaining.is_none()
            && self.occupancy_rate.is_none()
            && self.departure_rate.is_none()
            && self.current_pilgrims.is_none()
            && self.max_capacity.is_none()
    }
}

/// Alert creation request. The store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAlert {
    pub stage_id: i64,

    /// Persisted as the alert `type`
    #[serde(rename = "type")]
    pub priority: AlertPriority,

    pub message: String,

    /// Channel set chosen at creation time
    pub channels: Vec<NotificationChannel>,

    #[serde(default)]
    pub metadata: AlertMetadata,
}

/// A persisted alert row.
///
/// Once `is_resolved` is true the row is immutable; `resolved_at` is set
/// exactly once by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,

    pub stage_id: i64,

    #[serde(rename = "type")]
    pub priority: AlertPriority,

    pub message: String,

    pub created_at: DateTime<Utc>,

    pub resolved_at: Option<DateTime<Utc>>,

    pub is_resolved: bool,

    pub channels: Vec<NotificationChannel>,

    #[serde(default)]
    pub metadata: AlertMetadata,
}

impl Alert {
    /// Short rendered title for notification payloads and log lines.
    pub fn title(&self) -> String {
        match self.priority {
            AlertPriority::Critical => "Critical stage alert".to_string(),
            AlertPriority::High => "Stage needs attention".to_string(),
            AlertPriority::Medium => "Stage advisory".to_string(),
            AlertPriority::Low => "Stage notice".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_status_monitored_set() {
        assert!(StageStatus::Active.is_monitored());
        assert!(StageStatus::WaitingDeparture.is_monitored());
        assert!(StageStatus::Completed.is_monitored());
        assert!(!StageStatus::Pending.is_monitored());
        assert!(!StageStatus::Inactive.is_monitored());
    }

    #[test]
    fn test_departure_rate_zero_target() {
        let mut stage = Stage::new(1, "Mina inbound", StageStatus::Active);
        stage.departed_count = 42;
        assert_eq!(stage.departure_rate(), 0.0);
    }

    #[test]
    fn test_departure_rate_unclamped() {
        let mut stage = Stage::new(1, "Mina inbound", StageStatus::Active);
        stage.departed_count = 150;
        stage.required_departures = 100;
        assert!((stage.departure_rate() - 150.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_occupancy_rate_without_capacity() {
        let mut stage = Stage::new(1, "Arafat", StageStatus::Active);
        stage.current_pilgrims = 500;
        assert_eq!(stage.occupancy_rate(), None);

        stage.max_capacity = 1000;
        assert_eq!(stage.occupancy_rate(), Some(50.0));
    }

    #[test]
    fn test_priority_ordering() {
        assert!(AlertPriority::Critical > AlertPriority::High);
        assert!(AlertPriority::High > AlertPriority::Medium);
        assert!(AlertPriority::Medium > AlertPriority::Low);
    }

    #[test]
    fn test_priority_wire_round_trip() {
        for p in [
            AlertPriority::Low,
            AlertPriority::Medium,
            AlertPriority::High,
            AlertPriority::Critical,
        ] {
            assert_eq!(AlertPriority::parse(p.as_str()), Some(p));
        }
        assert_eq!(AlertPriority::parse("urgent"), None);
    }

    #[test]
    fn test_channel_transport_requirement() {
        assert!(NotificationChannel::Push.requires_transport());
        assert!(NotificationChannel::Sms.requires_transport());
        assert!(!NotificationChannel::InApp.requires_transport());
    }

    #[test]
    fn test_stage_deserializes_partial_json() {
        let stage: Stage =
            serde_json::from_str(r#"{"id": 7, "name": "Muzdalifah", "status": "active"}"#).unwrap();
        assert_eq!(stage.id, 7);
        assert_eq!(stage.status, StageStatus::Active);
        assert_eq!(stage.current_pilgrims, 0);
        assert_eq!(stage.area_id, None);
    }

    #[test]
    fn test_metadata_skips_empty_fields() {
        let meta = AlertMetadata {
            time_remaining: Some(-2.0),
            ..Default::default()
        };
        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("timeRemaining"));
        assert!(!json.contains("occupancyRate"));
    }

    #[test]
    fn test_alert_priority_serialized_as_type() {
        let alert = NewAlert {
            stage_id: 3,
            priority: AlertPriority::Critical,
            message: "m".to_string(),
            channels: vec![NotificationChannel::InApp],
            metadata: AlertMetadata::default(),
        };
        let json = serde_json::to_string(&alert).unwrap();
        assert!(json.contains(r#""type":"critical""#));
    }
}
