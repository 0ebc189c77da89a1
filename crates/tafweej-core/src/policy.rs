//! Alert policy engine: pure classification of stage snapshots.
//!
//! Two independent rule sets evaluate the same [`Stage`]:
//!
//! 1. [`classify`] - the primary deadline policy. Maps time remaining until
//!    the stage end instant onto a priority, a notification channel set, and
//!    a needs-alert gate. Runs on every scheduled and reactive pass.
//! 2. [`needs_attention`] - a coarser heuristic sweep for ad-hoc
//!    diagnostics (overrun, premature activation, zero population,
//!    over-capacity, stalled departures). Each condition carries its own
//!    message template and priority.
//!
//! The two policies are deliberately kept separate and may both fire for
//! the same stage. Neither performs I/O; callers supply `now`.

use chrono::{DateTime, Utc};

use crate::clock::{format_remaining, hours_remaining, to_instant};
use crate::error::Result;
use crate::types::{AlertPriority, NotificationChannel, Stage, StageStatus};

/// Hard operational ceiling on stage population.
pub const MAX_STAGE_POPULATION: u32 = 15_000;

/// At or below this remaining time the stage counts as overdue.
pub const OVERDUE_THRESHOLD_HOURS: f64 = -1.0;

/// Remaining time at or below which the deadline is imminent.
pub const IMMINENT_THRESHOLD_HOURS: f64 = 6.0;

/// Remaining time at or below which the deadline is approaching.
pub const APPROACHING_THRESHOLD_HOURS: f64 = 24.0;

/// Remaining time at or below which an alert is persisted at all.
pub const ALERT_WINDOW_HOURS: f64 = 48.0;

/// Output of the primary classification policy.
///
/// Recomputed on every evaluation from a snapshot plus `now`; never stored
/// as-is. `occupancy_rate` is reserved and always 0 in this policy: primary
/// classification gates on time and departure progress only.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertAnalysis {
    pub priority: AlertPriority,
    pub channels: Vec<NotificationChannel>,
    pub needs_alert: bool,
    /// Signed hours until the stage end instant; negative means overdue
    pub time_remaining: f64,
    pub occupancy_rate: f64,
    pub departure_rate: f64,
    /// Rendered operator-facing message
    pub message: String,
}

/// Classify a stage snapshot against the primary deadline policy.
///
/// Thresholds are evaluated in strict order; the overdue branch always
/// dominates. Fails with `InvalidTimeFormat` when the stage's end date or
/// time cannot be parsed, in which case the caller skips the stage for the
/// current pass.
pub fn classify(stage: &Stage, now: DateTime<Utc>) -> Result<AlertAnalysis> {
    let end = to_instant(&stage.end_date, &stage.end_time)?;
    let time_remaining = hours_remaining(now, end);
    let departure_rate = stage.departure_rate();

    let (priority, channels) = if time_remaining <= OVERDUE_THRESHOLD_HOURS {
        (
            AlertPriority::Critical,
            vec![
                NotificationChannel::Push,
                NotificationChannel::Sms,
                NotificationChannel::Whatsapp,
                NotificationChannel::Email,
                NotificationChannel::InApp,
            ],
        )
    } else if time_remaining <= IMMINENT_THRESHOLD_HOURS {
        (
            AlertPriority::Critical,
            vec![
                NotificationChannel::Push,
                NotificationChannel::Sms,
                NotificationChannel::Email,
                NotificationChannel::InApp,
            ],
        )
    } else if time_remaining <= APPROACHING_THRESHOLD_HOURS {
        (
            AlertPriority::High,
            vec![
                NotificationChannel::Push,
                NotificationChannel::Email,
                NotificationChannel::InApp,
            ],
        )
    } else {
        (AlertPriority::Low, vec![NotificationChannel::InApp])
    };

    let needs_alert = time_remaining <= ALERT_WINDOW_HOURS
        || time_remaining <= OVERDUE_THRESHOLD_HOURS
        || priority == AlertPriority::Critical;

    let message = render_alert_message(stage, time_remaining, None);

    Ok(AlertAnalysis {
        priority,
        channels,
        needs_alert,
        time_remaining,
        occupancy_rate: 0.0,
        departure_rate,
        message,
    })
}

/// Render the operator-facing message for a primary-policy alert.
///
/// The overdue branch uses a terse "ended" phrase instead of a countdown.
/// The occupancy suffix appears only when occupancy data is supplied.
pub fn render_alert_message(stage: &Stage, time_remaining: f64, occupancy: Option<f64>) -> String {
    let mut message = if time_remaining <= OVERDUE_THRESHOLD_HOURS {
        format!("{} has ended", stage.name)
    } else {
        format!("{}: {}", stage.name, format_remaining(time_remaining))
    };

    if let Some(rate) = occupancy {
        message.push_str(&format!(" - occupancy: {:.0}%", rate));
    }

    message
}

/// Conditions detected by the heuristic attention sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttentionKind {
    /// Active stage past its end instant
    TimeOverrun,
    /// Waiting stage whose departure target has been met
    DeparturesComplete,
    /// Active stage whose start instant is still in the future
    PrematureActivation,
    /// Active stage holding no pilgrims
    ZeroPopulation,
    /// Active stage within a day of its deadline with no departures yet
    NoDeparturesNearDeadline,
    /// Active stage population above the operational ceiling
    OverCapacity,
}

impl AttentionKind {
    /// Priority this condition maps to.
    pub fn priority(&self) -> AlertPriority {
        match self {
            Self::TimeOverrun | Self::NoDeparturesNearDeadline | Self::OverCapacity => {
                AlertPriority::Critical
            }
            Self::DeparturesComplete | Self::PrematureActivation | Self::ZeroPopulation => {
                AlertPriority::High
            }
        }
    }

    /// Render the message template for a given stage.
    pub fn render_message(&self, stage: &Stage) -> String {
        match self {
            Self::TimeOverrun => {
                format!("{} is still active past its scheduled end", stage.name)
            }
            Self::DeparturesComplete => format!(
                "{} has reached its departure target ({} of {})",
                stage.name, stage.departed_count, stage.required_departures
            ),
            Self::PrematureActivation => {
                format!("{} is active before its scheduled start", stage.name)
            }
            Self::ZeroPopulation => {
                format!("{} is active with no pilgrims present", stage.name)
            }
            Self::NoDeparturesNearDeadline => format!(
                "{} has under 24 hours remaining and no recorded departures",
                stage.name
            ),
            Self::OverCapacity => format!(
                "{} holds {} pilgrims, above the {} ceiling",
                stage.name, stage.current_pilgrims, MAX_STAGE_POPULATION
            ),
        }
    }
}

impl std::fmt::Display for AttentionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TimeOverrun => write!(f, "time overrun"),
            Self::DeparturesComplete => write!(f, "departures complete"),
            Self::PrematureActivation => write!(f, "premature activation"),
            Self::ZeroPopulation => write!(f, "zero population"),
            Self::NoDeparturesNearDeadline => write!(f, "no departures near deadline"),
            Self::OverCapacity => write!(f, "over capacity"),
        }
    }
}

/// One heuristic condition matched by [`needs_attention`].
#[derive(Debug, Clone, PartialEq)]
pub struct AttentionFinding {
    pub kind: AttentionKind,
    pub priority: AlertPriority,
    pub message: String,
}

impl AttentionFinding {
    fn new(kind: AttentionKind, stage: &Stage) -> Self {
        Self {
            kind,
            priority: kind.priority(),
            message: kind.render_message(stage),
        }
    }
}

/// Run the heuristic attention sweep over a single stage.
///
/// Every matching condition is returned; a stage can be simultaneously
/// over capacity and past its end instant. Stages outside the active and
/// waiting-departure statuses never match. Independent of [`classify`];
/// both policies may fire for the same stage.
pub fn needs_attention(stage: &Stage, now: DateTime<Utc>) -> Result<Vec<AttentionFinding>> {
    let mut findings = Vec::new();

    if stage.status == StageStatus::WaitingDeparture {
        if stage.departed_count >= stage.required_departures {
            findings.push(AttentionFinding::new(AttentionKind::DeparturesComplete, stage));
        }
        return Ok(findings);
    }

    if stage.status != StageStatus::Active {
        return Ok(findings);
    }

    let start = to_instant(&stage.start_date, &stage.start_time)?;
    let end = to_instant(&stage.end_date, &stage.end_time)?;
    let remaining = hours_remaining(now, end);

    if now > end {
        findings.push(AttentionFinding::new(AttentionKind::TimeOverrun, stage));
    }

    if now < start {
        findings.push(AttentionFinding::new(AttentionKind::PrematureActivation, stage));
    }

    if stage.current_pilgrims == 0 {
        findings.push(AttentionFinding::new(AttentionKind::ZeroPopulation, stage));
    }

    if remaining > 0.0 && remaining <= APPROACHING_THRESHOLD_HOURS && stage.departed_count == 0 {
        findings.push(AttentionFinding::new(
            AttentionKind::NoDeparturesNearDeadline,
            stage,
        ));
    }

    if stage.current_pilgrims > MAX_STAGE_POPULATION {
        findings.push(AttentionFinding::new(AttentionKind::OverCapacity, stage));
    }

    Ok(findings)
}

/// Channel fan-out for alerts created outside the primary policy, keyed by
/// priority alone.
pub fn channels_for_priority(priority: AlertPriority) -> Vec<NotificationChannel> {
    match priority {
        AlertPriority::Critical => vec![
            NotificationChannel::Push,
            NotificationChannel::Sms,
            NotificationChannel::Email,
            NotificationChannel::InApp,
        ],
        AlertPriority::High => vec![
            NotificationChannel::Push,
            NotificationChannel::Email,
            NotificationChannel::InApp,
        ],
        AlertPriority::Medium | AlertPriority::Low => vec![NotificationChannel::InApp],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 4, 12, 0, 0).unwrap()
    }

    /// Stage whose end instant sits `hours` ahead of (or behind) `now()`.
    fn stage_ending_in(hours: i64) -> Stage {
        let end = now() + Duration::hours(hours);
        let mut stage = Stage::new(1, "Arafat to Muzdalifah", StageStatus::Active);
        stage.start_date = "2025-06-03".to_string();
        stage.start_time = "08:00".to_string();
        stage.end_date = end.format("%Y-%m-%d").to_string();
        stage.end_time = end.format("%H:%M").to_string();
        stage.current_pilgrims = 4_000;
        stage.departed_count = 10;
        stage.required_departures = 40;
        stage
    }

    #[test]
    fn test_classify_overdue_band() {
        let analysis = classify(&stage_ending_in(-2), now()).unwrap();

        assert_eq!(analysis.priority, AlertPriority::Critical);
        assert_eq!(
            analysis.channels,
            vec![
                NotificationChannel::Push,
                NotificationChannel::Sms,
                NotificationChannel::Whatsapp,
                NotificationChannel::Email,
                NotificationChannel::InApp,
            ]
        );
        assert!(analysis.needs_alert);
        assert!(analysis.time_remaining <= -1.0);
    }

    #[test]
    fn test_classify_imminent_band() {
        let analysis = classify(&stage_ending_in(5), now()).unwrap();

        assert_eq!(analysis.priority, AlertPriority::Critical);
        assert_eq!(
            analysis.channels,
            vec![
                NotificationChannel::Push,
                NotificationChannel::Sms,
                NotificationChannel::Email,
                NotificationChannel::InApp,
            ]
        );
        assert!(analysis.needs_alert);
    }

    #[test]
    fn test_classify_approaching_band() {
        let analysis = classify(&stage_ending_in(20), now()).unwrap();

        assert_eq!(analysis.priority, AlertPriority::High);
        assert_eq!(
            analysis.channels,
            vec![
                NotificationChannel::Push,
                NotificationChannel::Email,
                NotificationChannel::InApp,
            ]
        );
        assert!(analysis.needs_alert);
    }

    #[test]
    fn test_classify_comfortable_band() {
        let analysis = classify(&stage_ending_in(72), now()).unwrap();

        assert_eq!(analysis.priority, AlertPriority::Low);
        assert_eq!(analysis.channels, vec![NotificationChannel::InApp]);
        assert!(!analysis.needs_alert);
    }

    #[test]
    fn test_classify_band_boundaries_are_inclusive() {
        // Thresholds compare with <=, so the boundary value lands in the
        // tighter band.
        let at_overdue = classify(&stage_ending_in(-1), now()).unwrap();
        assert_eq!(at_overdue.priority, AlertPriority::Critical);
        assert!(at_overdue.channels.contains(&NotificationChannel::Whatsapp));

        let at_imminent = classify(&stage_ending_in(6), now()).unwrap();
        assert_eq!(at_imminent.priority, AlertPriority::Critical);
        assert!(!at_imminent.channels.contains(&NotificationChannel::Whatsapp));

        let at_approaching = classify(&stage_ending_in(24), now()).unwrap();
        assert_eq!(at_approaching.priority, AlertPriority::High);

        let at_window = classify(&stage_ending_in(48), now()).unwrap();
        assert_eq!(at_window.priority, AlertPriority::Low);
        assert!(at_window.needs_alert);

        let past_window = classify(&stage_ending_in(49), now()).unwrap();
        assert!(!past_window.needs_alert);
    }

    #[test]
    fn test_classify_needs_alert_inside_window() {
        // 48h window gates persistence even in the low band.
        let analysis = classify(&stage_ending_in(40), now()).unwrap();
        assert_eq!(analysis.priority, AlertPriority::Low);
        assert!(analysis.needs_alert);
    }

    #[test]
    fn test_needs_alert_monotonic_as_deadline_nears() {
        let mut previously_needed = false;
        for hours in (-48..=96).rev() {
            let analysis = classify(&stage_ending_in(hours), now()).unwrap();
            if previously_needed {
                assert!(
                    analysis.needs_alert,
                    "needs_alert flipped back off at {hours}h remaining"
                );
            }
            previously_needed = analysis.needs_alert;
        }
    }

    #[test]
    fn test_classify_overdue_uses_ended_message() {
        let analysis = classify(&stage_ending_in(-2), now()).unwrap();
        assert!(analysis.message.contains("ended"));
        assert!(!analysis.message.contains("remaining"));
        assert!(!analysis.message.contains("past due"));
    }

    #[test]
    fn test_classify_countdown_message() {
        let analysis = classify(&stage_ending_in(20), now()).unwrap();
        assert!(analysis.message.contains("approximately 20 hours remaining"));
    }

    #[test]
    fn test_classify_occupancy_is_reserved() {
        let mut stage = stage_ending_in(5);
        stage.current_pilgrims = 9_000;
        stage.max_capacity = 10_000;

        let analysis = classify(&stage, now()).unwrap();
        assert_eq!(analysis.occupancy_rate, 0.0);
        assert!(!analysis.message.contains("occupancy"));
    }

    #[test]
    fn test_classify_departure_rate_passthrough() {
        let analysis = classify(&stage_ending_in(5), now()).unwrap();
        assert!((analysis.departure_rate - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_classify_invalid_end_time_fails() {
        let mut stage = stage_ending_in(5);
        stage.end_time = "quarter past nine".to_string();
        assert!(classify(&stage, now()).is_err());
    }

    #[test]
    fn test_render_message_with_occupancy_suffix() {
        let stage = stage_ending_in(20);
        let message = render_alert_message(&stage, 20.0, Some(83.4));
        assert!(message.contains("occupancy: 83%"));
    }

    // =====================================================================
    // Heuristic sweep
    // =====================================================================

    #[test]
    fn test_attention_time_overrun_is_critical() {
        let stage = stage_ending_in(-3);
        let findings = needs_attention(&stage, now()).unwrap();

        let overrun = findings
            .iter()
            .find(|f| f.kind == AttentionKind::TimeOverrun)
            .expect("overrun finding");
        assert_eq!(overrun.priority, AlertPriority::Critical);
        assert!(overrun.message.contains("past its scheduled end"));
    }

    #[test]
    fn test_attention_departures_complete() {
        let mut stage = stage_ending_in(5);
        stage.status = StageStatus::WaitingDeparture;
        stage.departed_count = 40;
        stage.required_departures = 40;

        let findings = needs_attention(&stage, now()).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, AttentionKind::DeparturesComplete);
        assert_eq!(findings[0].priority, AlertPriority::High);
    }

    #[test]
    fn test_attention_waiting_departure_below_target() {
        let mut stage = stage_ending_in(5);
        stage.status = StageStatus::WaitingDeparture;
        stage.departed_count = 10;
        stage.required_departures = 40;

        assert!(needs_attention(&stage, now()).unwrap().is_empty());
    }

    #[test]
    fn test_attention_premature_activation() {
        let mut stage = stage_ending_in(80);
        stage.start_date = "2025-06-04".to_string();
        stage.start_time = "13:00".to_string(); // one hour after `now`

        let findings = needs_attention(&stage, now()).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, AttentionKind::PrematureActivation);
        assert_eq!(findings[0].priority, AlertPriority::High);

        // Independent of the primary policy, which only looks at end time.
        let analysis = classify(&stage, now()).unwrap();
        assert_eq!(analysis.priority, AlertPriority::Low);
    }

    #[test]
    fn test_attention_zero_population() {
        let mut stage = stage_ending_in(80);
        stage.current_pilgrims = 0;
        stage.departed_count = 5;

        let findings = needs_attention(&stage, now()).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, AttentionKind::ZeroPopulation);
    }

    #[test]
    fn test_attention_no_departures_near_deadline() {
        let mut stage = stage_ending_in(10);
        stage.departed_count = 0;
        stage.required_departures = 40;

        let findings = needs_attention(&stage, now()).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, AttentionKind::NoDeparturesNearDeadline);
        assert_eq!(findings[0].priority, AlertPriority::Critical);
    }

    #[test]
    fn test_attention_over_capacity_regardless_of_time() {
        for hours in [-5, 10, 200] {
            let mut stage = stage_ending_in(hours);
            stage.current_pilgrims = 16_000;

            let findings = needs_attention(&stage, now()).unwrap();
            let over = findings
                .iter()
                .find(|f| f.kind == AttentionKind::OverCapacity)
                .expect("over-capacity finding");
            assert_eq!(over.priority, AlertPriority::Critical);
        }
    }

    #[test]
    fn test_attention_at_ceiling_does_not_fire() {
        let mut stage = stage_ending_in(80);
        stage.current_pilgrims = MAX_STAGE_POPULATION;
        assert!(needs_attention(&stage, now()).unwrap().is_empty());
    }

    #[test]
    fn test_attention_multiple_conditions_stack() {
        let mut stage = stage_ending_in(-3);
        stage.current_pilgrims = 16_000;

        let kinds: Vec<_> = needs_attention(&stage, now())
            .unwrap()
            .into_iter()
            .map(|f| f.kind)
            .collect();
        assert!(kinds.contains(&AttentionKind::TimeOverrun));
        assert!(kinds.contains(&AttentionKind::OverCapacity));
    }

    #[test]
    fn test_attention_ignores_completed_stages() {
        let mut stage = stage_ending_in(-3);
        stage.status = StageStatus::Completed;
        assert!(needs_attention(&stage, now()).unwrap().is_empty());
    }

    #[test]
    fn test_attention_healthy_active_stage_is_clean() {
        let stage = stage_ending_in(80);
        assert!(needs_attention(&stage, now()).unwrap().is_empty());
    }

    #[test]
    fn test_channels_for_priority() {
        assert_eq!(
            channels_for_priority(AlertPriority::Critical),
            vec![
                NotificationChannel::Push,
                NotificationChannel::Sms,
                NotificationChannel::Email,
                NotificationChannel::InApp,
            ]
        );
        assert_eq!(
            channels_for_priority(AlertPriority::Low),
            vec![NotificationChannel::InApp]
        );
    }
}
