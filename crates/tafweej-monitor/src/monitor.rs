//! The stage monitor scheduler.
//!
//! [`StageMonitor`] owns the recurring evaluation timer and the reactive
//! stage-change subscription, both funneling into the same evaluation
//! routine. The lifecycle is a two-state machine (stopped/running) with
//! idempotent `start`/`stop`. On start it runs one immediate evaluation
//! pass, registers the change subscription, and arms the periodic timer;
//! the periodic sweep is the safety net for anything the reactive path
//! misses.
//!
//! Passes are not serialized against each other: a reactive evaluation can
//! run while a slow sweep is still in flight, and two concurrent passes may
//! each insert an alert for the same stage. The store-level duplicate
//! suppression switch (`suppress_duplicate_open_alerts`) is the mitigation
//! when that matters.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tafweej_core::config::MonitorConfig;
//! use tafweej_monitor::{FileStageRepository, StageMonitor};
//! use tafweej_notify::NotificationDispatcher;
//! use tafweej_store::{AlertDatabase, SqliteAlertStore};
//!
//! #[tokio::main]
//! async fn main() -> tafweej_core::Result<()> {
//!     let db = Arc::new(AlertDatabase::open("alerts.db").expect("open db"));
//!     let store = Arc::new(SqliteAlertStore::new(db));
//!     let dispatcher = Arc::new(NotificationDispatcher::new(store.clone()));
//!     let repository = Arc::new(FileStageRepository::new("stages".into())?);
//!
//!     let mut monitor = StageMonitor::new(repository, store, dispatcher, MonitorConfig::default());
//!     monitor.start().await;
//!
//!     tokio::signal::ctrl_c().await.ok();
//!     monitor.stop();
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tafweej_core::config::MonitorConfig;
use tafweej_core::error::Result;
use tafweej_core::policy::{
    self, channels_for_priority, AlertAnalysis, OVERDUE_THRESHOLD_HOURS,
};
use tafweej_core::repo::{AlertStore, StageChange, StageRepository};
use tafweej_core::types::{
    AlertMetadata, AlertPriority, NewAlert, NotificationChannel, Stage, StageStatus,
};
use tafweej_notify::NotificationDispatcher;

/// Statuses fetched by the periodic evaluation sweep.
const EVALUATION_STATUSES: [StageStatus; 3] = [
    StageStatus::Active,
    StageStatus::WaitingDeparture,
    StageStatus::Completed,
];

/// Statuses inspected by the ad-hoc attention sweep.
const ATTENTION_STATUSES: [StageStatus; 2] =
    [StageStatus::Active, StageStatus::WaitingDeparture];

/// Outcome counts for one evaluation or attention pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Stages fetched and inspected
    pub evaluated: usize,
    /// Alerts inserted and dispatched
    pub alerts_created: usize,
    /// Alerts withheld by duplicate suppression
    pub suppressed: usize,
    /// Stages skipped over unparsable date/time fields
    pub skipped_invalid: usize,
}

/// Outcome of one alert-creation request.
enum CreateOutcome {
    Created,
    Suppressed,
    Failed,
}

/// Shared state driving both the timer and the subscription task.
struct MonitorInner {
    repository: Arc<dyn StageRepository>,
    store: Arc<dyn AlertStore>,
    dispatcher: Arc<NotificationDispatcher>,
    config: MonitorConfig,
}

/// The monitor scheduler.
///
/// An owned instance: the host application constructs and holds it, and
/// several independent monitors can coexist (each owns its own timer and
/// subscription). External callers interact only through
/// [`start`](Self::start) and [`stop`](Self::stop).
pub struct StageMonitor {
    inner: Arc<MonitorInner>,
    shutdown_tx: Option<watch::Sender<bool>>,
    poll_task: Option<JoinHandle<()>>,
    subscription_task: Option<JoinHandle<()>>,
}

impl StageMonitor {
    /// Create a stopped monitor.
    pub fn new(
        repository: Arc<dyn StageRepository>,
        store: Arc<dyn AlertStore>,
        dispatcher: Arc<NotificationDispatcher>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                repository,
                store,
                dispatcher,
                config,
            }),
            shutdown_tx: None,
            poll_task: None,
            subscription_task: None,
        }
    }

    /// True while the timer is armed.
    pub fn is_running(&self) -> bool {
        self.poll_task.is_some()
    }

    /// Start monitoring. No-op when already running.
    ///
    /// Runs one immediate evaluation pass (unless configured off),
    /// registers the stage-change subscription, and arms the recurring
    /// timer. Pass failures are logged, never propagated: the next
    /// scheduled tick retries from scratch.
    pub async fn start(&mut self) {
        if self.is_running() {
            debug!("monitor already running, ignoring start");
            return;
        }

        info!(
            poll_interval_secs = self.inner.config.poll_interval_secs,
            suppress_duplicates = self.inner.config.suppress_duplicate_open_alerts,
            "starting stage monitor"
        );

        if self.inner.config.run_on_start {
            if let Err(e) = self.inner.run_evaluation_pass().await {
                warn!(error = %e, "initial evaluation pass aborted");
            }
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.shutdown_tx = Some(shutdown_tx);

        // Reactive path: sub-interval responsiveness for abrupt transitions.
        // A failed subscription degrades to polling-only; the periodic
        // sweep still catches everything, just slower.
        match self.inner.repository.subscribe().await {
            Ok(mut rx) => {
                let inner = Arc::clone(&self.inner);
                let mut shutdown = shutdown_rx.clone();
                self.subscription_task = Some(tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            change = rx.recv() => match change {
                                Some(change) => inner.handle_stage_change(change).await,
                                None => {
                                    debug!("stage change feed closed");
                                    break;
                                }
                            },
                            _ = shutdown.changed() => break,
                        }
                    }
                }));
            }
            Err(e) => {
                warn!(error = %e, "stage change subscription failed, continuing with periodic sweeps only");
            }
        }

        let inner = Arc::clone(&self.inner);
        let mut shutdown = shutdown_rx;
        let period = self.inner.config.poll_interval();
        self.poll_task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately and the start pass
            // already covered it.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = inner.run_evaluation_pass().await {
                            warn!(error = %e, "scheduled evaluation pass aborted");
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
        }));
    }

    /// Stop monitoring. No-op when already stopped.
    ///
    /// Signals both tasks to exit; the shutdown is observed between
    /// passes, so an in-flight evaluation completes naturally and only
    /// future scheduling is halted.
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if self.poll_task.take().is_some() {
            info!("stage monitor stopped");
        }
        self.subscription_task.take();
    }

    /// Run a single evaluation pass now, outside the schedule.
    pub async fn run_evaluation_pass(&self) -> Result<PassSummary> {
        self.inner.run_evaluation_pass().await
    }

    /// Run the heuristic attention sweep over active and waiting stages.
    pub async fn run_attention_sweep(&self) -> Result<PassSummary> {
        self.inner.run_attention_sweep().await
    }
}

impl Drop for StageMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl MonitorInner {
    /// One full evaluation pass over the monitored statuses.
    ///
    /// Fails only when the repository itself is unavailable; everything
    /// else is contained per stage.
    async fn run_evaluation_pass(&self) -> Result<PassSummary> {
        let stages = self
            .repository
            .list_stages(&EVALUATION_STATUSES)
            .await?;
        let now = Utc::now();

        let mut summary = PassSummary::default();

        for stage in &stages {
            summary.evaluated += 1;

            let analysis = match policy::classify(stage, now) {
                Ok(analysis) => analysis,
                Err(e) => {
                    warn!(stage_id = stage.id, error = %e, "skipping stage for this pass");
                    summary.skipped_invalid += 1;
                    continue;
                }
            };

            // The overdue re-check is redundant with needs_alert but kept
            // as an independent guard on the dominant condition.
            if analysis.needs_alert || analysis.time_remaining <= OVERDUE_THRESHOLD_HOURS {
                let outcome = self
                    .create_and_dispatch(
                        stage,
                        analysis.priority,
                        analysis.channels.clone(),
                        analysis.message.clone(),
                        self.build_metadata(stage, Some(&analysis)),
                    )
                    .await;
                summary.record(outcome);
            }
        }

        info!(
            evaluated = summary.evaluated,
            alerts_created = summary.alerts_created,
            suppressed = summary.suppressed,
            skipped_invalid = summary.skipped_invalid,
            "evaluation pass complete"
        );

        Ok(summary)
    }

    /// Ad-hoc diagnostic sweep through the heuristic policy.
    ///
    /// Independent of the primary classification; a stage already alerted
    /// by `classify` can be flagged again here.
    async fn run_attention_sweep(&self) -> Result<PassSummary> {
        let stages = self.repository.list_stages(&ATTENTION_STATUSES).await?;
        let now = Utc::now();

        let mut summary = PassSummary::default();

        for stage in &stages {
            summary.evaluated += 1;

            let findings = match policy::needs_attention(stage, now) {
                Ok(findings) => findings,
                Err(e) => {
                    warn!(stage_id = stage.id, error = %e, "skipping stage for this sweep");
                    summary.skipped_invalid += 1;
                    continue;
                }
            };

            for finding in findings {
                debug!(
                    stage_id = stage.id,
                    kind = %finding.kind,
                    priority = %finding.priority,
                    "attention finding"
                );
                let outcome = self
                    .create_and_dispatch(
                        stage,
                        finding.priority,
                        channels_for_priority(finding.priority),
                        finding.message,
                        self.build_metadata(stage, None),
                    )
                    .await;
                summary.record(outcome);
            }
        }

        info!(
            evaluated = summary.evaluated,
            alerts_created = summary.alerts_created,
            "attention sweep complete"
        );

        Ok(summary)
    }

    /// Reactive path: re-derive one stage's classification immediately
    /// when the change warrants it, instead of waiting for the next tick.
    async fn handle_stage_change(&self, change: StageChange) {
        let stage = &change.current;

        if !stage.status.is_monitored() {
            debug!(stage_id = stage.id, status = %stage.status, "change on unmonitored status");
            return;
        }

        let analysis = match policy::classify(stage, Utc::now()) {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(stage_id = stage.id, error = %e, "cannot classify changed stage");
                return;
            }
        };

        let past_end = analysis.time_remaining < 0.0;
        if !(past_end || change.status_changed() || analysis.needs_alert) {
            debug!(stage_id = stage.id, "change does not warrant immediate evaluation");
            return;
        }

        debug!(
            stage_id = stage.id,
            past_end,
            status_changed = change.status_changed(),
            needs_alert = analysis.needs_alert,
            "reactive evaluation"
        );

        if analysis.needs_alert || analysis.time_remaining <= OVERDUE_THRESHOLD_HOURS {
            let metadata = self.build_metadata(stage, Some(&analysis));
            self.create_and_dispatch(
                stage,
                analysis.priority,
                analysis.channels,
                analysis.message,
                metadata,
            )
            .await;
        }
    }

    /// Insert one alert and fan it out.
    ///
    /// Creation is not deduplicated unless the suppression switch is on;
    /// by default every qualifying pass inserts a fresh row. A failed
    /// insert drops the alert for this pass only, since the underlying
    /// condition re-qualifies on the next one.
    async fn create_and_dispatch(
        &self,
        stage: &Stage,
        priority: AlertPriority,
        channels: Vec<NotificationChannel>,
        message: String,
        metadata: AlertMetadata,
    ) -> CreateOutcome {
        if self.config.suppress_duplicate_open_alerts {
            match self.store.has_open_alert(stage.id, priority).await {
                Ok(true) => {
                    debug!(stage_id = stage.id, priority = %priority, "duplicate open alert suppressed");
                    return CreateOutcome::Suppressed;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(stage_id = stage.id, error = %e, "duplicate check failed, inserting anyway");
                }
            }
        }

        let new_alert = NewAlert {
            stage_id: stage.id,
            priority,
            message,
            channels,
            metadata,
        };

        match self.store.insert_alert(new_alert).await {
            Ok(alert) => {
                info!(
                    alert_id = alert.id,
                    stage_id = stage.id,
                    priority = %priority,
                    "alert created"
                );
                self.dispatcher.dispatch(&alert).await;
                CreateOutcome::Created
            }
            Err(e) => {
                warn!(stage_id = stage.id, error = %e, "alert dropped for this pass");
                CreateOutcome::Failed
            }
        }
    }

    /// Metadata bag attached for downstream display.
    fn build_metadata(&self, stage: &Stage, analysis: Option<&AlertAnalysis>) -> AlertMetadata {
        AlertMetadata {
            time_remaining: analysis.map(|a| a.time_remaining),
            occupancy_rate: stage.occupancy_rate(),
            departure_rate: Some(stage.departure_rate()),
            current_pilgrims: Some(stage.current_pilgrims),
            max_capacity: (stage.max_capacity > 0).then_some(stage.max_capacity),
        }
    }
}

impl PassSummary {
    fn record(&mut self, outcome: CreateOutcome) {
        match outcome {
            CreateOutcome::Created => self.alerts_created += 1,
            CreateOutcome::Suppressed => self.suppressed += 1,
            CreateOutcome::Failed => {}
        }
    }
}
