//! # Scheduled trigger
//!
//! Fires the automated-task pipeline on a fixed period. A tick that arrives
//! while the previous run is still in flight is dropped, never queued.

use crate::metrics::attributes;
use crate::orchestrator::{PipelineOrchestrator, PipelineReport};
use chrono::Utc;
use pipeforge_config::SchedulerSettings;
use pipeforge_core::{ConfigMap, Domain, TaskRequest};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Shortest period the trigger accepts.
pub const MIN_PERIOD: Duration = Duration::from_secs(1);

/// Trigger configuration
#[derive(Debug, Clone)]
pub struct TriggerConfig {
    pub period: Duration,
    /// Automated task type every firing runs.
    pub task_type: String,
    pub config: ConfigMap,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self::from(&SchedulerSettings::default())
    }
}

impl From<&SchedulerSettings> for TriggerConfig {
    fn from(settings: &SchedulerSettings) -> Self {
        Self {
            period: settings.period(),
            task_type: settings.task_type.clone(),
            config: settings.config.clone(),
        }
    }
}

/// Counters since the trigger was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerStats {
    pub fired: u64,
    pub skipped: u64,
    pub completed: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    fired: AtomicU64,
    skipped: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// What one tick did.
#[derive(Debug)]
pub enum TickOutcome {
    Started(JoinHandle<PipelineReport>),
    Skipped,
}

impl TickOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, TickOutcome::Skipped)
    }
}

/// Clears the in-flight flag however the run ends.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Clone)]
pub struct ScheduledTrigger {
    orchestrator: PipelineOrchestrator,
    config: TriggerConfig,
    running: Arc<AtomicBool>,
    counters: Arc<Counters>,
    cancel: CancellationToken,
}

impl ScheduledTrigger {
    /// A period shorter than [`MIN_PERIOD`], zero included, is raised to it.
    pub fn new(orchestrator: PipelineOrchestrator, mut config: TriggerConfig) -> Self {
        if config.period < MIN_PERIOD {
            tracing::warn!(
                period_ms = config.period.as_millis() as u64,
                "scheduler period too short, using {MIN_PERIOD:?}"
            );
            config.period = MIN_PERIOD;
        }
        Self {
            orchestrator,
            config,
            running: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(Counters::default()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &TriggerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Fires one run unless the previous one is still in flight.
    pub fn tick(&self) -> TickOutcome {
        let timestamp = Utc::now().to_rfc3339();
        let metrics = self.orchestrator.metrics();

        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(task_type = %self.config.task_type, "previous scheduled run still in flight, tick dropped");
            metrics.record(
                "scheduled_workflow_skipped",
                attributes([
                    ("timestamp", json!(timestamp)),
                    ("type", json!(self.config.task_type)),
                ]),
            );
            return TickOutcome::Skipped;
        }

        let in_flight = InFlight(self.running.clone());
        self.counters.fired.fetch_add(1, Ordering::Relaxed);
        metrics.record(
            "scheduled_workflow",
            attributes([
                ("timestamp", json!(timestamp)),
                ("type", json!(self.config.task_type)),
            ]),
        );

        let request = TaskRequest::new(
            Domain::Automated,
            self.config.task_type.clone(),
            self.config.config.clone(),
        );
        let orchestrator = self.orchestrator.clone();
        let counters = self.counters.clone();
        let cancel = self.cancel.child_token();

        TickOutcome::Started(tokio::spawn(async move {
            let _in_flight = in_flight;
            let report = orchestrator.run_with_cancel(request, cancel).await;
            if report.succeeded() {
                counters.completed.fetch_add(1, Ordering::Relaxed);
            } else {
                counters.failed.fetch_add(1, Ordering::Relaxed);
            }
            report
        }))
    }

    /// Ticks every period until [`stop`](Self::stop). The first tick fires
    /// immediately; ticks missed while the loop was busy are not replayed.
    pub fn start(&self) -> JoinHandle<()> {
        let trigger = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(trigger.config.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!(
                period_secs = trigger.config.period.as_secs(),
                task_type = %trigger.config.task_type,
                "scheduled trigger started"
            );

            loop {
                tokio::select! {
                    _ = trigger.cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        trigger.tick();
                    }
                }
            }
            tracing::info!("scheduled trigger stopped");
        })
    }

    /// Stops ticking and cancels the in-flight run, if any.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn stats(&self) -> TriggerStats {
        TriggerStats {
            fired: self.counters.fired.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}
