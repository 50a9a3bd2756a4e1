//! Periodic task scheduling
//!
//! Each task gets its own loop ticking at a fixed interval. Every tick
//! consults the singleton election first (which is also the lease renewal);
//! the task body runs only while this replica is the active singleton.

use crate::election::SingletonElection;
use crate::error::Result;
use crate::health::{components, HealthRegistry};
use crate::observability::{AnalysisMetrics, StructuredLogger};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Work run on every tick while this replica holds the task's lock
#[async_trait]
pub trait PeriodicTask: Send + Sync {
    /// Lock name contended through the election
    fn name(&self) -> &str;

    /// Health component updated with each cycle's outcome
    fn component(&self) -> &str;

    async fn run_once(&self) -> Result<()>;
}

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not the active singleton
    Skipped,
    Completed,
    Failed,
}

pub struct TaskLoop {
    task: Arc<dyn PeriodicTask>,
    election: Arc<SingletonElection>,
    health: HealthRegistry,
    metrics: AnalysisMetrics,
    logger: StructuredLogger,
    interval: Duration,
    active: bool,
}

impl TaskLoop {
    pub fn new(
        task: Arc<dyn PeriodicTask>,
        election: Arc<SingletonElection>,
        health: HealthRegistry,
        logger: StructuredLogger,
        interval: Duration,
    ) -> Self {
        Self {
            task,
            election,
            health,
            metrics: AnalysisMetrics::new(),
            logger,
            interval,
            active: false,
        }
    }

    /// Tick until a shutdown signal arrives. A cycle already running when the
    /// signal arrives finishes first; missed ticks are dropped, not queued.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            task = %self.task.name(),
            interval_secs = self.interval.as_secs_f64(),
            "Starting periodic task"
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.recv() => {
                    info!(task = %self.task.name(), "Shutting down periodic task");
                    break;
                }
            }
        }

        if self.active {
            self.set_active(false);
        }
    }

    /// Consult the election and run the task when selected
    pub async fn tick(&mut self) -> TickOutcome {
        let name = self.task.name().to_string();

        let selected = match self.election.is_selected_as_singleton(&name).await {
            Ok(selected) => {
                self.health.set_healthy(components::ELECTION).await;
                selected
            }
            Err(e) => {
                warn!(task = %name, error = %e, "Singleton election failed");
                self.health.set_unhealthy(components::ELECTION, e.to_string()).await;
                false
            }
        };

        if selected != self.active {
            self.set_active(selected);
        }

        if !selected {
            debug!(task = %name, "Not the active singleton, skipping");
            return TickOutcome::Skipped;
        }

        let start = Instant::now();
        let result = self.task.run_once().await;
        self.health.record(self.task.component(), &result).await;

        match result {
            Ok(()) => {
                debug!(task = %name, elapsed_ms = start.elapsed().as_millis(), "Task cycle complete");
                TickOutcome::Completed
            }
            Err(e) => {
                warn!(task = %name, elapsed_ms = start.elapsed().as_millis(), error = %e, "Task cycle failed");
                TickOutcome::Failed
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    fn set_active(&mut self, active: bool) {
        self.active = active;
        self.metrics.set_singleton_active(self.task.name(), active);
        self.logger.log_election_transition(self.task.name(), active);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::election::{ElectionConfig, ManualClock};
    use crate::error::FailureReport;
    use crate::health::ComponentStatus;
    use crate::store::{DocumentStore, MemoryStore};
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTask {
        name: String,
        runs: AtomicUsize,
        fail: bool,
    }

    impl CountingTask {
        fn new(name: &str, fail: bool) -> Self {
            Self {
                name: name.to_string(),
                runs: AtomicUsize::new(0),
                fail,
            }
        }
    }

    #[async_trait]
    impl PeriodicTask for CountingTask {
        fn name(&self) -> &str {
            &self.name
        }

        fn component(&self) -> &str {
            components::METRICS_PIPELINE
        }

        async fn run_once(&self) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                let mut report = FailureReport::new("test");
                report.record("container broke");
                return report.into_result(());
            }
            Ok(())
        }
    }

    fn manual_election(clock: Arc<ManualClock>) -> Arc<SingletonElection> {
        let config = ElectionConfig {
            lock_timeout: Duration::from_millis(1000),
            candidacy_grace_period: Duration::from_millis(500),
        };
        Arc::new(SingletonElection::with_clock(
            Arc::new(MemoryStore::new()),
            "10.0.0.1",
            config,
            clock,
        ))
    }

    #[tokio::test]
    async fn test_task_runs_only_when_selected() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let task = Arc::new(CountingTask::new("loop_test_selected", false));
        let health = HealthRegistry::new();
        let mut task_loop = TaskLoop::new(
            task.clone(),
            manual_election(clock.clone()),
            health.clone(),
            StructuredLogger::new("10.0.0.1"),
            Duration::from_millis(400),
        );

        assert_eq!(task_loop.tick().await, TickOutcome::Skipped);
        clock.advance(chrono::Duration::milliseconds(400));
        assert_eq!(task_loop.tick().await, TickOutcome::Skipped);
        clock.advance(chrono::Duration::milliseconds(400));
        assert_eq!(task_loop.tick().await, TickOutcome::Skipped);
        assert_eq!(task.runs.load(Ordering::SeqCst), 0);

        clock.advance(chrono::Duration::milliseconds(400));
        assert_eq!(task_loop.tick().await, TickOutcome::Completed);
        assert!(task_loop.is_active());
        assert_eq!(task.runs.load(Ordering::SeqCst), 1);

        let status = health.health().await.components[components::METRICS_PIPELINE].status;
        assert_eq!(status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_failed_cycle_degrades_component() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let task = Arc::new(CountingTask::new("loop_test_failing", true));
        let health = HealthRegistry::new();
        let mut task_loop = TaskLoop::new(
            task.clone(),
            manual_election(clock.clone()),
            health.clone(),
            StructuredLogger::new("10.0.0.1"),
            Duration::from_millis(400),
        );

        for _ in 0..3 {
            task_loop.tick().await;
            clock.advance(chrono::Duration::milliseconds(400));
        }

        assert_eq!(task_loop.tick().await, TickOutcome::Failed);
        let status = health.health().await.components[components::METRICS_PIPELINE].status;
        assert_eq!(status, ComponentStatus::Degraded);
    }

    #[tokio::test]
    async fn test_election_error_skips_tick() {
        let store = Arc::new(MemoryStore::new());
        store
            .put(
                crate::election::LOCK_INDEX,
                crate::election::LOCK_TYPE,
                "loop_test_broken_lock",
                &serde_json::json!({ "id": 42 }),
            )
            .await
            .unwrap();
        let election = Arc::new(SingletonElection::new(store, "10.0.0.1", ElectionConfig::default()));
        let task = Arc::new(CountingTask::new("loop_test_broken_lock", false));
        let health = HealthRegistry::new();
        let mut task_loop = TaskLoop::new(
            task.clone(),
            election,
            health.clone(),
            StructuredLogger::new("10.0.0.1"),
            Duration::from_secs(1),
        );

        assert_eq!(task_loop.tick().await, TickOutcome::Skipped);
        assert_eq!(task.runs.load(Ordering::SeqCst), 0);

        let report = health.health().await;
        let election_health = &report.components[components::ELECTION];
        assert_eq!(election_health.status, ComponentStatus::Unhealthy);
        assert!(election_health.message.as_deref().unwrap().contains("malformed"));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let config = ElectionConfig {
            lock_timeout: Duration::from_secs(60),
            candidacy_grace_period: Duration::ZERO,
        };
        let election = Arc::new(SingletonElection::new(
            Arc::new(MemoryStore::new()),
            "10.0.0.1",
            config,
        ));
        let task = Arc::new(CountingTask::new("loop_test_shutdown", false));
        let task_loop = TaskLoop::new(
            task.clone(),
            election,
            HealthRegistry::new(),
            StructuredLogger::new("10.0.0.1"),
            Duration::from_millis(10),
        );

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(task_loop.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();

        assert!(task.runs.load(Ordering::SeqCst) > 0);
    }
}
