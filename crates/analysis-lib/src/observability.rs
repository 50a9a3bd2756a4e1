//! Observability infrastructure for the analysis service
//!
//! Provides:
//! - Prometheus metrics (collection and aggregation latency, persisted samples,
//!   recorded events, per-task singleton state)
//! - Structured JSON logging with tracing

use crate::collector::CollectionSummary;
use prometheus::{
    register_histogram, register_int_counter, register_int_gauge_vec, Histogram, IntCounter,
    IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for cycle latencies (in seconds)
const CYCLE_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

/// Histogram buckets for aggregation query latencies (in seconds)
const QUERY_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AnalysisMetricsInner> = OnceLock::new();

struct AnalysisMetricsInner {
    collection_latency_seconds: Histogram,
    aggregation_latency_seconds: Histogram,
    samples_persisted: IntCounter,
    collection_errors: IntCounter,
    events_recorded: IntCounter,
    singleton_active: IntGaugeVec,
}

impl AnalysisMetricsInner {
    fn new() -> Self {
        Self {
            collection_latency_seconds: register_histogram!(
                "cluster_analysis_collection_latency_seconds",
                "Duration of a full metrics collection cycle",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register collection_latency_seconds"),

            aggregation_latency_seconds: register_histogram!(
                "cluster_analysis_aggregation_latency_seconds",
                "Duration of an aggregated metrics query",
                QUERY_BUCKETS.to_vec()
            )
            .expect("Failed to register aggregation_latency_seconds"),

            samples_persisted: register_int_counter!(
                "cluster_analysis_samples_persisted_total",
                "Container samples written to the document store"
            )
            .expect("Failed to register samples_persisted"),

            collection_errors: register_int_counter!(
                "cluster_analysis_collection_errors_total",
                "Failures recorded during collection cycles"
            )
            .expect("Failed to register collection_errors"),

            events_recorded: register_int_counter!(
                "cluster_analysis_events_recorded_total",
                "Cluster events moved into the document store"
            )
            .expect("Failed to register events_recorded"),

            singleton_active: register_int_gauge_vec!(
                "cluster_analysis_singleton_active",
                "Whether this replica is the active singleton for a task",
                &["task"]
            )
            .expect("Failed to register singleton_active"),
        }
    }
}

/// Handle to the process-wide metrics. Clones share the same metrics.
#[derive(Clone)]
pub struct AnalysisMetrics {
    _private: (),
}

impl Default for AnalysisMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AnalysisMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AnalysisMetricsInner {
        GLOBAL_METRICS.get_or_init(AnalysisMetricsInner::new)
    }

    pub fn observe_collection_latency(&self, duration_secs: f64) {
        self.inner().collection_latency_seconds.observe(duration_secs);
    }

    pub fn observe_aggregation_latency(&self, duration_secs: f64) {
        self.inner().aggregation_latency_seconds.observe(duration_secs);
    }

    pub fn add_samples_persisted(&self, count: u64) {
        self.inner().samples_persisted.inc_by(count);
    }

    pub fn add_collection_errors(&self, count: u64) {
        self.inner().collection_errors.inc_by(count);
    }

    pub fn add_events_recorded(&self, count: u64) {
        self.inner().events_recorded.inc_by(count);
    }

    pub fn set_singleton_active(&self, task: &str, active: bool) {
        self.inner()
            .singleton_active
            .with_label_values(&[task])
            .set(i64::from(active));
    }

    pub fn samples_persisted(&self) -> u64 {
        self.inner().samples_persisted.get()
    }

    pub fn singleton_active(&self, task: &str) -> bool {
        self.inner().singleton_active.with_label_values(&[task]).get() == 1
    }
}

/// Consistently shaped log events for the service lifecycle
#[derive(Clone)]
pub struct StructuredLogger {
    holder_id: String,
}

impl StructuredLogger {
    pub fn new(holder_id: impl Into<String>) -> Self {
        Self {
            holder_id: holder_id.into(),
        }
    }

    pub fn log_startup(&self, version: &str, api_port: u16) {
        info!(
            event = "service_started",
            holder = %self.holder_id,
            version = %version,
            api_port = api_port,
            "Cluster analysis service started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            holder = %self.holder_id,
            reason = %reason,
            "Cluster analysis service shutting down"
        );
    }

    /// Log a change of this replica's singleton state for a task
    pub fn log_election_transition(&self, task: &str, active: bool) {
        if active {
            info!(
                event = "singleton_acquired",
                holder = %self.holder_id,
                task = %task,
                "Became active singleton"
            );
        } else {
            warn!(
                event = "singleton_released",
                holder = %self.holder_id,
                task = %task,
                "No longer the active singleton"
            );
        }
    }

    pub fn log_collection_cycle(&self, summary: &CollectionSummary, failures: usize, elapsed_ms: u128) {
        if failures == 0 {
            info!(
                event = "collection_cycle",
                holder = %self.holder_id,
                namespaces = summary.namespaces,
                workload_groups = summary.workload_groups,
                pods = summary.pods,
                containers = summary.containers,
                samples = summary.samples_persisted,
                elapsed_ms = elapsed_ms,
                "Collection cycle complete"
            );
        } else {
            warn!(
                event = "collection_cycle",
                holder = %self.holder_id,
                namespaces = summary.namespaces,
                workload_groups = summary.workload_groups,
                pods = summary.pods,
                containers = summary.containers,
                samples = summary.samples_persisted,
                failures = failures,
                elapsed_ms = elapsed_ms,
                "Collection cycle finished with failures"
            );
        }
    }

    pub fn log_event_recording(&self, recorded: usize, failures: usize) {
        info!(
            event = "event_recording",
            holder = %self.holder_id,
            recorded = recorded,
            failures = failures,
            "Event recording cycle complete"
        );
    }
}
