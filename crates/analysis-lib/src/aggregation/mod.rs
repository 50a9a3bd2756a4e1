//! Historical metrics aggregation
//!
//! Turns the per-second container documents of a workload group into
//! fixed-width time buckets. Each (pod, container) cell carries nine series,
//! one slot per bucket, with gaps filled by interpolation.

mod interpolate;
mod query;
mod response;


pub use interpolate::interpolate_gaps;
pub use query::{AggregationWindow, MAX_TERMS};
pub use response::{ContainerSeries, GroupMetrics};

use crate::collector::{group_from_type, metrics_index, workload_type};
use crate::error::Result;
use crate::observability::AnalysisMetrics;
use crate::store::DocumentStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Output series names, in the order they are serialized
pub const METRIC_NAMES: [&str; 9] = [
    "documentCountSlice",
    "minimumCpuUsageTotalSlice",
    "averageMemoryUsageSlice",
    "minimumDiskioIoServiceBytesStatsTotalSlice",
    "minimumDiskioIoServicedStatsTotalSlice",
    "minimumNetworkRxPacketsSlice",
    "minimumNetworkTxPacketsSlice",
    "minimumNetworkRxBytesSlice",
    "minimumNetworkTxBytesSlice",
];

/// Result of [`AggregationEngine::get_aggregated_metrics`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AggregatedMetrics {
    Group(GroupMetrics),
    /// group -> metrics, for every group of a namespace
    Namespace(BTreeMap<String, GroupMetrics>),
}

pub struct AggregationEngine {
    store: Arc<dyn DocumentStore>,
    metrics: AnalysisMetrics,
}

impl AggregationEngine {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            metrics: AnalysisMetrics::new(),
        }
    }

    /// Aggregate one group, or every group of `namespace` when `group` is `None`
    pub async fn get_aggregated_metrics(
        &self,
        namespace: &str,
        group: Option<&str>,
        aggregation_amount: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<AggregatedMetrics> {
        match group {
            Some(group) => self
                .group_metrics(namespace, group, aggregation_amount, from, to)
                .await
                .map(AggregatedMetrics::Group),
            None => self
                .namespace_metrics(namespace, aggregation_amount, from, to)
                .await
                .map(AggregatedMetrics::Namespace),
        }
    }

    pub async fn group_metrics(
        &self,
        namespace: &str,
        group: &str,
        aggregation_amount: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<GroupMetrics> {
        let window = AggregationWindow::new(aggregation_amount, from, to)?;
        self.aggregate(namespace, group, &window).await
    }

    /// Every group found in the namespace index. Groups whose aggregation
    /// fails are logged and left out.
    pub async fn namespace_metrics(
        &self,
        namespace: &str,
        aggregation_amount: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<BTreeMap<String, GroupMetrics>> {
        let window = AggregationWindow::new(aggregation_amount, from, to)?;

        let mut result = BTreeMap::new();
        for group in self.list_workload_groups(namespace).await? {
            match self.aggregate(namespace, &group, &window).await {
                Ok(metrics) => {
                    result.insert(group, metrics);
                }
                Err(e) => warn!(
                    namespace = %namespace,
                    group = %group,
                    error = %e,
                    "Failed to aggregate workload group"
                ),
            }
        }
        Ok(result)
    }

    /// Workload groups with stored samples in `namespace`
    pub async fn list_workload_groups(&self, namespace: &str) -> Result<Vec<String>> {
        let types = self
            .store
            .list_types_for_index(&metrics_index(namespace))
            .await?;
        Ok(types
            .iter()
            .filter_map(|t| group_from_type(t))
            .map(str::to_string)
            .collect())
    }

    async fn aggregate(&self, namespace: &str, group: &str, window: &AggregationWindow) -> Result<GroupMetrics> {
        let start = Instant::now();
        let response = self
            .store
            .search(&metrics_index(namespace), &workload_type(group), &window.to_query())
            .await?;
        let metrics = GroupMetrics::from_response(response)?;
        self.metrics
            .observe_aggregation_latency(start.elapsed().as_secs_f64());

        debug!(
            namespace = %namespace,
            group = %group,
            bucket_seconds = window.bucket_seconds,
            buckets = metrics.timestamps.len(),
            pods = metrics.pods.len(),
            "Aggregated workload group metrics"
        );
        Ok(metrics)
    }
}
