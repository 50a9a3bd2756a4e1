//! Typed view of the aggregation response and its conversion to series

use super::interpolate::interpolate_gaps;
use crate::error::{AnalysisError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    aggregations: Option<Aggregations>,
}

#[derive(Debug, Deserialize)]
struct Aggregations {
    aggregation_time_interval: BucketList<TimeBucket>,
}

#[derive(Debug, Deserialize)]
struct BucketList<T> {
    #[serde(default = "Vec::new")]
    buckets: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct TimeBucket {
    key_as_string: Option<String>,
    key: Option<i64>,
    aggregation_pod: Option<BucketList<PodBucket>>,
}

#[derive(Debug, Deserialize)]
struct PodBucket {
    key: String,
    aggregation_container: Option<BucketList<ContainerBucket>>,
}

#[derive(Debug, Deserialize)]
struct ContainerBucket {
    key: String,
    doc_count: Option<i64>,
    minimum_cpu_usage_total: Option<MetricValue>,
    average_memory_usage: Option<MetricValue>,
    minimum_network_rx_bytes: Option<MetricValue>,
    minimum_network_tx_bytes: Option<MetricValue>,
    minimum_network_rx_packets: Option<MetricValue>,
    minimum_network_tx_packets: Option<MetricValue>,
    minimum_diskio_io_service_bytes_stats_total: Option<MetricValue>,
    minimum_diskio_io_serviced_stats_total: Option<MetricValue>,
}

#[derive(Debug, Deserialize)]
struct MetricValue {
    value: Option<f64>,
}

fn metric(value: &Option<MetricValue>) -> Option<i64> {
    value
        .as_ref()
        .and_then(|m| m.value)
        .filter(|v| v.is_finite())
        .map(|v| v.trunc() as i64)
}

/// The nine per-bucket series of one container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSeries {
    pub document_count_slice: Vec<Option<i64>>,
    pub minimum_cpu_usage_total_slice: Vec<Option<i64>>,
    pub average_memory_usage_slice: Vec<Option<i64>>,
    pub minimum_diskio_io_service_bytes_stats_total_slice: Vec<Option<i64>>,
    pub minimum_diskio_io_serviced_stats_total_slice: Vec<Option<i64>>,
    pub minimum_network_rx_packets_slice: Vec<Option<i64>>,
    pub minimum_network_tx_packets_slice: Vec<Option<i64>>,
    pub minimum_network_rx_bytes_slice: Vec<Option<i64>>,
    pub minimum_network_tx_bytes_slice: Vec<Option<i64>>,
}

impl ContainerSeries {
    /// All-null series of `len` slots
    pub fn with_len(len: usize) -> Self {
        let empty = vec![None; len];
        Self {
            document_count_slice: empty.clone(),
            minimum_cpu_usage_total_slice: empty.clone(),
            average_memory_usage_slice: empty.clone(),
            minimum_diskio_io_service_bytes_stats_total_slice: empty.clone(),
            minimum_diskio_io_serviced_stats_total_slice: empty.clone(),
            minimum_network_rx_packets_slice: empty.clone(),
            minimum_network_tx_packets_slice: empty.clone(),
            minimum_network_rx_bytes_slice: empty.clone(),
            minimum_network_tx_bytes_slice: empty,
        }
    }

    fn all_mut(&mut self) -> [&mut Vec<Option<i64>>; 9] {
        [
            &mut self.document_count_slice,
            &mut self.minimum_cpu_usage_total_slice,
            &mut self.average_memory_usage_slice,
            &mut self.minimum_diskio_io_service_bytes_stats_total_slice,
            &mut self.minimum_diskio_io_serviced_stats_total_slice,
            &mut self.minimum_network_rx_packets_slice,
            &mut self.minimum_network_tx_packets_slice,
            &mut self.minimum_network_rx_bytes_slice,
            &mut self.minimum_network_tx_bytes_slice,
        ]
    }

    /// Every series, in output order
    pub fn all(&self) -> [&Vec<Option<i64>>; 9] {
        [
            &self.document_count_slice,
            &self.minimum_cpu_usage_total_slice,
            &self.average_memory_usage_slice,
            &self.minimum_diskio_io_service_bytes_stats_total_slice,
            &self.minimum_diskio_io_serviced_stats_total_slice,
            &self.minimum_network_rx_packets_slice,
            &self.minimum_network_tx_packets_slice,
            &self.minimum_network_rx_bytes_slice,
            &self.minimum_network_tx_bytes_slice,
        ]
    }

    fn write(&mut self, slot: usize, cell: &ContainerBucket) {
        let values = [
            cell.doc_count,
            metric(&cell.minimum_cpu_usage_total),
            metric(&cell.average_memory_usage),
            metric(&cell.minimum_diskio_io_service_bytes_stats_total),
            metric(&cell.minimum_diskio_io_serviced_stats_total),
            metric(&cell.minimum_network_rx_packets),
            metric(&cell.minimum_network_tx_packets),
            metric(&cell.minimum_network_rx_bytes),
            metric(&cell.minimum_network_tx_bytes),
        ];
        for (series, value) in self.all_mut().into_iter().zip(values) {
            series[slot] = value;
        }
    }

    fn interpolate(&mut self) {
        for series in self.all_mut() {
            interpolate_gaps(series);
        }
    }
}

/// Key of the time axis in the serialized form
pub const TIMESTAMP_KEY: &str = "timestamp";

/// Aggregated series of one workload group, aligned on a shared time axis.
///
/// Pods share the top-level namespace with the `timestamp` axis, so a pod
/// named `timestamp` is left out of the result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupMetrics {
    #[serde(rename = "timestamp")]
    pub timestamps: Vec<String>,
    /// pod -> container -> series
    #[serde(flatten)]
    pub pods: BTreeMap<String, BTreeMap<String, ContainerSeries>>,
}

impl GroupMetrics {
    /// Decode a search response and fill gaps in every series
    pub fn from_response(response: Value) -> Result<Self> {
        let response: SearchResponse = serde_json::from_value(response)
            .map_err(|e| AnalysisError::MalformedData(format!("aggregation response: {}", e)))?;

        let buckets = response
            .aggregations
            .map(|a| a.aggregation_time_interval.buckets)
            .unwrap_or_default();
        let slots = buckets.len();

        let mut metrics = GroupMetrics {
            timestamps: Vec::with_capacity(slots),
            pods: BTreeMap::new(),
        };

        for (slot, bucket) in buckets.into_iter().enumerate() {
            let timestamp = match (bucket.key_as_string, bucket.key) {
                (Some(text), _) => text,
                (None, Some(millis)) => millis.to_string(),
                (None, None) => String::new(),
            };
            metrics.timestamps.push(timestamp);

            let pods = bucket.aggregation_pod.map(|p| p.buckets).unwrap_or_default();
            for pod in pods {
                if pod.key == TIMESTAMP_KEY {
                    warn!(pod = %pod.key, "Pod name collides with the time axis key, skipping");
                    continue;
                }
                let containers = pod
                    .aggregation_container
                    .map(|c| c.buckets)
                    .unwrap_or_default();
                let pod_series = metrics.pods.entry(pod.key).or_default();
                for cell in containers {
                    pod_series
                        .entry(cell.key.clone())
                        .or_insert_with(|| ContainerSeries::with_len(slots))
                        .write(slot, &cell);
                }
            }
        }

        for series in metrics.pods.values_mut().flat_map(|p| p.values_mut()) {
            series.interpolate();
        }

        Ok(metrics)
    }
}
