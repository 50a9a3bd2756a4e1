//! Aggregation query construction and request validation

use crate::error::{AnalysisError, Result};
use crate::models::format_rfc3339_nanos;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

/// Upper bound on distinct pods or containers returned per time bucket
pub const MAX_TERMS: usize = 1000;

/// A validated aggregation window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    /// Histogram interval in whole seconds, at least 1
    pub bucket_seconds: i64,
}

impl AggregationWindow {
    /// Split `[from, to]` into roughly `aggregation_amount` buckets.
    ///
    /// Rejects a non-positive amount and an inverted range.
    pub fn new(aggregation_amount: i64, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self> {
        if aggregation_amount <= 0 {
            return Err(AnalysisError::InvalidInput(format!(
                "aggregation amount must be positive, got {}",
                aggregation_amount
            )));
        }
        if from > to {
            return Err(AnalysisError::InvalidInput(format!(
                "from {} can't be after to {}",
                format_rfc3339_nanos(&from),
                format_rfc3339_nanos(&to)
            )));
        }

        let span_seconds = (to - from).num_seconds();
        let bucket_seconds = (span_seconds / aggregation_amount).max(1);

        Ok(Self {
            from,
            to,
            bucket_seconds,
        })
    }

    /// Range on the sample timestamp, histogram per bucket, then terms on pod
    /// and container with the nine per-cell metrics
    pub fn to_query(&self) -> Value {
        json!({
            "query": {
                "range": {
                    "stats.timestamp": {
                        "gte": format_rfc3339_nanos(&self.from),
                        "lte": format_rfc3339_nanos(&self.to),
                        "time_zone": "+00:00"
                    }
                }
            },
            "size": 0,
            "aggregations": {
                "aggregation_time_interval": {
                    "date_histogram": {
                        "field": "stats.timestamp",
                        "interval": format!("{}s", self.bucket_seconds)
                    },
                    "aggregations": {
                        "aggregation_pod": {
                            "terms": { "field": "searchMetaData.podName", "size": MAX_TERMS },
                            "aggregations": {
                                "aggregation_container": {
                                    "terms": { "field": "searchMetaData.containerName", "size": MAX_TERMS },
                                    "aggregations": {
                                        "minimum_cpu_usage_total": { "min": { "field": "stats.cpu.usage.total" } },
                                        "average_memory_usage": { "avg": { "field": "stats.memory.usage" } },
                                        "minimum_network_rx_bytes": { "min": { "field": "stats.network.rx_bytes" } },
                                        "minimum_network_tx_bytes": { "min": { "field": "stats.network.tx_bytes" } },
                                        "minimum_network_rx_packets": { "min": { "field": "stats.network.rx_packets" } },
                                        "minimum_network_tx_packets": { "min": { "field": "stats.network.tx_packets" } },
                                        "minimum_diskio_io_service_bytes_stats_total": {
                                            "min": { "field": "stats.diskio.io_service_bytes.stats.Total" }
                                        },
                                        "minimum_diskio_io_serviced_stats_total": {
                                            "min": { "field": "stats.diskio.io_serviced.stats.Total" }
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_bucket_width_is_floored() {
        let window = AggregationWindow::new(7, at(0), at(100)).unwrap();
        assert_eq!(window.bucket_seconds, 14);
    }

    #[test]
    fn test_bucket_width_never_zero() {
        let window = AggregationWindow::new(60, at(0), at(10)).unwrap();
        assert_eq!(window.bucket_seconds, 1);

        let empty = AggregationWindow::new(5, at(0), at(0)).unwrap();
        assert_eq!(empty.bucket_seconds, 1);
    }

    #[test]
    fn test_invalid_requests_rejected() {
        assert!(AggregationWindow::new(0, at(0), at(10)).unwrap_err().is_invalid_input());
        assert!(AggregationWindow::new(-3, at(0), at(10)).unwrap_err().is_invalid_input());
        assert!(AggregationWindow::new(5, at(10), at(0)).unwrap_err().is_invalid_input());
    }

    #[test]
    fn test_query_shape() {
        let query = AggregationWindow::new(10, at(0), at(600)).unwrap().to_query();

        assert_eq!(query["size"], 0);
        assert_eq!(query["query"]["range"]["stats.timestamp"]["time_zone"], "+00:00");

        let histogram = &query["aggregations"]["aggregation_time_interval"];
        assert_eq!(histogram["date_histogram"]["interval"], "60s");

        let pods = &histogram["aggregations"]["aggregation_pod"];
        assert_eq!(pods["terms"]["field"], "searchMetaData.podName");

        let metrics = &pods["aggregations"]["aggregation_container"]["aggregations"];
        assert_eq!(metrics.as_object().unwrap().len(), 8);
        assert_eq!(metrics["average_memory_usage"]["avg"]["field"], "stats.memory.usage");
    }
}
