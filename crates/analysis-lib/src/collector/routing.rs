//! Where container samples are stored, and how a batch becomes samples

use super::sanitize::sanitize_field_names;
use crate::error::{AnalysisError, Result};
use crate::models::{ContainerSample, SampleBatch, SearchMetaData};
use chrono::{DateTime, Utc};

pub const CONTAINER_METRICS_INDEX_PREFIX: &str = "container_metrics_";
pub const WORKLOAD_TYPE_PREFIX: &str = "workload_";

pub fn metrics_index(namespace: &str) -> String {
    format!("{}{}", CONTAINER_METRICS_INDEX_PREFIX, namespace.to_lowercase())
}

pub fn workload_type(group: &str) -> String {
    format!("{}{}", WORKLOAD_TYPE_PREFIX, group.to_lowercase())
}

/// Workload group name encoded in a document type
pub fn group_from_type(doc_type: &str) -> Option<&str> {
    doc_type.strip_prefix(WORKLOAD_TYPE_PREFIX)
}

/// `<pod>_<container>_YYYY-MM-DDTHH-MM-SS`, in UTC
pub fn sample_id(pod: &str, container: &str, timestamp: &DateTime<Utc>) -> String {
    format!("{}_{}_{}", pod, container, timestamp.format("%Y-%m-%dT%H-%M-%S"))
}

/// Identifies the container a batch was fetched for
#[derive(Debug, Clone, Copy)]
pub struct ContainerRef<'a> {
    pub namespace: &'a str,
    pub group: &'a str,
    pub pod: &'a str,
    pub container: &'a str,
}

/// One sample per stat block, each carrying the batch's sanitized metadata
pub fn split_batch(target: ContainerRef<'_>, batch: SampleBatch) -> Result<Vec<ContainerSample>> {
    let SampleBatch { stats, mut metadata } = batch;
    sanitize_field_names(&mut metadata);

    let index = metrics_index(target.namespace);
    let document_type = workload_type(target.group);

    stats
        .into_iter()
        .map(|block| {
            let timestamp = block.parsed_timestamp().ok_or_else(|| {
                AnalysisError::MalformedData(format!(
                    "container {}/{}/{} has unparseable stat timestamp {:?}",
                    target.namespace, target.pod, target.container, block.timestamp
                ))
            })?;

            Ok(ContainerSample {
                metadata: metadata.clone(),
                search_meta_data: SearchMetaData {
                    namespace: target.namespace.to_string(),
                    workload_group_name: target.group.to_string(),
                    pod_name: target.pod.to_string(),
                    container_name: target.container.to_string(),
                    index: index.clone(),
                    document_type: document_type.clone(),
                    id: sample_id(target.pod, target.container, &timestamp),
                },
                stats: block,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn target() -> ContainerRef<'static> {
        ContainerRef {
            namespace: "Default",
            group: "Web",
            pod: "web-a1b2c",
            container: "app",
        }
    }

    #[test]
    fn test_routing_is_lowercased() {
        assert_eq!(metrics_index("Default"), "container_metrics_default");
        assert_eq!(workload_type("Web"), "workload_web");
        assert_eq!(group_from_type("workload_web"), Some("web"));
        assert_eq!(group_from_type("other"), None);
    }

    #[test]
    fn test_sample_id_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 7, 5, 9).unwrap() + chrono::Duration::milliseconds(750);
        assert_eq!(sample_id("web-1", "app", &at), "web-1_app_2024-03-01T07-05-09");
    }

    #[test]
    fn test_split_copies_metadata_into_every_sample() {
        let batch: SampleBatch = serde_json::from_value(json!({
            "spec": { "labels": { "io.kubernetes.pod.name": "web-a1b2c" } },
            "stats": [
                { "timestamp": "2024-03-01T12:00:00.25+00:00", "cpu": { "usage": { "total": 1 } } },
                { "timestamp": "2024-03-01T12:00:01.25+00:00", "cpu": { "usage": { "total": 2 } } }
            ]
        }))
        .unwrap();

        let samples = split_batch(target(), batch).unwrap();

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].id(), "web-a1b2c_app_2024-03-01T12-00-01");
        assert_eq!(samples[1].index(), "container_metrics_default");
        assert_eq!(samples[1].document_type(), "workload_web");
        assert_eq!(samples[1].search_meta_data.workload_group_name, "Web");

        let document = samples[0].to_document().unwrap();
        assert_eq!(document["spec"]["labels"]["io_kubernetes_pod_name"], "web-a1b2c");
        assert_eq!(document["stats"]["cpu"]["usage"]["total"], 1);
        assert_eq!(document["searchMetaData"]["podName"], "web-a1b2c");
    }

    #[test]
    fn test_unparseable_timestamp_fails_container() {
        let batch: SampleBatch = serde_json::from_value(json!({
            "stats": [
                { "timestamp": "2024-03-01T12:00:00Z" },
                { "timestamp": "not a time" }
            ]
        }))
        .unwrap();

        let err = split_batch(target(), batch).unwrap_err();
        assert!(matches!(err, AnalysisError::MalformedData(_)));
    }
}
