//! Moves cluster events into the document store

use super::EVENT_INDEX;
use crate::cluster::ClusterClient;
use crate::error::{AnalysisError, FailureReport, Result};
use crate::store::query::{hits, time_sorted_search, Page, TimeRange};
use crate::store::DocumentStore;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

const ACKNOWLEDGE_FIELD: &str = "searchMetaData.acknowledge";
const TIMESTAMP_FIELD: &str = "lastTimestamp";

/// Document id of an event: its self link with every `/` replaced by `_`
pub fn event_id(self_link: &str) -> String {
    self_link.replace('/', "_")
}

/// Outcome of one recording pass
#[derive(Debug)]
pub struct RecordingSummary {
    pub listed: usize,
    pub recorded: usize,
    pub failures: FailureReport,
}

impl RecordingSummary {
    /// Number of recorded events, or the failures if there were any
    pub fn into_result(self) -> Result<usize> {
        let recorded = self.recorded;
        self.failures.into_result(recorded)
    }
}

pub struct EventRecorder {
    store: Arc<dyn DocumentStore>,
}

impl EventRecorder {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Move every event out of the cluster into the event index.
    ///
    /// An event is deleted from the cluster only after it was persisted.
    /// Only a failure to list events is returned as `Err`; everything else
    /// is collected in the summary.
    pub async fn record(&self, cluster: &dyn ClusterClient) -> Result<RecordingSummary> {
        let events = cluster.list_events().await?;
        let mut summary = RecordingSummary {
            listed: events.len(),
            recorded: 0,
            failures: FailureReport::new("event recording"),
        };

        for event in events {
            let id = event_id(&event.self_link);
            let mut document = event.document;
            document.insert("searchMetaData".to_string(), json!({ "acknowledge": false }));

            if let Err(e) = self
                .store
                .put(EVENT_INDEX, &event.namespace, &id, &Value::Object(document))
                .await
            {
                warn!(namespace = %event.namespace, id = %id, error = %e, "Failed to persist event");
                summary.failures.record(format!("event {}: {}", id, e));
                continue;
            }
            summary.recorded += 1;

            if let Err(e) = cluster.delete_event(&event.self_link).await {
                warn!(self_link = %event.self_link, error = %e, "Failed to delete recorded event");
                summary.failures.record(format!("delete {}: {}", event.self_link, e));
            }
        }

        debug!(listed = summary.listed, recorded = summary.recorded, "Recorded cluster events");
        Ok(summary)
    }

    /// Like [`EventRecorder::record`], folding failures into one error
    pub async fn record_all(&self, cluster: &dyn ClusterClient) -> Result<usize> {
        self.record(cluster).await?.into_result()
    }

    /// Newest-first search hits of one namespace, or of all namespaces when
    /// `namespace` is `None`
    pub async fn search(
        &self,
        namespace: Option<&str>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        acknowledge: bool,
        page: Page,
    ) -> Result<Vec<Value>> {
        let range = TimeRange::new(from, to)?;
        let query = time_sorted_search(
            TIMESTAMP_FIELD,
            &range,
            vec![json!({ "term": { ACKNOWLEDGE_FIELD: acknowledge } })],
            page,
        );

        let response = self
            .store
            .search(EVENT_INDEX, namespace.unwrap_or("*"), &query)
            .await?;
        hits(&response)
    }

    /// Set the acknowledge flag of a recorded event
    pub async fn acknowledge(&self, namespace: &str, id: &str, acknowledge: bool) -> Result<()> {
        let mut document = self.store.get(EVENT_INDEX, namespace, id).await?;

        let Some(fields) = document.as_object_mut() else {
            return Err(AnalysisError::MalformedData(format!(
                "event {} in {} is not an object",
                id, namespace
            )));
        };
        let meta = fields
            .entry("searchMetaData")
            .or_insert_with(|| Value::Object(Map::new()));
        if !meta.is_object() {
            *meta = Value::Object(Map::new());
        }
        if let Some(meta) = meta.as_object_mut() {
            meta.insert("acknowledge".to_string(), Value::Bool(acknowledge));
        }

        self.store.put(EVENT_INDEX, namespace, id, &document).await?;
        self.store.refresh(EVENT_INDEX).await
    }

    /// Namespaces with recorded events
    pub async fn list_namespaces(&self) -> Result<Vec<String>> {
        match self.store.list_types_for_index(EVENT_INDEX).await {
            Ok(namespaces) => Ok(namespaces),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}
