//! In-process cluster used by unit tests

use crate::cluster::{ClusterClient, ClusterConnector};
use crate::error::{AnalysisError, Result};
use crate::models::{ClusterEvent, PodDescriptor, SampleBatch};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub(crate) struct FakeCluster {
    pub namespaces: Vec<String>,
    pub fail_namespaces: bool,
    pub groups: BTreeMap<String, Vec<String>>,
    pub failing_group_listings: HashSet<String>,
    pub pods: BTreeMap<(String, String), Vec<String>>,
    pub descriptors: BTreeMap<(String, String), PodDescriptor>,
    pub batches: BTreeMap<(String, String), Value>,
    pub events: Vec<ClusterEvent>,
    pub failing_event_deletes: HashSet<String>,
    pub deleted_events: Mutex<Vec<String>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pod of `group` in `namespace` with the given containers
    pub fn with_pod(mut self, namespace: &str, group: &str, pod: &str, containers: &[&str]) -> Self {
        if !self.namespaces.iter().any(|n| n == namespace) {
            self.namespaces.push(namespace.to_string());
        }
        let groups = self.groups.entry(namespace.to_string()).or_default();
        if !groups.iter().any(|g| g == group) {
            groups.push(group.to_string());
        }
        self.pods
            .entry((namespace.to_string(), group.to_string()))
            .or_default()
            .push(pod.to_string());
        self.descriptors.insert(
            (namespace.to_string(), pod.to_string()),
            PodDescriptor {
                name: pod.to_string(),
                host_address: "10.0.0.5".to_string(),
                uid: format!("uid-{}", pod),
                containers: containers.iter().map(|c| c.to_string()).collect(),
            },
        );
        self
    }

    pub fn with_batch(mut self, pod: &str, container: &str, batch: Value) -> Self {
        self.batches.insert((pod.to_string(), container.to_string()), batch);
        self
    }

    pub fn with_event(mut self, namespace: &str, name: &str) -> Self {
        let self_link = format!("/api/v1/namespaces/{}/events/{}", namespace, name);
        let document = json!({
            "metadata": { "name": name, "namespace": namespace, "selfLink": self_link },
            "reason": "Scheduled",
            "lastTimestamp": "2024-03-01T12:00:00Z"
        });
        let Value::Object(document) = document else {
            unreachable!()
        };
        self.events.push(ClusterEvent {
            namespace: namespace.to_string(),
            self_link,
            document,
        });
        self
    }

    pub fn deleted_events(&self) -> Vec<String> {
        self.deleted_events.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

/// A one-reading batch at `timestamp`
pub(crate) fn single_reading_batch(timestamp: &str, cpu_total: u64) -> Value {
    json!({
        "name": "/kubepods/container",
        "spec": { "labels": { "io.kubernetes.container.name": "app" } },
        "stats": [
            {
                "timestamp": timestamp,
                "cpu": { "usage": { "total": cpu_total } },
                "memory": { "usage": 1024 }
            }
        ]
    })
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn list_namespaces(&self) -> Result<Vec<String>> {
        if self.fail_namespaces {
            return Err(AnalysisError::Cluster("API server unavailable".to_string()));
        }
        Ok(self.namespaces.clone())
    }

    async fn list_workload_groups(&self, namespace: &str) -> Result<Vec<String>> {
        if self.failing_group_listings.contains(namespace) {
            return Err(AnalysisError::Cluster(format!("forbidden: {}", namespace)));
        }
        Ok(self.groups.get(namespace).cloned().unwrap_or_default())
    }

    async fn list_pod_names(&self, namespace: &str, group: &str) -> Result<Vec<String>> {
        Ok(self
            .pods
            .get(&(namespace.to_string(), group.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_pod_descriptor(&self, namespace: &str, pod: &str) -> Result<PodDescriptor> {
        self.descriptors
            .get(&(namespace.to_string(), pod.to_string()))
            .cloned()
            .ok_or_else(|| AnalysisError::Cluster(format!("pod {} not found", pod)))
    }

    async fn get_container_sample_batch(
        &self,
        _host: &str,
        _namespace: &str,
        pod: &str,
        _uid: &str,
        container: &str,
    ) -> Result<SampleBatch> {
        let batch = self
            .batches
            .get(&(pod.to_string(), container.to_string()))
            .cloned()
            .ok_or_else(|| AnalysisError::Cluster(format!("node agent unreachable for {}/{}", pod, container)))?;
        serde_json::from_value(batch).map_err(|e| AnalysisError::MalformedData(e.to_string()))
    }

    async fn list_events(&self) -> Result<Vec<ClusterEvent>> {
        Ok(self.events.clone())
    }

    async fn delete_event(&self, self_link: &str) -> Result<()> {
        if self.failing_event_deletes.contains(self_link) {
            return Err(AnalysisError::Cluster(format!("cannot delete {}", self_link)));
        }
        if let Ok(mut deleted) = self.deleted_events.lock() {
            deleted.push(self_link.to_string());
        }
        Ok(())
    }
}

/// Hands out the same fake cluster every cycle
pub(crate) struct StaticConnector(pub Arc<FakeCluster>);

struct SharedCluster(Arc<FakeCluster>);

#[async_trait]
impl ClusterClient for SharedCluster {
    async fn list_namespaces(&self) -> Result<Vec<String>> {
        self.0.list_namespaces().await
    }

    async fn list_workload_groups(&self, namespace: &str) -> Result<Vec<String>> {
        self.0.list_workload_groups(namespace).await
    }

    async fn list_pod_names(&self, namespace: &str, group: &str) -> Result<Vec<String>> {
        self.0.list_pod_names(namespace, group).await
    }

    async fn get_pod_descriptor(&self, namespace: &str, pod: &str) -> Result<PodDescriptor> {
        self.0.get_pod_descriptor(namespace, pod).await
    }

    async fn get_container_sample_batch(
        &self,
        host: &str,
        namespace: &str,
        pod: &str,
        uid: &str,
        container: &str,
    ) -> Result<SampleBatch> {
        self.0
            .get_container_sample_batch(host, namespace, pod, uid, container)
            .await
    }

    async fn list_events(&self) -> Result<Vec<ClusterEvent>> {
        self.0.list_events().await
    }

    async fn delete_event(&self, self_link: &str) -> Result<()> {
        self.0.delete_event(self_link).await
    }
}

#[async_trait]
impl ClusterConnector for StaticConnector {
    async fn connect(&self) -> Result<Box<dyn ClusterClient>> {
        Ok(Box::new(SharedCluster(self.0.clone())))
    }
}
