//! Cluster-wide collection of per-second container samples

use super::routing::{split_batch, ContainerRef};
use crate::cluster::ClusterClient;
use crate::error::{FailureReport, Result};
use crate::store::DocumentStore;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Pods of one workload group fetched at the same time
    pub max_concurrent_pods: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_pods: 8,
        }
    }
}

/// Counts of what one cycle walked and wrote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSummary {
    pub namespaces: usize,
    pub workload_groups: usize,
    pub pods: usize,
    pub containers: usize,
    pub samples_persisted: usize,
}

/// A finished walk: what succeeded plus every recorded failure
#[derive(Debug, Clone)]
pub struct CollectionOutcome {
    pub summary: CollectionSummary,
    pub failures: FailureReport,
}

impl CollectionOutcome {
    pub fn into_result(self) -> Result<CollectionSummary> {
        self.failures.into_result(self.summary)
    }
}

/// Result of one pod, merged into the cycle outcome by the walking task
#[derive(Default)]
struct PodOutcome {
    containers: usize,
    samples_persisted: usize,
    failures: Vec<String>,
}

pub struct MetricsPipeline {
    store: Arc<dyn DocumentStore>,
    config: PipelineConfig,
}

impl MetricsPipeline {
    pub fn new(store: Arc<dyn DocumentStore>, config: PipelineConfig) -> Self {
        Self { store, config }
    }

    /// Walk every namespace, workload group, pod and container, persisting
    /// one document per reading.
    ///
    /// Only a failure to list namespaces aborts the walk. Everything else is
    /// recorded and returned as one combined error once the walk is done.
    pub async fn collect_all(&self, cluster: &dyn ClusterClient) -> Result<CollectionSummary> {
        self.collect(cluster).await?.into_result()
    }

    /// Like [`collect_all`](Self::collect_all), but hands back the summary
    /// alongside the failures instead of folding them into an error
    pub async fn collect(&self, cluster: &dyn ClusterClient) -> Result<CollectionOutcome> {
        let namespaces = cluster.list_namespaces().await?;

        let mut outcome = CollectionOutcome {
            summary: CollectionSummary {
                namespaces: namespaces.len(),
                ..CollectionSummary::default()
            },
            failures: FailureReport::new("metrics collection"),
        };

        for namespace in &namespaces {
            let groups = match cluster.list_workload_groups(namespace).await {
                Ok(groups) => groups,
                Err(e) => {
                    warn!(namespace = %namespace, error = %e, "Failed to list workload groups");
                    outcome
                        .failures
                        .record(format!("namespace {}: {}", namespace, e));
                    continue;
                }
            };

            for group in &groups {
                outcome.summary.workload_groups += 1;
                self.collect_group(cluster, namespace, group, &mut outcome).await;
            }
        }

        Ok(outcome)
    }

    async fn collect_group(
        &self,
        cluster: &dyn ClusterClient,
        namespace: &str,
        group: &str,
        outcome: &mut CollectionOutcome,
    ) {
        let pods = match cluster.list_pod_names(namespace, group).await {
            Ok(pods) => pods,
            Err(e) => {
                warn!(namespace = %namespace, group = %group, error = %e, "Failed to list pods");
                outcome
                    .failures
                    .record(format!("workload group {}/{}: {}", namespace, group, e));
                return;
            }
        };

        let pending: Vec<_> = pods
            .iter()
            .map(|pod| self.collect_pod(cluster, namespace, group, pod))
            .collect();
        let results: Vec<PodOutcome> = stream::iter(pending)
            .buffer_unordered(self.config.max_concurrent_pods.max(1))
            .collect()
            .await;

        outcome.summary.pods += pods.len();
        for pod in results {
            outcome.summary.containers += pod.containers;
            outcome.summary.samples_persisted += pod.samples_persisted;
            for failure in pod.failures {
                outcome.failures.record(failure);
            }
        }
    }

    async fn collect_pod(&self, cluster: &dyn ClusterClient, namespace: &str, group: &str, pod: &str) -> PodOutcome {
        let mut result = PodOutcome::default();

        let descriptor = match cluster.get_pod_descriptor(namespace, pod).await {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!(namespace = %namespace, pod = %pod, error = %e, "Failed to describe pod");
                result.failures.push(format!("pod {}/{}: {}", namespace, pod, e));
                return result;
            }
        };

        for container in &descriptor.containers {
            result.containers += 1;
            let target = ContainerRef {
                namespace,
                group,
                pod,
                container,
            };

            let samples = match cluster
                .get_container_sample_batch(&descriptor.host_address, namespace, pod, &descriptor.uid, container)
                .await
                .and_then(|batch| split_batch(target, batch))
            {
                Ok(samples) => samples,
                Err(e) => {
                    warn!(namespace = %namespace, pod = %pod, container = %container, error = %e, "Failed to collect container");
                    result
                        .failures
                        .push(format!("container {}/{}/{}: {}", namespace, pod, container, e));
                    continue;
                }
            };

            for sample in &samples {
                let written = match sample.to_document() {
                    Ok(document) => {
                        self.store
                            .put(sample.index(), sample.document_type(), sample.id(), &document)
                            .await
                    }
                    Err(e) => Err(e.into()),
                };

                match written {
                    Ok(()) => result.samples_persisted += 1,
                    Err(e) => {
                        warn!(id = %sample.id(), error = %e, "Failed to persist sample");
                        result.failures.push(format!("sample {}: {}", sample.id(), e));
                    }
                }
            }

            debug!(namespace = %namespace, pod = %pod, container = %container, samples = samples.len(), "Collected container");
        }

        result
    }
}
