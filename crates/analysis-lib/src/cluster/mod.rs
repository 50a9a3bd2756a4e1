//! Cluster metadata access
//!
//! The collection pipeline and the event recorder only see the
//! [`ClusterClient`] trait. [`KubeApiClient`] implements it against the API
//! server and the node agents' stats endpoints; [`EndpointSelector`] picks a
//! healthy API server before every cycle.

mod connector;
mod kube;

pub use connector::{EndpointSelector, SelectorConfig};
pub use kube::{KubeApiClient, KubeletConfig};

use crate::error::Result;
use crate::models::{ClusterEvent, PodDescriptor, SampleBatch};
use async_trait::async_trait;

/// Read access to cluster state plus event cleanup
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn list_namespaces(&self) -> Result<Vec<String>>;

    /// Names of the workload groups (replication controllers) in a namespace
    async fn list_workload_groups(&self, namespace: &str) -> Result<Vec<String>>;

    /// Names of the pods belonging to a workload group
    async fn list_pod_names(&self, namespace: &str, group: &str) -> Result<Vec<String>>;

    async fn get_pod_descriptor(&self, namespace: &str, pod: &str) -> Result<PodDescriptor>;

    /// Recent readings of one container from its node agent
    async fn get_container_sample_batch(
        &self,
        host: &str,
        namespace: &str,
        pod: &str,
        uid: &str,
        container: &str,
    ) -> Result<SampleBatch>;

    async fn list_events(&self) -> Result<Vec<ClusterEvent>>;

    async fn delete_event(&self, self_link: &str) -> Result<()>;
}

/// Produces a [`ClusterClient`] for one cycle
#[async_trait]
pub trait ClusterConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn ClusterClient>>;
}

/// Whether a pod belongs to a workload group.
///
/// Generated pods carry `<group>-` as their generate-name; a pod named
/// exactly like the group also matches.
pub fn belongs_to_group(pod_name: &str, generate_name: Option<&str>, group: &str) -> bool {
    let prefixed = generate_name
        .and_then(|g| g.strip_suffix('-'))
        .map(|g| g == group)
        .unwrap_or(false);

    prefixed || pod_name == group
}
