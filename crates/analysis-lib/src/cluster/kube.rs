//! REST client for the API server and the node agents

use super::{belongs_to_group, ClusterClient};
use crate::error::{AnalysisError, Result};
use crate::models::{ClusterEvent, PodDescriptor, SampleBatch};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Where node agents serve container stats
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubeletConfig {
    pub scheme: String,
    pub port: u16,
}

impl Default for KubeletConfig {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            port: 10250,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ObjectList<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectMeta {
    #[serde(default)]
    name: String,
    generate_name: Option<String>,
    namespace: Option<String>,
    uid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedObject {
    #[serde(default)]
    metadata: ObjectMeta,
}

#[derive(Debug, Deserialize)]
struct Pod {
    #[serde(default)]
    metadata: ObjectMeta,
    #[serde(default)]
    spec: PodSpec,
    #[serde(default)]
    status: PodStatus,
}

#[derive(Debug, Default, Deserialize)]
struct PodSpec {
    #[serde(default)]
    containers: Vec<ContainerSpec>,
}

#[derive(Debug, Deserialize)]
struct ContainerSpec {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct PodStatus {
    #[serde(rename = "hostIP")]
    host_ip: Option<String>,
}

/// Client bound to one API server endpoint
pub struct KubeApiClient {
    http: Client,
    endpoint: Url,
    token: Option<String>,
    kubelet: KubeletConfig,
}

impl KubeApiClient {
    /// Node agents serve self-signed certificates, so certificate checks are
    /// disabled for every request made by this client.
    pub fn new(endpoint: Url, token: Option<String>, request_timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(request_timeout)
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self {
            http,
            endpoint,
            token,
            kubelet: KubeletConfig::default(),
        })
    }

    pub fn with_kubelet(mut self, kubelet: KubeletConfig) -> Self {
        self.kubelet = kubelet;
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn api_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| AnalysisError::InvalidInput(format!("{} cannot be used as a base URL", self.endpoint)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header(reqwest::header::AUTHORIZATION, token),
            None => request,
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Cluster(format!("{} returned {}: {}", what, status, body)));
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| AnalysisError::MalformedData(format!("{}: {}", what, e)))
    }

    async fn get_api<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let url = self.api_url(segments)?;
        debug!(url = %url, "Cluster API request");
        let what = url.path().to_string();
        self.fetch(self.authorized(self.http.get(url)), &what).await
    }
}

#[async_trait]
impl ClusterClient for KubeApiClient {
    async fn list_namespaces(&self) -> Result<Vec<String>> {
        let list: ObjectList<NamedObject> = self.get_api(&["api", "v1", "namespaces"]).await?;
        Ok(list.items.into_iter().map(|item| item.metadata.name).collect())
    }

    async fn list_workload_groups(&self, namespace: &str) -> Result<Vec<String>> {
        let list: ObjectList<NamedObject> = self
            .get_api(&["api", "v1", "namespaces", namespace, "replicationcontrollers"])
            .await?;
        Ok(list.items.into_iter().map(|item| item.metadata.name).collect())
    }

    async fn list_pod_names(&self, namespace: &str, group: &str) -> Result<Vec<String>> {
        let list: ObjectList<NamedObject> = self
            .get_api(&["api", "v1", "namespaces", namespace, "pods"])
            .await?;

        Ok(list
            .items
            .into_iter()
            .map(|item| item.metadata)
            .filter(|meta| !meta.name.is_empty())
            .filter(|meta| belongs_to_group(&meta.name, meta.generate_name.as_deref(), group))
            .map(|meta| meta.name)
            .collect())
    }

    async fn get_pod_descriptor(&self, namespace: &str, pod: &str) -> Result<PodDescriptor> {
        let pod_object: Pod = self
            .get_api(&["api", "v1", "namespaces", namespace, "pods", pod])
            .await?;

        let host_address = pod_object
            .status
            .host_ip
            .filter(|ip| !ip.is_empty())
            .ok_or_else(|| AnalysisError::MalformedData(format!("pod {}/{} has no host address", namespace, pod)))?;
        let uid = pod_object
            .metadata
            .uid
            .ok_or_else(|| AnalysisError::MalformedData(format!("pod {}/{} has no uid", namespace, pod)))?;

        Ok(PodDescriptor {
            name: pod.to_string(),
            host_address,
            uid,
            containers: pod_object.spec.containers.into_iter().map(|c| c.name).collect(),
        })
    }

    async fn get_container_sample_batch(
        &self,
        host: &str,
        namespace: &str,
        pod: &str,
        uid: &str,
        container: &str,
    ) -> Result<SampleBatch> {
        let url = format!(
            "{}://{}:{}/stats/{}/{}/{}/{}",
            self.kubelet.scheme, host, self.kubelet.port, namespace, pod, uid, container
        );
        debug!(url = %url, "Node agent request");
        self.fetch(self.http.get(&url), &url).await
    }

    async fn list_events(&self) -> Result<Vec<ClusterEvent>> {
        let list: ObjectList<Value> = self.get_api(&["api", "v1", "events"]).await?;

        let mut events = Vec::with_capacity(list.items.len());
        for item in list.items {
            match cluster_event(item) {
                Some(event) => events.push(event),
                None => warn!("Skipping event without namespace or name"),
            }
        }
        Ok(events)
    }

    async fn delete_event(&self, self_link: &str) -> Result<()> {
        let url = self
            .endpoint
            .join(self_link)
            .map_err(|e| AnalysisError::InvalidInput(format!("invalid event link {}: {}", self_link, e)))?;

        let response = self.authorized(self.http.delete(url)).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Cluster(format!(
                "deleting event {} returned {}: {}",
                self_link, status, body
            )));
        }
        Ok(())
    }
}

/// Namespace and self link of a raw event; the link is rebuilt from the
/// name when the server omits it.
fn cluster_event(item: Value) -> Option<ClusterEvent> {
    let Value::Object(document) = item else {
        return None;
    };

    let metadata = document.get("metadata")?;
    let namespace = metadata.get("namespace")?.as_str()?.to_string();
    let self_link = match metadata.get("selfLink").and_then(Value::as_str) {
        Some(link) if !link.is_empty() => link.to_string(),
        _ => {
            let name = metadata.get("name")?.as_str()?;
            format!("/api/v1/namespaces/{}/events/{}", namespace, name)
        }
    };

    Some(ClusterEvent {
        namespace,
        self_link,
        document,
    })
}
