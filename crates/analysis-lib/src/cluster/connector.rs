//! API server endpoint selection

use super::{ClusterClient, ClusterConnector, KubeApiClient, KubeletConfig};
use crate::error::{AnalysisError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Clone)]
pub struct SelectorConfig {
    /// Candidate API server endpoints, in preference order
    pub endpoints: Vec<Url>,
    /// Value of the `Authorization` header sent to the API server
    pub token: Option<String>,
    /// Budget for each endpoint's health probe
    pub health_check_timeout: Duration,
    /// Timeout of regular API requests
    pub request_timeout: Duration,
    pub kubelet: KubeletConfig,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            token: None,
            health_check_timeout: Duration::from_secs(1),
            request_timeout: Duration::from_secs(30),
            kubelet: KubeletConfig::default(),
        }
    }
}

/// Hands out a client for the first endpoint that passes its health probe
pub struct EndpointSelector {
    config: SelectorConfig,
    probe: Client,
}

impl EndpointSelector {
    pub fn new(config: SelectorConfig) -> Result<Self> {
        if config.endpoints.is_empty() {
            return Err(AnalysisError::InvalidInput(
                "at least one cluster API endpoint is required".to_string(),
            ));
        }

        let probe = Client::builder()
            .timeout(config.health_check_timeout)
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self { config, probe })
    }

    /// Probe endpoints in order and connect to the first healthy one
    pub async fn select(&self) -> Result<KubeApiClient> {
        for endpoint in &self.config.endpoints {
            if self.is_healthy(endpoint).await {
                debug!(endpoint = %endpoint, "Selected cluster API endpoint");
                let client = KubeApiClient::new(
                    endpoint.clone(),
                    self.config.token.clone(),
                    self.config.request_timeout,
                )?;
                return Ok(client.with_kubelet(self.config.kubelet.clone()));
            }
        }

        Err(AnalysisError::Cluster(format!(
            "none of {} cluster API endpoints is healthy",
            self.config.endpoints.len()
        )))
    }

    async fn is_healthy(&self, endpoint: &Url) -> bool {
        let url = match endpoint.join("healthz") {
            Ok(url) => url,
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, "Invalid cluster API endpoint");
                return false;
            }
        };

        let mut request = self.probe.get(url);
        if let Some(token) = &self.config.token {
            request = request.header(reqwest::header::AUTHORIZATION, token);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(endpoint = %endpoint, status = %response.status(), "Cluster API endpoint unhealthy");
                false
            }
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, "Cluster API endpoint unreachable");
                false
            }
        }
    }
}

#[async_trait]
impl ClusterConnector for EndpointSelector {
    async fn connect(&self) -> Result<Box<dyn ClusterClient>> {
        let client = self.select().await?;
        Ok(Box::new(client))
    }
}
