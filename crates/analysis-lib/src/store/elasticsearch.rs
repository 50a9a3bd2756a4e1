//! HTTP gateway to the search engine
//!
//! The underlying HTTP client is created lazily on first use and shared by
//! every caller. After [`ElasticsearchGateway::close`] the next request
//! re-establishes it, so callers never handle reconnection themselves.

use super::DocumentStore;
use crate::error::{AnalysisError, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

/// Connection settings for the search engine
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URLs of the cluster nodes, tried in order
    pub urls: Vec<Url>,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Request timeout
    pub request_timeout: Duration,
}

impl GatewayConfig {
    /// Build from host names sharing one port (`http://<host>:<port>`)
    pub fn from_hosts(hosts: &[String], port: u16) -> Result<Self> {
        let urls = hosts
            .iter()
            .map(|host| {
                Url::parse(&format!("http://{}:{}", host, port)).map_err(|e| {
                    AnalysisError::InvalidInput(format!("invalid search engine host {}: {}", host, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            urls,
            ..Self::default()
        })
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Document store backed by a search engine reachable over HTTP
pub struct ElasticsearchGateway {
    config: GatewayConfig,
    connection: RwLock<Option<Client>>,
}

impl ElasticsearchGateway {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        if config.urls.is_empty() {
            return Err(AnalysisError::InvalidInput(
                "at least one search engine URL is required".to_string(),
            ));
        }

        Ok(Self {
            config,
            connection: RwLock::new(None),
        })
    }

    /// Drop the shared client; the next request reconnects
    pub async fn close(&self) {
        let mut connection = self.connection.write().await;
        if connection.take().is_some() {
            info!("Closed search engine connection");
        }
    }

    /// Whether a client is currently established
    pub async fn is_connected(&self) -> bool {
        self.connection.read().await.is_some()
    }

    async fn connection(&self) -> Result<Client> {
        if let Some(client) = self.connection.read().await.as_ref() {
            return Ok(client.clone());
        }

        let mut connection = self.connection.write().await;
        if let Some(client) = connection.as_ref() {
            return Ok(client.clone());
        }

        let client = Client::builder()
            .connect_timeout(self.config.connect_timeout)
            .timeout(self.config.request_timeout)
            .build()?;
        info!(nodes = self.config.urls.len(), "Established search engine connection");
        *connection = Some(client.clone());

        Ok(client)
    }

    /// Send a request to the first node that answers
    async fn execute(&self, method: Method, segments: &[&str], body: Option<&Value>) -> Result<Response> {
        let client = self.connection().await?;
        let mut last_error = None;

        for base in &self.config.urls {
            let url = endpoint(base, segments)?;
            let mut request = client.request(method.clone(), url.clone());
            if let Some(body) = body {
                request = request.json(body);
            }

            match request.send().await {
                Ok(response) => {
                    debug!(method = %method, url = %url, status = %response.status(), "Search engine request");
                    return Ok(response);
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Search engine node unreachable");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(AnalysisError::Http(e)),
            None => Err(AnalysisError::Store("no search engine node configured".to_string())),
        }
    }
}

/// Append path segments to a base URL, percent-encoding each one
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| AnalysisError::Store(format!("{} cannot be used as a base URL", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn search_segments<'a>(index: &'a str, doc_type: &'a str) -> Vec<&'a str> {
    if doc_type.is_empty() || doc_type == "*" {
        vec![index, "_search"]
    } else {
        vec![index, doc_type, "_search"]
    }
}

async fn status_error(operation: &str, response: Response) -> AnalysisError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    AnalysisError::Store(format!("{} returned {}: {}", operation, status, body))
}

#[async_trait]
impl DocumentStore for ElasticsearchGateway {
    async fn put(&self, index: &str, doc_type: &str, id: &str, document: &Value) -> Result<()> {
        let response = self
            .execute(Method::PUT, &[index, doc_type, id], Some(document))
            .await?;

        if !response.status().is_success() {
            return Err(status_error("index document", response).await);
        }
        Ok(())
    }

    async fn get(&self, index: &str, doc_type: &str, id: &str) -> Result<Value> {
        let response = self.execute(Method::GET, &[index, doc_type, id], None).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(AnalysisError::not_found(index, doc_type, id));
        }
        if !response.status().is_success() {
            return Err(status_error("get document", response).await);
        }

        let mut body: Value = response.json().await?;
        if body.get("found").and_then(Value::as_bool) == Some(false) {
            return Err(AnalysisError::not_found(index, doc_type, id));
        }

        body.get_mut("_source")
            .map(Value::take)
            .ok_or_else(|| AnalysisError::MalformedData(format!("document {}/{}/{} has no _source", index, doc_type, id)))
    }

    async fn delete(&self, index: &str, doc_type: &str, id: &str) -> Result<()> {
        let response = self.execute(Method::DELETE, &[index, doc_type, id], None).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(AnalysisError::not_found(index, doc_type, id));
        }
        if !response.status().is_success() {
            return Err(status_error("delete document", response).await);
        }
        Ok(())
    }

    async fn search(&self, index: &str, doc_type: &str, query: &Value) -> Result<Value> {
        let response = self
            .execute(Method::POST, &search_segments(index, doc_type), Some(query))
            .await?;

        if !response.status().is_success() {
            return Err(status_error("search", response).await);
        }
        Ok(response.json().await?)
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        let response = self.execute(Method::DELETE, &[index], None).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(AnalysisError::not_found(index, "", ""));
        }
        if !response.status().is_success() {
            return Err(status_error("delete index", response).await);
        }
        Ok(())
    }

    async fn list_types_for_index(&self, index: &str) -> Result<Vec<String>> {
        let response = self.execute(Method::GET, &[index], None).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(AnalysisError::not_found(index, "", ""));
        }
        if !response.status().is_success() {
            return Err(status_error("get index", response).await);
        }

        let body: Value = response.json().await?;
        let types = body
            .get(index)
            .and_then(|i| i.get("mappings"))
            .and_then(Value::as_object)
            .map(|mappings| {
                mappings
                    .keys()
                    .filter(|key| key.as_str() != "_default_")
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        Ok(types)
    }

    async fn refresh(&self, index: &str) -> Result<()> {
        let response = self.execute(Method::POST, &[index, "_refresh"], None).await?;

        if !response.status().is_success() {
            return Err(status_error("refresh", response).await);
        }
        Ok(())
    }

    async fn put_index_template(&self, name: &str, body: &Value) -> Result<()> {
        let response = self
            .execute(Method::PUT, &["_template", name], Some(body))
            .await?;

        if !response.status().is_success() {
            return Err(status_error("put index template", response).await);
        }
        Ok(())
    }
}
