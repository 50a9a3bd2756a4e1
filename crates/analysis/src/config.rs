//! Service configuration
//!
//! Read from an optional config file, overridden by `ANALYSIS_*` environment
//! variables. List values in the environment are comma separated.

use analysis_lib::cluster::SelectorConfig;
use analysis_lib::collector::PipelineConfig;
use analysis_lib::election::ElectionConfig;
use analysis_lib::store::GatewayConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Environment variable naming the config file
pub const CONFIG_FILE_VAR: &str = "ANALYSIS_CONFIG_FILE";
pub const DEFAULT_CONFIG_FILE: &str = "/etc/cluster-analysis/config";

const ENV_PREFIX: &str = "ANALYSIS";

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// Port of the query, health and metrics API
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default = "default_elasticsearch_hosts")]
    pub elasticsearch_hosts: Vec<String>,

    #[serde(default = "default_elasticsearch_port")]
    pub elasticsearch_port: u16,

    /// API server endpoints, in preference order
    #[serde(default = "default_kube_api_endpoints")]
    pub kube_api_endpoints: Vec<String>,

    /// Sent verbatim as the `Authorization` header
    #[serde(default)]
    pub kube_api_token: Option<String>,

    #[serde(default = "default_kube_api_health_check_timeout_ms")]
    pub kube_api_health_check_timeout_ms: u64,

    /// Age after which another replica may take over a lock
    #[serde(default = "default_singleton_lock_timeout_ms")]
    pub singleton_lock_timeout_ms: u64,

    /// How long a new holder waits before it starts working
    #[serde(default = "default_singleton_lock_waiting_ms")]
    pub singleton_lock_waiting_after_being_candidate_ms: u64,

    #[serde(default = "default_metrics_collection_interval")]
    pub metrics_collection_interval_secs: u64,

    #[serde(default = "default_event_recording_interval")]
    pub event_recording_interval_secs: u64,

    #[serde(default = "default_max_concurrent_pods")]
    pub max_concurrent_pods: usize,

    /// Lock holder id; the local IPv4 address when unset
    #[serde(default)]
    pub holder_id: Option<String>,
}

fn default_api_port() -> u16 {
    8080
}

fn default_elasticsearch_hosts() -> Vec<String> {
    vec!["127.0.0.1".to_string()]
}

fn default_elasticsearch_port() -> u16 {
    9200
}

fn default_kube_api_endpoints() -> Vec<String> {
    vec!["https://kubernetes.default.svc:443".to_string()]
}

fn default_kube_api_health_check_timeout_ms() -> u64 {
    1000
}

fn default_singleton_lock_timeout_ms() -> u64 {
    90_000
}

fn default_singleton_lock_waiting_ms() -> u64 {
    60_000
}

fn default_metrics_collection_interval() -> u64 {
    60
}

fn default_event_recording_interval() -> u64 {
    60
}

fn default_max_concurrent_pods() -> usize {
    8
}

impl AnalysisConfig {
    /// Load from the config file named by `ANALYSIS_CONFIG_FILE` and the
    /// process environment
    pub fn load() -> Result<Self> {
        let file = std::env::var(CONFIG_FILE_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(&file, None)
    }

    /// Load from `file` (if present) and `env`, or the process environment
    /// when `env` is `None`
    pub fn load_from(file: &str, env: Option<config::Map<String, String>>) -> Result<Self> {
        let environment = config::Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("elasticsearch_hosts")
            .with_list_parse_key("kube_api_endpoints")
            .source(env);

        let settings = config::Config::builder()
            .add_source(config::File::with_name(file).required(false))
            .add_source(environment)
            .build()
            .context("failed to read configuration")?;

        settings
            .try_deserialize()
            .context("invalid configuration")
    }

    /// Settings that are accepted but likely wrong
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let lock_timeout = Duration::from_millis(self.singleton_lock_timeout_ms);
        for (name, interval) in [
            ("metrics_collection_interval_secs", self.metrics_collection_interval()),
            ("event_recording_interval_secs", self.event_recording_interval()),
        ] {
            if interval > lock_timeout {
                warnings.push(format!(
                    "{} ({}s) exceeds singleton_lock_timeout_ms ({}ms); the lock will expire between ticks",
                    name,
                    interval.as_secs(),
                    self.singleton_lock_timeout_ms
                ));
            }
        }
        if self.singleton_lock_waiting_after_being_candidate_ms >= self.singleton_lock_timeout_ms {
            warnings.push(
                "singleton_lock_waiting_after_being_candidate_ms is not below singleton_lock_timeout_ms"
                    .to_string(),
            );
        }
        warnings
    }

    pub fn metrics_collection_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_collection_interval_secs.max(1))
    }

    pub fn event_recording_interval(&self) -> Duration {
        Duration::from_secs(self.event_recording_interval_secs.max(1))
    }

    pub fn election_config(&self) -> ElectionConfig {
        ElectionConfig {
            lock_timeout: Duration::from_millis(self.singleton_lock_timeout_ms),
            candidacy_grace_period: Duration::from_millis(
                self.singleton_lock_waiting_after_being_candidate_ms,
            ),
        }
    }

    pub fn gateway_config(&self) -> Result<GatewayConfig> {
        GatewayConfig::from_hosts(&self.elasticsearch_hosts, self.elasticsearch_port)
            .context("invalid search engine hosts")
    }

    pub fn selector_config(&self) -> Result<SelectorConfig> {
        let endpoints = self
            .kube_api_endpoints
            .iter()
            .map(|endpoint| {
                Url::parse(endpoint).with_context(|| format!("invalid API server endpoint {}", endpoint))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(SelectorConfig {
            endpoints,
            token: self.kube_api_token.clone().filter(|t| !t.is_empty()),
            health_check_timeout: Duration::from_millis(self.kube_api_health_check_timeout_ms),
            ..SelectorConfig::default()
        })
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            max_concurrent_pods: self.max_concurrent_pods.max(1),
        }
    }
}
