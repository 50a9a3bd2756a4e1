//! Core data models for the analysis service

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Persisted state backing the singleton election for one task name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    #[serde(rename = "id")]
    pub holder_id: String,
    #[serde(rename = "firstTimeStamp", with = "rfc3339_nanos")]
    pub first_acquired_at: DateTime<Utc>,
    #[serde(rename = "lastTimeStamp", with = "rfc3339_nanos")]
    pub last_renewed_at: DateTime<Utc>,
}

impl LockRecord {
    /// A fresh candidacy: both timestamps set to `now`
    pub fn candidate(holder_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            holder_id: holder_id.into(),
            first_acquired_at: now,
            last_renewed_at: now,
        }
    }

    /// Same holder, same candidacy start, renewed at `now`
    pub fn renewed(&self, now: DateTime<Utc>) -> Self {
        Self {
            holder_id: self.holder_id.clone(),
            first_acquired_at: self.first_acquired_at,
            last_renewed_at: now,
        }
    }
}

/// Pod fields needed to reach its containers' node agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodDescriptor {
    pub name: String,
    pub host_address: String,
    pub uid: String,
    pub containers: Vec<String>,
}

/// Node-agent response bundling many timestamped readings of one container.
///
/// Everything except `stats` is static container metadata shared by every
/// reading.
#[derive(Debug, Clone, Deserialize)]
pub struct SampleBatch {
    pub stats: Vec<StatBlock>,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

/// One timestamped resource-usage reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatBlock {
    pub timestamp: String,
    #[serde(flatten)]
    pub readings: Map<String, Value>,
}

impl StatBlock {
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// Routing and provenance attached to every persisted container sample
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMetaData {
    pub namespace: String,
    #[serde(rename = "replicationControllerName")]
    pub workload_group_name: String,
    pub pod_name: String,
    pub container_name: String,
    pub index: String,
    pub document_type: String,
    pub id: String,
}

/// A single per-second container reading ready to be persisted
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSample {
    pub metadata: Map<String, Value>,
    pub stats: StatBlock,
    pub search_meta_data: SearchMetaData,
}

impl ContainerSample {
    pub fn index(&self) -> &str {
        &self.search_meta_data.index
    }

    pub fn document_type(&self) -> &str {
        &self.search_meta_data.document_type
    }

    pub fn id(&self) -> &str {
        &self.search_meta_data.id
    }

    /// The stored document: static metadata, `stats`, and `searchMetaData`
    pub fn to_document(&self) -> serde_json::Result<Value> {
        let mut document = self.metadata.clone();
        document.insert("stats".to_string(), serde_json::to_value(&self.stats)?);
        document.insert(
            "searchMetaData".to_string(),
            serde_json::to_value(&self.search_meta_data)?,
        );
        Ok(Value::Object(document))
    }
}

/// A cluster event as listed by the API server
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterEvent {
    pub namespace: String,
    pub self_link: String,
    pub document: Map<String, Value>,
}

/// Output of an image build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BuildLog {
    pub image_information: String,
    pub version: String,
    #[serde(default)]
    pub version_info: BTreeMap<String, String>,
    #[serde(with = "rfc3339_nanos")]
    pub created_time: DateTime<Utc>,
    pub content: String,
}

/// A request recorded by the audit filter of a platform component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AuditLog {
    pub component: String,
    pub kind: String,
    pub path: String,
    pub user_name: String,
    #[serde(default)]
    pub remote_address: String,
    #[serde(default)]
    pub remote_host: String,
    #[serde(with = "rfc3339_nanos")]
    pub created_time: DateTime<Utc>,
    #[serde(default)]
    pub query_parameter_map: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub path_parameter_map: BTreeMap<String, String>,
    #[serde(default)]
    pub request_method: String,
    #[serde(default, rename = "RequestURI")]
    pub request_uri: String,
    #[serde(default)]
    pub request_body: String,
    #[serde(default)]
    pub request_header: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub description: String,
}

/// RFC 3339 with nanosecond precision, always in UTC
pub fn format_rfc3339_nanos(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub(crate) mod rfc3339_nanos {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_rfc3339_nanos(time))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let text = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&text)
            .map(|t| t.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
