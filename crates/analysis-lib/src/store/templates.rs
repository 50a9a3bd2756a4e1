//! Index templates installed at startup
//!
//! Every template shares the same default mapping: string fields are stored
//! unanalyzed, and the known timestamp fields of each index are typed as
//! dates so range queries and histograms work on them.

use super::DocumentStore;
use crate::collector::CONTAINER_METRICS_INDEX_PREFIX;
use crate::election::LOCK_INDEX;
use crate::event::EVENT_INDEX;
use crate::logs::{AUDIT_LOG_INDEX, BUILD_LOG_INDEX_PREFIX};
use serde_json::{json, Value};
use tracing::{info, warn};

/// A named index template
#[derive(Debug, Clone, PartialEq)]
pub struct IndexTemplate {
    pub name: String,
    pub body: Value,
}

fn keyword() -> Value {
    json!({ "type": "string", "index": "not_analyzed" })
}

fn date() -> Value {
    json!({ "type": "date", "format": "dateOptionalTime" })
}

fn template(pattern: &str, properties: Value) -> IndexTemplate {
    let name = format!("template_{}", pattern.trim_end_matches('*'));
    let body = json!({
        "template": pattern,
        "mappings": {
            "_default_": {
                "_all": { "enabled": true },
                "dynamic_templates": [
                    {
                        "string_fields": {
                            "match": "*",
                            "match_mapping_type": "string",
                            "mapping": {
                                "type": "string",
                                "index": "not_analyzed",
                                "omit_norms": true
                            }
                        }
                    }
                ],
                "properties": properties
            }
        }
    });

    IndexTemplate { name, body }
}

/// Templates for every index the service writes
pub fn index_templates() -> Vec<IndexTemplate> {
    vec![
        template(
            LOCK_INDEX,
            json!({
                "id": keyword(),
                "firstTimeStamp": date(),
                "lastTimeStamp": date(),
            }),
        ),
        template(
            &format!("{}*", CONTAINER_METRICS_INDEX_PREFIX),
            json!({
                "name": keyword(),
                "namespace": keyword(),
                "searchMetaData": {
                    "properties": {
                        "namespace": keyword(),
                        "replicationControllerName": keyword(),
                        "podName": keyword(),
                        "containerName": keyword(),
                        "index": keyword(),
                        "documentType": keyword(),
                        "id": keyword(),
                    }
                },
                "spec": {
                    "properties": {
                        "creation_time": date(),
                        "image": keyword(),
                    }
                },
                "stats": {
                    "properties": {
                        "timestamp": date(),
                        "cpu": { "properties": { "usage": { "properties": {
                            "total": { "type": "long" },
                            "user": { "type": "long" },
                            "system": { "type": "long" },
                        } } } },
                        "memory": { "properties": {
                            "usage": { "type": "long" },
                            "working_set": { "type": "long" },
                        } },
                        "network": { "properties": {
                            "rx_bytes": { "type": "long" },
                            "rx_packets": { "type": "long" },
                            "tx_bytes": { "type": "long" },
                            "tx_packets": { "type": "long" },
                        } },
                    }
                },
            }),
        ),
        template(
            EVENT_INDEX,
            json!({
                "metadata": {
                    "properties": {
                        "name": keyword(),
                        "namespace": keyword(),
                        "selfLink": keyword(),
                        "uid": keyword(),
                        "creationTimestamp": date(),
                        "deletionTimestamp": date(),
                    }
                },
                "reason": { "type": "string" },
                "message": { "type": "string" },
                "firstTimestamp": date(),
                "lastTimestamp": date(),
                "count": { "type": "long" },
                "searchMetaData": { "properties": { "acknowledge": { "type": "boolean" } } },
            }),
        ),
        template(
            &format!("{}*", BUILD_LOG_INDEX_PREFIX),
            json!({
                "ImageInformation": { "type": "string" },
                "Version": { "type": "string" },
                "VersionInfo": { "properties": {} },
                "CreatedTime": date(),
                "Content": { "type": "string" },
            }),
        ),
        template(
            AUDIT_LOG_INDEX,
            json!({
                "Component": keyword(),
                "Kind": keyword(),
                "Path": keyword(),
                "UserName": keyword(),
                "CreatedTime": date(),
                "RequestMethod": keyword(),
                "RequestURI": keyword(),
                "RequestBody": { "type": "string" },
                "Description": { "type": "string" },
            }),
        ),
    ]
}

/// Install every template. Failures are logged; returns how many succeeded.
pub async fn install_index_templates(store: &dyn DocumentStore) -> usize {
    let mut installed = 0;

    for template in index_templates() {
        match store.put_index_template(&template.name, &template.body).await {
            Ok(()) => {
                info!(template = %template.name, "Installed index template");
                installed += 1;
            }
            Err(e) => {
                warn!(template = %template.name, error = %e, "Failed to install index template");
            }
        }
    }

    installed
}
