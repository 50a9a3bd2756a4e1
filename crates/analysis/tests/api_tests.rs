//! Integration tests for the service API endpoints

use analysis_lib::{
    event::EVENT_INDEX,
    health::{components, HealthRegistry},
    logs::AUDIT_LOG_INDEX,
    observability::AnalysisMetrics,
    store::{DocumentStore, MemoryStore},
};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use cluster_analysis::api::{create_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn setup_test_app() -> (Router, Arc<AppState>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let state = Arc::new(AppState::new(store.clone(), health_registry));
    let router = create_router(state.clone());

    (router, state, store)
}

async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    send(app, "GET", uri, None).await
}

fn aggregation_response() -> Value {
    json!({
        "aggregations": { "aggregation_time_interval": { "buckets": [
            {
                "key_as_string": "2024-03-01T12:00:00.000Z",
                "aggregation_pod": { "buckets": [{
                    "key": "web-1",
                    "aggregation_container": { "buckets": [{
                        "key": "app",
                        "doc_count": 60,
                        "minimum_cpu_usage_total": { "value": 100.0 },
                        "average_memory_usage": { "value": 4096.0 }
                    }] }
                }] }
            },
            { "key_as_string": "2024-03-01T12:01:00.000Z", "aggregation_pod": { "buckets": [] } },
            {
                "key_as_string": "2024-03-01T12:02:00.000Z",
                "aggregation_pod": { "buckets": [{
                    "key": "web-1",
                    "aggregation_container": { "buckets": [{
                        "key": "app",
                        "doc_count": 58,
                        "minimum_cpu_usage_total": { "value": 300.0 },
                        "average_memory_usage": { "value": 4096.0 }
                    }] }
                }] }
            }
        ] } }
    })
}

const WINDOW: &str = "from=2024-03-01T12:00:00Z&to=2024-03-01T12:03:00Z&aggregationAmount=3";

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state, _store) = setup_test_app().await;

    let (status, health) = get(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert!(health["components"][components::METRICS_PIPELINE].is_object());
    assert!(health["components"][components::ELECTION].is_object());
}

#[tokio::test]
async fn test_healthz_returns_ok_when_degraded() {
    let (app, state, _store) = setup_test_app().await;
    state
        .health_registry
        .set_degraded(components::METRICS_PIPELINE, "2 containers failed")
        .await;

    let (status, health) = get(app, "/healthz").await;

    // Degraded still returns 200 (operational)
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, state, _store) = setup_test_app().await;
    state
        .health_registry
        .set_unhealthy(components::ELECTION, "lock store unreachable")
        .await;

    let (status, health) = get(app, "/healthz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_returns_503_when_not_ready() {
    let (app, _state, _store) = setup_test_app().await;

    let (status, readiness) = get(app, "/readyz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);
}

#[tokio::test]
async fn test_readyz_probes_document_store() {
    let (app, state, _store) = setup_test_app().await;
    state.health_registry.set_ready(true).await;
    state
        .health_registry
        .set_unhealthy(components::DOCUMENT_STORE, "stale failure")
        .await;

    let (status, readiness) = get(app, "/readyz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_readyz_returns_503_when_ready_but_unhealthy() {
    let (app, state, _store) = setup_test_app().await;
    state.health_registry.set_ready(true).await;
    state
        .health_registry
        .set_unhealthy(components::EVENT_RECORDER, "Failed")
        .await;

    let (status, _) = get(app, "/readyz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, _state, _store) = setup_test_app().await;
    let metrics = AnalysisMetrics::new();
    metrics.observe_collection_latency(0.5);
    metrics.add_samples_persisted(3);
    metrics.set_singleton_active("historical_record_event", true);

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    assert!(text.contains("cluster_analysis_collection_latency_seconds_bucket"));
    assert!(text.contains("cluster_analysis_samples_persisted_total"));
    assert!(text.contains("cluster_analysis_aggregation_latency_seconds"));
    assert!(text.contains("cluster_analysis_singleton_active{task=\"historical_record_event\"} 1"));
}

#[tokio::test]
async fn test_group_metrics_returns_interpolated_series() {
    let (app, _state, store) = setup_test_app().await;
    store.set_search_response("container_metrics_default", "workload_web", aggregation_response());

    let (status, body) = get(app, &format!("/api/v1/metrics/default/web?{}", WINDOW)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["timestamp"].as_array().unwrap().len(), 3);
    assert_eq!(body["web-1"]["app"]["minimumCpuUsageTotalSlice"], json!([100, 200, 300]));
    assert_eq!(body["web-1"]["app"]["documentCountSlice"], json!([60, 59, 58]));
    assert_eq!(body["web-1"]["app"]["minimumNetworkRxBytesSlice"], json!([null, null, null]));

    let searches = store.recorded_searches();
    assert_eq!(
        searches[0].query["aggregations"]["aggregation_time_interval"]["date_histogram"]["interval"],
        "60s"
    );
}

#[tokio::test]
async fn test_namespace_metrics_keyed_by_group() {
    let (app, _state, store) = setup_test_app().await;
    store.set_search_response("container_metrics_default", "workload_web", aggregation_response());
    store.fail_search("container_metrics_default", "workload_db");

    let (status, body) = get(app, &format!("/api/v1/metrics/default?{}", WINDOW)).await;

    assert_eq!(status, StatusCode::OK);
    let groups = body.as_object().unwrap();
    assert_eq!(groups.len(), 1);
    assert!(groups["web"]["web-1"].is_object());
}

#[tokio::test]
async fn test_metrics_rejects_bad_requests() {
    let (app, _state, store) = setup_test_app().await;

    let (status, body) = get(
        app.clone(),
        "/api/v1/metrics/default/web?from=2024-03-01T12:00:00Z&to=2024-03-01T12:03:00Z&aggregationAmount=0",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");
    assert!(body["errorMessage"].as_str().unwrap().contains("aggregation amount"));

    let (status, _) = get(
        app.clone(),
        "/api/v1/metrics/default/web?from=2024-03-01T12:03:00Z&to=2024-03-01T12:00:00Z&aggregationAmount=3",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = get(app.clone(), "/api/v1/metrics/default/web?from=yesterday").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errorMessage"].as_str().unwrap().contains("from"));

    let (status, _) = get(app, "/api/v1/metrics/default/web?from=2024-03-01T12:00:00Z").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(store.recorded_searches().is_empty());
}

#[tokio::test]
async fn test_workload_groups() {
    let (app, _state, store) = setup_test_app().await;
    store.set_search_response("container_metrics_default", "workload_web", json!({}));
    store.set_search_response("container_metrics_default", "workload_db", json!({}));

    let (status, body) = get(app.clone(), "/api/v1/workloadgroups/default").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["db", "web"]));

    let (status, body) = get(app, "/api/v1/workloadgroups/ghost").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_store_failure_maps_to_500() {
    let (app, _state, store) = setup_test_app().await;
    store.fail_search(EVENT_INDEX, "*");

    let (status, body) = get(app, "/api/v1/historicalevents").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "internal_error");
}

#[tokio::test]
async fn test_search_and_acknowledge_events() {
    let (app, _state, store) = setup_test_app().await;
    let id = "_api_v1_namespaces_default_events_web-1.paused";
    store
        .put(
            EVENT_INDEX,
            "default",
            id,
            &json!({ "reason": "Paused", "searchMetaData": { "acknowledge": false } }),
        )
        .await
        .unwrap();
    store.set_search_response(
        EVENT_INDEX,
        "default",
        json!({ "hits": { "total": 1, "hits": [{ "_id": id, "_type": "default", "_source": { "reason": "Paused" } }] } }),
    );

    let (status, hits) = get(
        app.clone(),
        "/api/v1/historicalevents/default?from=2024-03-01T00:00:00Z&size=5&offset=0",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(hits[0]["_id"], id);

    let query = &store.recorded_searches()[0].query;
    assert_eq!(query["query"]["bool"]["filter"][1]["term"]["searchMetaData.acknowledge"], false);
    assert_eq!(query["size"], 5);

    let (status, _) = send(
        app.clone(),
        "PUT",
        &format!("/api/v1/historicalevents/default/{}?acknowledge=true", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        store.document(EVENT_INDEX, "default", id).unwrap()["searchMetaData"]["acknowledge"],
        true
    );

    let (status, _) = send(app.clone(), "PUT", "/api/v1/historicalevents/default/missing?acknowledge=true", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, namespaces) = get(app, "/api/v1/historicaleventnamespaces").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(namespaces, json!(["default"]));
}

#[tokio::test]
async fn test_events_reject_inverted_range() {
    let (app, _state, _store) = setup_test_app().await;

    let (status, body) = get(
        app,
        "/api/v1/historicalevents?from=2024-03-02T00:00:00Z&to=2024-03-01T00:00:00Z",
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errorMessage"].as_str().unwrap().contains("can't be after"));
}

#[tokio::test]
async fn test_build_log_lifecycle() {
    let (app, _state, store) = setup_test_app().await;
    let log = json!({
        "ImageInformation": "billing",
        "Version": "1.2.0",
        "VersionInfo": { "git.commit": "3f9a2c1" },
        "CreatedTime": "2024-03-01T12:00:00Z",
        "Content": "Successfully built 3f9a2c1"
    });

    let (status, _) = send(app.clone(), "POST", "/api/v1/buildlogs?refresh=true", Some(log)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(store.refreshed_indices(), vec!["build_log_billing"]);

    let (status, body) = get(app.clone(), "/api/v1/buildlogs/billing/1.2.0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["VersionInfo"]["git_commit"], "3f9a2c1");

    let (status, body) = get(app.clone(), "/api/v1/buildlogs/billing?size=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let (status, _) = send(app.clone(), "DELETE", "/api/v1/buildlogs/billing/1.2.0", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = get(app.clone(), "/api/v1/buildlogs/billing/1.2.0").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(app, "DELETE", "/api/v1/buildlogs/billing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_audit_logs() {
    let (app, _state, store) = setup_test_app().await;
    let log = json!({
        "Component": "cloudone",
        "Kind": "DELETE",
        "Path": "/api/v1/replicationcontrollers/default/web",
        "UserName": "alice",
        "CreatedTime": "2024-03-01T12:00:00Z"
    });

    let (status, body) = send(app.clone(), "POST", "/api/v1/auditlogs", Some(log)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "1709294400_1709294400000000000");
    assert_eq!(store.ids(AUDIT_LOG_INDEX, "alice").len(), 1);

    let (status, _) = get(app.clone(), "/api/v1/auditlogs/alice").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get(app, "/api/v1/auditlogs?size=50").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let searches = store.recorded_searches();
    assert_eq!(searches[0].doc_type, "alice");
    assert_eq!(searches[1].doc_type, "*");
    assert_eq!(searches[1].query["size"], 50);
}
