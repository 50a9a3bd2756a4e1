//! HTTP API: health checks, Prometheus metrics and the query endpoints

use analysis_lib::{
    aggregation::{AggregatedMetrics, AggregationEngine},
    error::AnalysisError,
    event::EventRecorder,
    health::{ComponentStatus, HealthRegistry},
    logs::{AuditLogStore, BuildLogStore},
    models::{AuditLog, BuildLog},
    store::{query::Page, DocumentStore},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub health_registry: HealthRegistry,
    pub aggregation: AggregationEngine,
    pub events: EventRecorder,
    pub build_logs: BuildLogStore,
    pub audit_logs: AuditLogStore,
}

impl AppState {
    pub fn new(store: Arc<dyn DocumentStore>, health_registry: HealthRegistry) -> Self {
        Self {
            aggregation: AggregationEngine::new(store.clone()),
            events: EventRecorder::new(store.clone()),
            build_logs: BuildLogStore::new(store.clone()),
            audit_logs: AuditLogStore::new(store.clone()),
            store,
            health_registry,
        }
    }
}

/// Error body: `{ "error": <kind>, "errorMessage": <detail> }`
pub struct ApiError(AnalysisError);

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self.0 {
            AnalysisError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
            AnalysisError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }

        (
            status,
            Json(json!({ "error": kind, "errorMessage": self.0.to_string() })),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn parse_time(name: &str, value: Option<&str>) -> ApiResult<Option<DateTime<Utc>>> {
    match value.filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(text) => DateTime::parse_from_rfc3339(text)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| {
                AnalysisError::InvalidInput(format!("{} must be an RFC 3339 time, got {}: {}", name, text, e))
                    .into()
            }),
    }
}

fn require<T>(name: &str, value: Option<T>) -> ApiResult<T> {
    value.ok_or_else(|| AnalysisError::InvalidInput(format!("missing query parameter {}", name)).into())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationParams {
    from: Option<String>,
    to: Option<String>,
    aggregation_amount: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    from: Option<String>,
    to: Option<String>,
    acknowledge: Option<bool>,
    size: Option<usize>,
    offset: Option<usize>,
}

impl SearchParams {
    fn range(&self) -> ApiResult<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
        Ok((
            parse_time("from", self.from.as_deref())?,
            parse_time("to", self.to.as_deref())?,
        ))
    }

    fn page(&self) -> Page {
        let default = Page::default();
        Page {
            size: self.size.unwrap_or(default.size),
            offset: self.offset.unwrap_or(default.offset),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AcknowledgeParams {
    acknowledge: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshParams {
    refresh: Option<bool>,
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state
        .health_registry
        .check_document_store(state.store.as_ref())
        .await;
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn aggregated_metrics(
    state: &AppState,
    namespace: &str,
    group: Option<&str>,
    params: &AggregationParams,
) -> ApiResult<Json<AggregatedMetrics>> {
    let from = require("from", parse_time("from", params.from.as_deref())?)?;
    let to = require("to", parse_time("to", params.to.as_deref())?)?;
    let amount = require("aggregationAmount", params.aggregation_amount)?;

    let metrics = state
        .aggregation
        .get_aggregated_metrics(namespace, group, amount, from, to)
        .await?;
    Ok(Json(metrics))
}

async fn namespace_metrics(
    State(state): State<Arc<AppState>>,
    Path(namespace): Path<String>,
    Query(params): Query<AggregationParams>,
) -> ApiResult<Json<AggregatedMetrics>> {
    aggregated_metrics(&state, &namespace, None, &params).await
}

async fn group_metrics(
    State(state): State<Arc<AppState>>,
    Path((namespace, group)): Path<(String, String)>,
    Query(params): Query<AggregationParams>,
) -> ApiResult<Json<AggregatedMetrics>> {
    aggregated_metrics(&state, &namespace, Some(&group), &params).await
}

async fn workload_groups(
    State(state): State<Arc<AppState>>,
    Path(namespace): Path<String>,
) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(state.aggregation.list_workload_groups(&namespace).await?))
}

async fn search_events(
    state: &AppState,
    namespace: Option<&str>,
    params: &SearchParams,
) -> ApiResult<Json<Vec<Value>>> {
    let (from, to) = params.range()?;
    let hits = state
        .events
        .search(namespace, from, to, params.acknowledge.unwrap_or(false), params.page())
        .await?;
    Ok(Json(hits))
}

async fn all_events(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<Vec<Value>>> {
    search_events(&state, None, &params).await
}

async fn namespace_events(
    State(state): State<Arc<AppState>>,
    Path(namespace): Path<String>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<Vec<Value>>> {
    search_events(&state, Some(&namespace), &params).await
}

async fn acknowledge_event(
    State(state): State<Arc<AppState>>,
    Path((namespace, id)): Path<(String, String)>,
    Query(params): Query<AcknowledgeParams>,
) -> ApiResult<StatusCode> {
    let acknowledge = require("acknowledge", params.acknowledge)?;
    state.events.acknowledge(&namespace, &id, acknowledge).await?;
    Ok(StatusCode::OK)
}

async fn event_namespaces(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(state.events.list_namespaces().await?))
}

async fn save_build_log(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RefreshParams>,
    Json(log): Json<BuildLog>,
) -> ApiResult<StatusCode> {
    state
        .build_logs
        .save(log, params.refresh.unwrap_or(false))
        .await?;
    Ok(StatusCode::OK)
}

async fn search_build_logs(
    State(state): State<Arc<AppState>>,
    Path(image): Path<String>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<Vec<BuildLog>>> {
    let (from, to) = params.range()?;
    let logs = state
        .build_logs
        .search(&image, from, to, params.page())
        .await?;
    Ok(Json(logs))
}

async fn delete_image_build_logs(
    State(state): State<Arc<AppState>>,
    Path(image): Path<String>,
) -> ApiResult<StatusCode> {
    state.build_logs.delete_image(&image).await?;
    Ok(StatusCode::OK)
}

async fn get_build_log(
    State(state): State<Arc<AppState>>,
    Path((image, version)): Path<(String, String)>,
) -> ApiResult<Json<BuildLog>> {
    Ok(Json(state.build_logs.get(&image, &version).await?))
}

async fn delete_build_log(
    State(state): State<Arc<AppState>>,
    Path((image, version)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    state.build_logs.delete(&image, &version).await?;
    Ok(StatusCode::OK)
}

async fn save_audit_log(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RefreshParams>,
    Json(log): Json<AuditLog>,
) -> ApiResult<Json<Value>> {
    let id = state
        .audit_logs
        .save(&log, params.refresh.unwrap_or(false))
        .await?;
    Ok(Json(json!({ "id": id })))
}

async fn search_audit_logs(
    state: &AppState,
    user: Option<&str>,
    params: &SearchParams,
) -> ApiResult<Json<Vec<AuditLog>>> {
    let (from, to) = params.range()?;
    let logs = state
        .audit_logs
        .search(user, from, to, params.page())
        .await?;
    Ok(Json(logs))
}

async fn all_audit_logs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<Vec<AuditLog>>> {
    search_audit_logs(&state, None, &params).await
}

async fn user_audit_logs(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<Vec<AuditLog>>> {
    search_audit_logs(&state, Some(&user), &params).await
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/metrics/:namespace", get(namespace_metrics))
        .route("/api/v1/metrics/:namespace/:group", get(group_metrics))
        .route("/api/v1/workloadgroups/:namespace", get(workload_groups))
        .route("/api/v1/historicalevents", get(all_events))
        .route("/api/v1/historicalevents/:namespace", get(namespace_events))
        .route("/api/v1/historicalevents/:namespace/:id", put(acknowledge_event))
        .route("/api/v1/historicaleventnamespaces", get(event_namespaces))
        .route("/api/v1/buildlogs", post(save_build_log))
        .route(
            "/api/v1/buildlogs/:image",
            get(search_build_logs).delete(delete_image_build_logs),
        )
        .route(
            "/api/v1/buildlogs/:image/:version",
            get(get_build_log).delete(delete_build_log),
        )
        .route(
            "/api/v1/auditlogs",
            get(all_audit_logs).post(save_audit_log),
        )
        .route("/api/v1/auditlogs/:user", get(user_audit_logs))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
