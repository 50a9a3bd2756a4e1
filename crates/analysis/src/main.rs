//! Cluster analysis service
//!
//! Runs next to the cluster management platform. Every replica serves the
//! query API; only the elected singleton records container metrics and
//! cluster events.

use analysis_lib::{
    cluster::{ClusterConnector, EndpointSelector},
    collector::{MetricsCollectionTask, MetricsPipeline, PeriodicTask, TaskLoop},
    election::{resolve_holder_id, SingletonElection},
    event::{EventRecorder, EventRecordingTask},
    health::HealthRegistry,
    observability::StructuredLogger,
    store::{templates::install_index_templates, DocumentStore, ElasticsearchGateway},
};
use anyhow::Result;
use cluster_analysis::{api, config::AnalysisConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting cluster-analysis");

    let config = AnalysisConfig::load()?;
    for warning in config.warnings() {
        warn!(warning = %warning, "Suspicious configuration");
    }

    let holder_id = resolve_holder_id(config.holder_id.as_deref()).await?;
    let logger = StructuredLogger::new(&holder_id);
    logger.log_startup(SERVICE_VERSION, config.api_port);

    let gateway = Arc::new(ElasticsearchGateway::new(config.gateway_config()?)?);
    let store: Arc<dyn DocumentStore> = gateway.clone();
    let installed = install_index_templates(store.as_ref()).await;
    info!(installed = installed, "Index templates installed");

    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;
    health_registry.check_document_store(store.as_ref()).await;

    let election = Arc::new(SingletonElection::new(
        store.clone(),
        holder_id.clone(),
        config.election_config(),
    ));
    let connector: Arc<dyn ClusterConnector> = Arc::new(EndpointSelector::new(config.selector_config()?)?);

    let (shutdown_tx, _) = broadcast::channel(1);

    let metrics_task = MetricsCollectionTask::new(
        connector.clone(),
        MetricsPipeline::new(store.clone(), config.pipeline_config()),
        logger.clone(),
    );
    let event_task = EventRecordingTask::new(connector, EventRecorder::new(store.clone()), logger.clone());

    let loops = vec![
        spawn_loop(
            Arc::new(metrics_task),
            &election,
            &health_registry,
            &logger,
            config.metrics_collection_interval(),
            &shutdown_tx,
        ),
        spawn_loop(
            Arc::new(event_task),
            &election,
            &health_registry,
            &logger,
            config.event_recording_interval(),
            &shutdown_tx,
        ),
    ];

    let app_state = Arc::new(api::AppState::new(store.clone(), health_registry.clone()));
    health_registry.set_ready(true).await;

    let mut api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
        }
        served = &mut api_handle => {
            let reason = match served {
                Ok(Ok(())) => "API server stopped".to_string(),
                Ok(Err(e)) => format!("API server failed: {}", e),
                Err(e) => format!("API server task failed: {}", e),
            };
            logger.log_shutdown(&reason);
        }
    }

    health_registry.set_ready(false).await;
    // No receivers left is fine here
    let _ = shutdown_tx.send(());
    for handle in loops {
        if let Err(e) = handle.await {
            warn!(error = %e, "Task loop ended abnormally");
        }
    }
    api_handle.abort();
    gateway.close().await;

    info!("Shutdown complete");
    Ok(())
}

fn spawn_loop(
    task: Arc<dyn PeriodicTask>,
    election: &Arc<SingletonElection>,
    health: &HealthRegistry,
    logger: &StructuredLogger,
    interval: Duration,
    shutdown: &broadcast::Sender<()>,
) -> JoinHandle<()> {
    let task_loop = TaskLoop::new(task, election.clone(), health.clone(), logger.clone(), interval);
    tokio::spawn(task_loop.run(shutdown.subscribe()))
}
