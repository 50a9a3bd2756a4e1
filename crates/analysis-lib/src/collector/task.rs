//! Scheduled container metrics collection

use super::{MetricsPipeline, PeriodicTask};
use crate::cluster::ClusterConnector;
use crate::error::Result;
use crate::health::components;
use crate::observability::{AnalysisMetrics, StructuredLogger};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::Instant;

/// Lock name of the metrics collection task
pub const METRICS_COLLECTION_TASK: &str = "historical_record_container_metrics";

/// Runs one collection cycle against a freshly selected API server
pub struct MetricsCollectionTask {
    connector: Arc<dyn ClusterConnector>,
    pipeline: MetricsPipeline,
    metrics: AnalysisMetrics,
    logger: StructuredLogger,
}

impl MetricsCollectionTask {
    pub fn new(connector: Arc<dyn ClusterConnector>, pipeline: MetricsPipeline, logger: StructuredLogger) -> Self {
        Self {
            connector,
            pipeline,
            metrics: AnalysisMetrics::new(),
            logger,
        }
    }
}

#[async_trait]
impl PeriodicTask for MetricsCollectionTask {
    fn name(&self) -> &str {
        METRICS_COLLECTION_TASK
    }

    fn component(&self) -> &str {
        components::METRICS_PIPELINE
    }

    async fn run_once(&self) -> Result<()> {
        let start = Instant::now();

        let walked = match self.connector.connect().await {
            Ok(cluster) => self.pipeline.collect(cluster.as_ref()).await,
            Err(e) => Err(e),
        };
        let outcome = match walked {
            Ok(outcome) => outcome,
            Err(e) => {
                self.metrics.add_collection_errors(1);
                return Err(e);
            }
        };

        let elapsed = start.elapsed();
        self.metrics.observe_collection_latency(elapsed.as_secs_f64());
        self.metrics
            .add_samples_persisted(outcome.summary.samples_persisted as u64);
        self.metrics
            .add_collection_errors(outcome.failures.len() as u64);
        self.logger
            .log_collection_cycle(&outcome.summary, outcome.failures.len(), elapsed.as_millis());

        outcome.into_result().map(|_| ())
    }
}
