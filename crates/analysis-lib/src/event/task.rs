use super::EventRecorder;
use crate::cluster::ClusterConnector;
use crate::collector::PeriodicTask;
use crate::error::Result;
use crate::health::components;
use crate::observability::{AnalysisMetrics, StructuredLogger};
use async_trait::async_trait;
use std::sync::Arc;

/// Lock name of the event recording task
pub const EVENT_RECORDING_TASK: &str = "historical_record_event";

pub struct EventRecordingTask {
    connector: Arc<dyn ClusterConnector>,
    recorder: EventRecorder,
    metrics: AnalysisMetrics,
    logger: StructuredLogger,
}

impl EventRecordingTask {
    pub fn new(connector: Arc<dyn ClusterConnector>, recorder: EventRecorder, logger: StructuredLogger) -> Self {
        Self {
            connector,
            recorder,
            metrics: AnalysisMetrics::new(),
            logger,
        }
    }
}

#[async_trait]
impl PeriodicTask for EventRecordingTask {
    fn name(&self) -> &str {
        EVENT_RECORDING_TASK
    }

    fn component(&self) -> &str {
        components::EVENT_RECORDER
    }

    async fn run_once(&self) -> Result<()> {
        let cluster = self.connector.connect().await?;
        let summary = self.recorder.record(cluster.as_ref()).await?;

        self.metrics.add_events_recorded(summary.recorded as u64);
        self.logger
            .log_event_recording(summary.recorded, summary.failures.len());

        summary.into_result().map(|_| ())
    }
}
