//! Container metrics collection
//!
//! Walks namespaces, workload groups, pods and containers, splits every
//! node-agent sample batch into per-second documents, and persists them.
//! The walk runs periodically through [`TaskLoop`], gated by the singleton
//! election.

mod r#loop;
mod pipeline;
mod routing;
mod sanitize;
mod task;


pub use pipeline::{CollectionOutcome, CollectionSummary, MetricsPipeline, PipelineConfig};
pub use r#loop::{PeriodicTask, TaskLoop, TickOutcome};
pub use routing::{
    group_from_type, metrics_index, sample_id, split_batch, workload_type, ContainerRef,
    CONTAINER_METRICS_INDEX_PREFIX, WORKLOAD_TYPE_PREFIX,
};
pub use sanitize::sanitize_field_names;
pub use task::{MetricsCollectionTask, METRICS_COLLECTION_TASK};
