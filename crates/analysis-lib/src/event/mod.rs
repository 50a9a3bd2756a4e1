//! Historical cluster events
//!
//! Events are moved out of the cluster into the event index, one document
//! type per namespace, and can later be searched and acknowledged.

mod recorder;
mod task;

pub use recorder::{event_id, EventRecorder, RecordingSummary};
pub use task::{EventRecordingTask, EVENT_RECORDING_TASK};

/// Index holding every recorded event
pub const EVENT_INDEX: &str = "kubernetes_events";
