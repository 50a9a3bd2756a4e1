//! Core library of the cluster analysis service
//!
//! This crate provides:
//! - Singleton election through a lock document in the store
//! - Container metrics collection from the cluster API and node agents
//! - Bucketed metrics aggregation with gap interpolation
//! - Historical event recording and build/audit log storage
//! - Health checks and observability

pub mod aggregation;
pub mod cluster;
pub mod collector;
pub mod election;
pub mod error;
pub mod event;
pub mod health;
pub mod logs;
pub mod models;
pub mod observability;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{AnalysisError, FailureReport, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{AnalysisMetrics, StructuredLogger};
