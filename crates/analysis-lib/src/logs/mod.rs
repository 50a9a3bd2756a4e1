//! Build and audit log storage
//!
//! Build logs live in one index per image, keyed by version. Audit logs share
//! a single index with one document type per user.

mod audit;
mod build;

pub use audit::{audit_log_id, AuditLogStore, AUDIT_LOG_INDEX};
pub use build::{build_log_index, BuildLogStore, BUILD_LOG_INDEX_PREFIX, BUILD_LOG_TYPE};
