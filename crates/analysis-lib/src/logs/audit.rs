use crate::error::{AnalysisError, Result};
use crate::models::AuditLog;
use crate::store::query::{hit_sources, time_sorted_search, Page, TimeRange};
use crate::store::DocumentStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub const AUDIT_LOG_INDEX: &str = "audit_log";

const CREATED_TIME_FIELD: &str = "CreatedTime";

/// `<unix seconds>_<unix nanoseconds>` of the creation time
pub fn audit_log_id(created: &DateTime<Utc>) -> Result<String> {
    let nanos = created.timestamp_nanos_opt().ok_or_else(|| {
        AnalysisError::InvalidInput(format!("creation time {} is out of range", created))
    })?;
    Ok(format!("{}_{}", created.timestamp(), nanos))
}

pub struct AuditLogStore {
    store: Arc<dyn DocumentStore>,
}

impl AuditLogStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Save under the user's document type. Returns the document id.
    pub async fn save(&self, log: &AuditLog, refresh: bool) -> Result<String> {
        if log.user_name.is_empty() {
            return Err(AnalysisError::InvalidInput("audit log needs a user name".to_string()));
        }
        let id = audit_log_id(&log.created_time)?;

        let document = serde_json::to_value(log)?;
        self.store
            .put(AUDIT_LOG_INDEX, &log.user_name, &id, &document)
            .await?;
        if refresh {
            self.store.refresh(AUDIT_LOG_INDEX).await?;
        }
        Ok(id)
    }

    /// Newest-first logs of one user, or of every user when `user` is `None`
    pub async fn search(
        &self,
        user: Option<&str>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        page: Page,
    ) -> Result<Vec<AuditLog>> {
        let range = TimeRange::new(from, to)?;
        let query = time_sorted_search(CREATED_TIME_FIELD, &range, Vec::new(), page);

        let response = self
            .store
            .search(AUDIT_LOG_INDEX, user.unwrap_or("*"), &query)
            .await?;
        hit_sources(&response)?
            .into_iter()
            .map(|source| {
                serde_json::from_value(source)
                    .map_err(|e| AnalysisError::MalformedData(format!("audit log: {}", e)))
            })
            .collect()
    }
}
