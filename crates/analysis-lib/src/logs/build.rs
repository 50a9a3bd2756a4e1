use crate::error::{AnalysisError, Result};
use crate::models::BuildLog;
use crate::store::query::{hit_sources, time_sorted_search, Page, TimeRange};
use crate::store::DocumentStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

pub const BUILD_LOG_INDEX_PREFIX: &str = "build_log_";
pub const BUILD_LOG_TYPE: &str = "build_log";

const CREATED_TIME_FIELD: &str = "CreatedTime";

/// Index holding every build log of an image
pub fn build_log_index(image: &str) -> String {
    format!("{}{}", BUILD_LOG_INDEX_PREFIX, image.to_lowercase())
}

pub struct BuildLogStore {
    store: Arc<dyn DocumentStore>,
}

impl BuildLogStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Save under (image, version). Dots in version info keys become
    /// underscores.
    pub async fn save(&self, mut log: BuildLog, refresh: bool) -> Result<()> {
        if log.image_information.is_empty() || log.version.is_empty() {
            return Err(AnalysisError::InvalidInput(
                "build log needs an image and a version".to_string(),
            ));
        }
        log.version_info = log
            .version_info
            .into_iter()
            .map(|(key, value)| (key.replace('.', "_"), value))
            .collect();

        let index = build_log_index(&log.image_information);
        let document = serde_json::to_value(&log)?;
        self.store
            .put(&index, BUILD_LOG_TYPE, &log.version, &document)
            .await?;
        if refresh {
            self.store.refresh(&index).await?;
        }

        debug!(image = %log.image_information, version = %log.version, "Saved build log");
        Ok(())
    }

    pub async fn get(&self, image: &str, version: &str) -> Result<BuildLog> {
        let document = self
            .store
            .get(&build_log_index(image), BUILD_LOG_TYPE, version)
            .await?;
        serde_json::from_value(document)
            .map_err(|e| AnalysisError::MalformedData(format!("build log {}/{}: {}", image, version, e)))
    }

    /// Newest-first logs of an image within an optional creation time range
    pub async fn search(
        &self,
        image: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        page: Page,
    ) -> Result<Vec<BuildLog>> {
        let range = TimeRange::new(from, to)?;
        let query = time_sorted_search(CREATED_TIME_FIELD, &range, Vec::new(), page);

        let response = self
            .store
            .search(&build_log_index(image), BUILD_LOG_TYPE, &query)
            .await?;
        hit_sources(&response)?
            .into_iter()
            .map(|source| {
                serde_json::from_value(source)
                    .map_err(|e| AnalysisError::MalformedData(format!("build log of {}: {}", image, e)))
            })
            .collect()
    }

    pub async fn delete(&self, image: &str, version: &str) -> Result<()> {
        self.store
            .delete(&build_log_index(image), BUILD_LOG_TYPE, version)
            .await
    }

    /// Drop every log of an image
    pub async fn delete_image(&self, image: &str) -> Result<()> {
        self.store.delete_index(&build_log_index(image)).await
    }
}
