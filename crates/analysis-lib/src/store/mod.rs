//! Document store gateway
//!
//! Every component persists and queries JSON documents through the
//! [`DocumentStore`] trait. Documents are addressed by (index, type, id).
//! [`ElasticsearchGateway`] talks to a search engine over HTTP;
//! [`MemoryStore`] keeps everything in-process.

mod elasticsearch;
mod memory;
pub mod query;
pub mod templates;

pub use elasticsearch::{ElasticsearchGateway, GatewayConfig};
pub use memory::MemoryStore;

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Storage operations needed by the analysis components
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create or overwrite a document
    async fn put(&self, index: &str, doc_type: &str, id: &str, document: &Value) -> Result<()>;

    /// Load a document's source. A missing document yields
    /// [`AnalysisError::NotFound`](crate::error::AnalysisError::NotFound).
    async fn get(&self, index: &str, doc_type: &str, id: &str) -> Result<Value>;

    /// Remove a single document
    async fn delete(&self, index: &str, doc_type: &str, id: &str) -> Result<()>;

    /// Run a query and return the raw search response
    async fn search(&self, index: &str, doc_type: &str, query: &Value) -> Result<Value>;

    /// Drop an index with all its documents
    async fn delete_index(&self, index: &str) -> Result<()>;

    /// Document types present in an index
    async fn list_types_for_index(&self, index: &str) -> Result<Vec<String>>;

    /// Make recent writes visible to search
    async fn refresh(&self, index: &str) -> Result<()>;

    /// Install or replace an index template
    async fn put_index_template(&self, name: &str, body: &Value) -> Result<()>;
}
