//! In-process document store
//!
//! Keeps documents in a concurrent map. Searches are not evaluated; each
//! (index, type) pair answers with a canned response registered through
//! [`MemoryStore::set_search_response`], and every query issued is recorded
//! so it can be inspected afterwards.

use super::DocumentStore;
use crate::error::{AnalysisError, Result};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Mutex;

type DocumentKey = (String, String, String);

/// A query received by [`MemoryStore::search`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedSearch {
    pub index: String,
    pub doc_type: String,
    pub query: Value,
}

#[derive(Default)]
pub struct MemoryStore {
    documents: DashMap<DocumentKey, Value>,
    search_responses: DashMap<(String, String), Value>,
    failing_searches: DashSet<(String, String)>,
    templates: DashMap<String, Value>,
    searches: Mutex<Vec<RecordedSearch>>,
    refreshed: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Response returned by searches against (index, type)
    pub fn set_search_response(&self, index: &str, doc_type: &str, response: Value) {
        self.search_responses
            .insert((index.to_string(), doc_type.to_string()), response);
    }

    /// Make searches against (index, type) fail
    pub fn fail_search(&self, index: &str, doc_type: &str) {
        self.failing_searches
            .insert((index.to_string(), doc_type.to_string()));
    }

    pub fn document(&self, index: &str, doc_type: &str, id: &str) -> Option<Value> {
        self.documents
            .get(&key(index, doc_type, id))
            .map(|entry| entry.value().clone())
    }

    /// Ids of every document stored under (index, type), sorted
    pub fn ids(&self, index: &str, doc_type: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .documents
            .iter()
            .filter(|entry| entry.key().0 == index && entry.key().1 == doc_type)
            .map(|entry| entry.key().2.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn template(&self, name: &str) -> Option<Value> {
        self.templates.get(name).map(|entry| entry.value().clone())
    }

    pub fn recorded_searches(&self) -> Vec<RecordedSearch> {
        self.searches
            .lock()
            .map(|searches| searches.clone())
            .unwrap_or_default()
    }

    pub fn refreshed_indices(&self) -> Vec<String> {
        self.refreshed
            .lock()
            .map(|refreshed| refreshed.clone())
            .unwrap_or_default()
    }
}

fn key(index: &str, doc_type: &str, id: &str) -> DocumentKey {
    (index.to_string(), doc_type.to_string(), id.to_string())
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn put(&self, index: &str, doc_type: &str, id: &str, document: &Value) -> Result<()> {
        self.documents.insert(key(index, doc_type, id), document.clone());
        Ok(())
    }

    async fn get(&self, index: &str, doc_type: &str, id: &str) -> Result<Value> {
        self.document(index, doc_type, id)
            .ok_or_else(|| AnalysisError::not_found(index, doc_type, id))
    }

    async fn delete(&self, index: &str, doc_type: &str, id: &str) -> Result<()> {
        self.documents
            .remove(&key(index, doc_type, id))
            .map(|_| ())
            .ok_or_else(|| AnalysisError::not_found(index, doc_type, id))
    }

    async fn search(&self, index: &str, doc_type: &str, query: &Value) -> Result<Value> {
        if let Ok(mut searches) = self.searches.lock() {
            searches.push(RecordedSearch {
                index: index.to_string(),
                doc_type: doc_type.to_string(),
                query: query.clone(),
            });
        }

        let target = (index.to_string(), doc_type.to_string());
        if self.failing_searches.contains(&target) {
            return Err(AnalysisError::Store(format!(
                "search against {}/{} failed",
                index, doc_type
            )));
        }

        Ok(self
            .search_responses
            .get(&target)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| json!({ "hits": { "total": 0, "hits": [] } })))
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        let before = self.documents.len();
        self.documents.retain(|(i, _, _), _| i != index);
        if self.documents.len() == before {
            return Err(AnalysisError::not_found(index, "", ""));
        }
        Ok(())
    }

    async fn list_types_for_index(&self, index: &str) -> Result<Vec<String>> {
        let types: BTreeSet<String> = self
            .documents
            .iter()
            .filter(|entry| entry.key().0 == index)
            .map(|entry| entry.key().1.clone())
            .chain(
                self.search_responses
                    .iter()
                    .filter(|entry| entry.key().0 == index)
                    .map(|entry| entry.key().1.clone()),
            )
            .chain(
                self.failing_searches
                    .iter()
                    .filter(|entry| entry.key().0 == index)
                    .map(|entry| entry.key().1.clone()),
            )
            .collect();

        if types.is_empty() {
            return Err(AnalysisError::not_found(index, "", ""));
        }
        Ok(types.into_iter().collect())
    }

    async fn refresh(&self, index: &str) -> Result<()> {
        if let Ok(mut refreshed) = self.refreshed.lock() {
            refreshed.push(index.to_string());
        }
        Ok(())
    }

    async fn put_index_template(&self, name: &str, body: &Value) -> Result<()> {
        self.templates.insert(name.to_string(), body.clone());
        Ok(())
    }
}
