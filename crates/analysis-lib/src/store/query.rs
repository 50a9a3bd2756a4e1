//! Query building blocks shared by the event, build-log and audit-log stores

use crate::error::{AnalysisError, Result};
use crate::models::format_rfc3339_nanos;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

/// Optional time bounds of a search, both inclusive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// Bounds with `from` after `to` are rejected
    pub fn new(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Result<Self> {
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(AnalysisError::InvalidInput(format!(
                    "from {} can't be after to {}",
                    format_rfc3339_nanos(&from),
                    format_rfc3339_nanos(&to)
                )));
            }
        }
        Ok(Self { from, to })
    }

    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    /// A `range` clause on `field`, or `None` when unbounded
    pub fn range_clause(&self, field: &str) -> Option<Value> {
        if self.is_unbounded() {
            return None;
        }

        let mut bounds = Map::new();
        if let Some(from) = &self.from {
            bounds.insert("gte".to_string(), json!(format_rfc3339_nanos(from)));
        }
        if let Some(to) = &self.to {
            bounds.insert("lte".to_string(), json!(format_rfc3339_nanos(to)));
        }
        bounds.insert("time_zone".to_string(), json!("+00:00"));

        let mut range = Map::new();
        range.insert(field.to_string(), Value::Object(bounds));
        Some(json!({ "range": range }))
    }
}

/// Paging of a search result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub size: usize,
    pub offset: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self { size: 10, offset: 0 }
    }
}

/// Newest-first paged search filtered by a time range and extra clauses
pub fn time_sorted_search(field: &str, range: &TimeRange, filters: Vec<Value>, page: Page) -> Value {
    let mut clauses: Vec<Value> = range.range_clause(field).into_iter().collect();
    clauses.extend(filters);

    let query = if clauses.is_empty() {
        json!({ "match_all": {} })
    } else {
        json!({ "bool": { "filter": clauses } })
    };

    let mut sort = Map::new();
    sort.insert(field.to_string(), json!("desc"));

    json!({
        "query": query,
        "sort": [sort],
        "size": page.size,
        "from": page.offset,
    })
}

/// The `hits.hits` array of a search response
pub fn hits(response: &Value) -> Result<Vec<Value>> {
    response
        .get("hits")
        .and_then(|hits| hits.get("hits"))
        .and_then(Value::as_array)
        .cloned()
        .ok_or_else(|| AnalysisError::MalformedData(format!("search response has no hits: {}", response)))
}

/// The `_source` of every hit
pub fn hit_sources(response: &Value) -> Result<Vec<Value>> {
    hits(response)?
        .into_iter()
        .map(|mut hit| {
            hit.get_mut("_source")
                .map(Value::take)
                .ok_or_else(|| AnalysisError::MalformedData("search hit has no _source".to_string()))
        })
        .collect()
}
