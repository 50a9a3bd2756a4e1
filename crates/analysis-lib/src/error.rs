//! Error taxonomy shared by every component of the analysis library

use std::fmt;
use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Errors raised by the analysis components
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// A document does not exist in the store. Often a control-flow signal
    /// rather than a failure (see the singleton election seeding path).
    #[error("record not found: {index}/{doc_type}/{id}")]
    NotFound {
        index: String,
        doc_type: String,
        id: String,
    },

    /// The document store rejected or failed a request
    #[error("document store error: {0}")]
    Store(String),

    /// The cluster API or a node agent failed a request
    #[error("cluster API error: {0}")]
    Cluster(String),

    /// Transport-level HTTP failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream data is missing fields or cannot be decoded
    #[error("malformed data: {0}")]
    MalformedData(String),

    /// Caller supplied arguments that can never succeed
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A collection cycle finished but some units failed
    #[error("{0}")]
    PartialFailure(FailureReport),
}

impl AnalysisError {
    pub fn not_found(index: &str, doc_type: &str, id: &str) -> Self {
        Self::NotFound {
            index: index.to_string(),
            doc_type: doc_type.to_string(),
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AnalysisError::NotFound { .. })
    }

    pub fn is_invalid_input(&self) -> bool {
        matches!(self, AnalysisError::InvalidInput(_))
    }
}

/// Failures recorded while walking a set of independent units of work.
///
/// Siblings keep running after a failure; the report is turned into a single
/// error once the whole walk is done.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureReport {
    context: String,
    failures: Vec<String>,
}

impl FailureReport {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            failures: Vec::new(),
        }
    }

    pub fn record(&mut self, failure: impl Into<String>) {
        self.failures.push(failure.into());
    }

    pub fn extend(&mut self, other: FailureReport) {
        self.failures.extend(other.failures);
    }

    pub fn failures(&self) -> &[String] {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// `Ok(value)` when nothing failed, otherwise the combined error
    pub fn into_result<T>(self, value: T) -> Result<T> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(AnalysisError::PartialFailure(self))
        }
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} finished with {} failure(s): {}",
            self.context,
            self.failures.len(),
            self.failures.join("; ")
        )
    }
}
