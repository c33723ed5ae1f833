//! The search collaborator.
//!
//! Warden never executes queries itself. It hands the query and a pre-filter
//! to a [`SearchBackend`] and re-checks whatever comes back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use warden_rbac::FilterExpr;
use warden_types::RecordPermission;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    #[error("search backend unavailable: {0}")]
    Unavailable(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

/// A candidate record with its permission metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub permission: RecordPermission,
    /// Document body as returned by the index.
    #[serde(default)]
    pub source: Value,
}

impl SearchHit {
    pub fn new(permission: RecordPermission, source: Value) -> Self {
        Self { permission, source }
    }

    pub fn record_id(&self) -> &str {
        &self.permission.record_id
    }
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Runs `query` restricted by `filter`.
    async fn search(&self, query: &str, filter: &FilterExpr) -> Result<Vec<SearchHit>, SearchError>;
}

/// Backend over a fixed set of documents.
///
/// The filter is evaluated locally; the query matches case-insensitively
/// against the record id and the serialized document body. An empty query or
/// `*` matches everything.
#[derive(Debug, Clone, Default)]
pub struct InMemorySearchBackend {
    hits: Vec<SearchHit>,
}

impl InMemorySearchBackend {
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self { hits }
    }

    pub fn with_hit(mut self, hit: SearchHit) -> Self {
        self.hits.push(hit);
        self
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

fn query_matches(query: &str, hit: &SearchHit) -> bool {
    let query = query.trim();
    if query.is_empty() || query == "*" {
        return true;
    }
    let needle = query.to_lowercase();
    hit.record_id().to_lowercase().contains(&needle) || hit.source.to_string().to_lowercase().contains(&needle)
}

#[async_trait]
impl SearchBackend for InMemorySearchBackend {
    async fn search(&self, query: &str, filter: &FilterExpr) -> Result<Vec<SearchHit>, SearchError> {
        Ok(self
            .hits
            .iter()
            .filter(|hit| filter.matches(&hit.permission) && query_matches(query, hit))
            .cloned()
            .collect())
    }
}
