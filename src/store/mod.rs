//! Generic data-store interface.
//!
//! The hosted relational backend is an external collaborator; the orchestrator
//! only needs row-level `{select, insert, update, delete}` keyed by table name
//! and equality filters, each answering `{data, error}`.

pub mod memory;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

pub use memory::InMemoryStore;

/// `column = value` predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, row: &Value) -> bool {
        row.get(&self.column) == Some(&self.value)
    }
}

/// Outcome of a store call. Exactly one of `data` / `error` is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreResponse {
    pub data: Option<Vec<Value>>,
    pub error: Option<String>,
}

impl StoreResponse {
    pub fn rows(rows: Vec<Value>) -> Self {
        Self {
            data: Some(rows),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            data: None,
            error: Some(msg.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[async_trait]
pub trait DataStore: Send + Sync {
    async fn select(&self, table: &str, filters: &[Filter]) -> StoreResponse;
    async fn insert(&self, table: &str, row: Value) -> StoreResponse;
    /// Merge `patch` into every matching row; returns the updated rows.
    async fn update(&self, table: &str, filters: &[Filter], patch: Value) -> StoreResponse;
    /// Returns the deleted rows.
    async fn delete(&self, table: &str, filters: &[Filter]) -> StoreResponse;
}
