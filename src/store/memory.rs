use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use super::{DataStore, Filter, StoreResponse};

/// Process-local store, one row vector per table.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: DashMap<String, Vec<Value>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, |rows| rows.len())
    }

    pub fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }
}

fn matches_all(row: &Value, filters: &[Filter]) -> bool {
    filters.iter().all(|f| f.matches(row))
}

#[async_trait]
impl DataStore for InMemoryStore {
    async fn select(&self, table: &str, filters: &[Filter]) -> StoreResponse {
        let rows = self
            .tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| matches_all(row, filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        StoreResponse::rows(rows)
    }

    async fn insert(&self, table: &str, row: Value) -> StoreResponse {
        if !row.is_object() {
            return StoreResponse::error(format!("rows for '{}' must be JSON objects", table));
        }
        self.tables
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        StoreResponse::rows(vec![row])
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: Value) -> StoreResponse {
        let Value::Object(patch) = patch else {
            return StoreResponse::error("update patch must be a JSON object");
        };
        let Some(mut rows) = self.tables.get_mut(table) else {
            return StoreResponse::rows(Vec::new());
        };
        let mut updated = Vec::new();
        for row in rows.iter_mut().filter(|row| matches_all(row, filters)) {
            if let Value::Object(fields) = row {
                for (k, v) in &patch {
                    fields.insert(k.clone(), v.clone());
                }
            }
            updated.push(row.clone());
        }
        StoreResponse::rows(updated)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> StoreResponse {
        let Some(mut rows) = self.tables.get_mut(table) else {
            return StoreResponse::rows(Vec::new());
        };
        let (removed, kept): (Vec<Value>, Vec<Value>) =
            rows.drain(..).partition(|row| matches_all(row, filters));
        *rows = kept;
        StoreResponse::rows(removed)
    }
}
