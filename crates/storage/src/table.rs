// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Storage contract shared by the backends.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors that can occur in storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("invalid table name: {0:?}")]
    InvalidTableName(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Field-equality filter: a row matches when every listed field is equal.
pub type Filter = Map<String, Value>;

/// One stored row.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub key: String,
    pub value: Value,
}

/// Minimal schemaless key/value store, organized into named tables.
///
/// Tables must be created with [`Storage::ensure_table`] before use.
/// Rows come back from [`Storage::query`] ordered by key.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Create the table if missing. `schema` is advisory.
    async fn ensure_table(&self, name: &str, schema: &Value) -> Result<(), StorageError>;

    async fn get(&self, table: &str, key: &str) -> Result<Option<Value>, StorageError>;

    async fn set(&self, table: &str, key: &str, value: Value) -> Result<(), StorageError>;

    /// Remove a row. Returns whether it existed.
    async fn delete(&self, table: &str, key: &str) -> Result<bool, StorageError>;

    async fn query(&self, table: &str, filter: Option<&Filter>)
        -> Result<Vec<Record>, StorageError>;
}

/// Whether `value` satisfies `filter`. Non-object values only match an empty filter.
pub fn matches_filter(value: &Value, filter: Option<&Filter>) -> bool {
    let Some(filter) = filter else {
        return true;
    };
    filter
        .iter()
        .all(|(field, expected)| value.get(field) == Some(expected))
}

#[cfg(test)]
#[path = "table_tests.rs"]
mod tests;
