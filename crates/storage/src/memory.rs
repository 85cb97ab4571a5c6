// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process storage backend.

use crate::table::{matches_filter, Filter, Record, Storage, StorageError};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

pub(crate) type Rows = BTreeMap<String, Value>;

/// Storage that lives only as long as the process.
#[derive(Default)]
pub struct MemoryStorage {
    tables: Mutex<HashMap<String, Rows>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn ensure_table(&self, name: &str, _schema: &Value) -> Result<(), StorageError> {
        self.tables.lock().entry(name.to_string()).or_default();
        Ok(())
    }

    async fn get(&self, table: &str, key: &str) -> Result<Option<Value>, StorageError> {
        let tables = self.tables.lock();
        let rows = rows(&tables, table)?;
        Ok(rows.get(key).cloned())
    }

    async fn set(&self, table: &str, key: &str, value: Value) -> Result<(), StorageError> {
        let mut tables = self.tables.lock();
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| StorageError::UnknownTable(table.to_string()))?;
        rows.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, table: &str, key: &str) -> Result<bool, StorageError> {
        let mut tables = self.tables.lock();
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| StorageError::UnknownTable(table.to_string()))?;
        Ok(rows.remove(key).is_some())
    }

    async fn query(
        &self,
        table: &str,
        filter: Option<&Filter>,
    ) -> Result<Vec<Record>, StorageError> {
        let tables = self.tables.lock();
        Ok(select(rows(&tables, table)?, filter))
    }
}

fn rows<'a>(tables: &'a HashMap<String, Rows>, table: &str) -> Result<&'a Rows, StorageError> {
    tables
        .get(table)
        .ok_or_else(|| StorageError::UnknownTable(table.to_string()))
}

pub(crate) fn select(rows: &Rows, filter: Option<&Filter>) -> Vec<Record> {
    rows.iter()
        .filter(|(_, value)| matches_filter(value, filter))
        .map(|(key, value)| Record {
            key: key.clone(),
            value: value.clone(),
        })
        .collect()
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
