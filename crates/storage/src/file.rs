// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON-file storage backend.
//!
//! Each table lives in `<dir>/<table>.json` as one JSON object mapping key to
//! row. The whole table is cached in memory and rewritten atomically (write to
//! a temp file, then rename) after every mutation.

use crate::memory::{select, Rows};
use crate::table::{Filter, Record, Storage, StorageError};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

pub struct JsonFileStorage {
    dir: PathBuf,
    tables: Mutex<HashMap<String, Rows>>,
    /// Serializes file writes so a slower, older snapshot never lands last.
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileStorage {
    /// Open (creating if needed) a storage directory.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            tables: Mutex::new(HashMap::new()),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn table_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{table}.json"))
    }

    async fn load_table(&self, table: &str) -> Result<Rows, StorageError> {
        let path = self.table_path(table);
        let text = match fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Rows::new()),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&text) {
            Ok(rows) => Ok(rows),
            Err(e) => {
                let bak_path = path.with_extension("json.bak");
                warn!(
                    error = %e,
                    path = %path.display(),
                    bak = %bak_path.display(),
                    "Corrupt table file, moving to .bak and starting empty",
                );
                fs::rename(&path, &bak_path).await?;
                Ok(Rows::new())
            }
        }
    }

    async fn persist(&self, table: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let json = {
            let tables = self.tables.lock();
            match tables.get(table) {
                Some(rows) => serde_json::to_vec_pretty(rows)?,
                None => return Err(StorageError::UnknownTable(table.to_string())),
            }
        };
        let path = self.table_path(table);
        let tmp_path = self.dir.join(format!(".{table}.json.tmp"));
        fs::write(&tmp_path, &json).await?;
        fs::rename(&tmp_path, &path).await?;
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<(), StorageError> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(StorageError::InvalidTableName(name.to_string()))
    }
}

#[async_trait]
impl Storage for JsonFileStorage {
    async fn ensure_table(&self, name: &str, _schema: &Value) -> Result<(), StorageError> {
        validate_name(name)?;
        if self.tables.lock().contains_key(name) {
            return Ok(());
        }
        let rows = self.load_table(name).await?;
        debug!(table = name, rows = rows.len(), "table loaded");
        self.tables.lock().entry(name.to_string()).or_insert(rows);
        Ok(())
    }

    async fn get(&self, table: &str, key: &str) -> Result<Option<Value>, StorageError> {
        let tables = self.tables.lock();
        let rows = tables
            .get(table)
            .ok_or_else(|| StorageError::UnknownTable(table.to_string()))?;
        Ok(rows.get(key).cloned())
    }

    async fn set(&self, table: &str, key: &str, value: Value) -> Result<(), StorageError> {
        {
            let mut tables = self.tables.lock();
            let rows = tables
                .get_mut(table)
                .ok_or_else(|| StorageError::UnknownTable(table.to_string()))?;
            rows.insert(key.to_string(), value);
        }
        self.persist(table).await
    }

    async fn delete(&self, table: &str, key: &str) -> Result<bool, StorageError> {
        let existed = {
            let mut tables = self.tables.lock();
            let rows = tables
                .get_mut(table)
                .ok_or_else(|| StorageError::UnknownTable(table.to_string()))?;
            rows.remove(key).is_some()
        };
        if existed {
            self.persist(table).await?;
        }
        Ok(existed)
    }

    async fn query(
        &self,
        table: &str,
        filter: Option<&Filter>,
    ) -> Result<Vec<Record>, StorageError> {
        let tables = self.tables.lock();
        let rows = tables
            .get(table)
            .ok_or_else(|| StorageError::UnknownTable(table.to_string()))?;
        Ok(select(rows, filter))
    }
}

#[cfg(test)]
#[path = "file_tests.rs"]
mod tests;
