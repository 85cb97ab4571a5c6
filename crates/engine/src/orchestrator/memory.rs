// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-workflow conversation memory.

use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use wd_core::{Turn, WorkflowId};
use wd_storage::{Storage, StorageError};

pub const MEMORY_TABLE: &str = "memory";

/// Stored turns beyond this are dropped oldest first.
pub const MAX_STORED_TURNS: usize = 500;

/// Turn log keyed by workflow id, cached in memory and written through to storage.
#[derive(Clone)]
pub struct MemoryStore {
    storage: Arc<dyn Storage>,
    cache: Arc<Mutex<HashMap<WorkflowId, Vec<Turn>>>>,
}

impl MemoryStore {
    pub async fn open(storage: Arc<dyn Storage>) -> Result<Self, StorageError> {
        storage
            .ensure_table(MEMORY_TABLE, &json!({"key": "workflowId"}))
            .await?;
        Ok(Self {
            storage,
            cache: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub async fn append(&self, workflow_id: &WorkflowId, turn: Turn) -> Result<(), StorageError> {
        let mut turns = self.turns(workflow_id).await?;
        turns.push(turn);
        if turns.len() > MAX_STORED_TURNS {
            turns.drain(..turns.len() - MAX_STORED_TURNS);
        }
        let value = serde_json::to_value(&turns)?;
        self.cache.lock().insert(workflow_id.clone(), turns);
        self.storage
            .set(MEMORY_TABLE, workflow_id.as_str(), value)
            .await
    }

    /// The last `limit` turns, oldest first.
    pub async fn recent(
        &self,
        workflow_id: &WorkflowId,
        limit: usize,
    ) -> Result<Vec<Turn>, StorageError> {
        let turns = self.turns(workflow_id).await?;
        let skip = turns.len().saturating_sub(limit);
        Ok(turns.into_iter().skip(skip).collect())
    }

    /// Wipe one workflow's turns, or every workflow's. Returns how many logs were removed.
    pub async fn clear(&self, workflow_id: Option<&WorkflowId>) -> Result<usize, StorageError> {
        let keys: Vec<String> = match workflow_id {
            Some(id) => vec![id.to_string()],
            None => self
                .storage
                .query(MEMORY_TABLE, None)
                .await?
                .into_iter()
                .map(|r| r.key)
                .collect(),
        };
        let mut removed = 0;
        for key in &keys {
            if self.storage.delete(MEMORY_TABLE, key).await? {
                removed += 1;
            }
        }
        match workflow_id {
            Some(id) => {
                self.cache.lock().remove(id);
            }
            None => self.cache.lock().clear(),
        }
        tracing::info!(removed, scope = ?workflow_id.map(WorkflowId::as_str), "memory cleared");
        Ok(removed)
    }

    async fn turns(&self, workflow_id: &WorkflowId) -> Result<Vec<Turn>, StorageError> {
        if let Some(turns) = self.cache.lock().get(workflow_id) {
            return Ok(turns.clone());
        }
        let turns: Vec<Turn> = match self.storage.get(MEMORY_TABLE, workflow_id.as_str()).await? {
            Some(value) => serde_json::from_value(value)?,
            None => Vec::new(),
        };
        self.cache.lock().insert(workflow_id.clone(), turns.clone());
        Ok(turns)
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
