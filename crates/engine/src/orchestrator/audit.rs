// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Audit log of tool calls, capped at the newest [`MAX_AUDIT_ENTRIES`].

use super::CallContext;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use wd_core::{AuditEntry, AuditOutcome, Clock, IdGen};
use wd_storage::{Storage, StorageError};

pub const AUDIT_TABLE: &str = "audit";

/// Entries kept; older ones are dropped as new ones arrive.
pub const MAX_AUDIT_ENTRIES: u64 = 1000;

/// Entries are keyed by a zero-padded sequence so key order is append order.
pub struct AuditLog {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGen>,
    max_entries: u64,
    next_seq: Mutex<u64>,
}

fn seq_key(seq: u64) -> String {
    format!("{seq:016}")
}

impl AuditLog {
    pub async fn open(
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGen>,
    ) -> Result<Self, StorageError> {
        Self::open_with_limit(storage, clock, ids, MAX_AUDIT_ENTRIES).await
    }

    /// Open keeping at most `max_entries`, trimming any excess already stored.
    pub async fn open_with_limit(
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGen>,
        max_entries: u64,
    ) -> Result<Self, StorageError> {
        storage
            .ensure_table(AUDIT_TABLE, &json!({"key": "seq"}))
            .await?;
        let mut seqs: Vec<u64> = storage
            .query(AUDIT_TABLE, None)
            .await?
            .iter()
            .filter_map(|r| r.key.parse::<u64>().ok())
            .collect();
        seqs.sort_unstable();
        let next_seq = seqs.last().map_or(1, |last| last + 1);
        let excess = seqs.len().saturating_sub(max_entries as usize);
        for seq in &seqs[..excess] {
            storage.delete(AUDIT_TABLE, &seq_key(*seq)).await?;
        }
        if excess > 0 {
            tracing::debug!(dropped = excess, "trimmed audit log");
        }
        Ok(Self {
            storage,
            clock,
            ids,
            max_entries,
            next_seq: Mutex::new(next_seq),
        })
    }

    /// Record one outcome. Storage failures are logged, never raised.
    pub async fn record(
        &self,
        ctx: &CallContext,
        tool: &str,
        parameters: &Value,
        outcome: AuditOutcome,
        detail: Option<String>,
    ) -> AuditEntry {
        let entry = AuditEntry {
            id: self.ids.next_prefixed("audit"),
            timestamp_ms: self.clock.epoch_ms(),
            workflow_id: ctx.workflow_id.to_string(),
            user_id: ctx.user_id.clone(),
            channel_id: ctx.channel_id.clone(),
            tool: tool.to_string(),
            parameters: parameters.clone(),
            outcome,
            detail,
        };
        let seq = {
            let mut next = self.next_seq.lock();
            let seq = *next;
            *next += 1;
            seq
        };
        let stored = match serde_json::to_value(&entry) {
            Ok(value) => self.storage.set(AUDIT_TABLE, &seq_key(seq), value).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = stored {
            tracing::warn!(tool, error = %e, "failed to write audit entry");
        }
        if seq > self.max_entries {
            let expired = seq_key(seq - self.max_entries);
            if let Err(e) = self.storage.delete(AUDIT_TABLE, &expired).await {
                tracing::warn!(key = %expired, error = %e, "failed to drop old audit entry");
            }
        }
        entry
    }

    /// The most recent `limit` entries, oldest first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, StorageError> {
        let records = self.storage.query(AUDIT_TABLE, None).await?;
        let skip = records.len().saturating_sub(limit);
        records
            .into_iter()
            .skip(skip)
            .map(|r| serde_json::from_value(r.value).map_err(StorageError::from))
            .collect()
    }
}

#[cfg(test)]
#[path = "audit_tests.rs"]
mod tests;
