// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow registry: one conversation thread per (user, channel, agent).

use crate::error::OrchestratorError;
use crate::event_bus::EventBus;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use wd_core::{names, Clock, IdGen, Workflow, WorkflowId, WorkflowStatus};
use wd_storage::{Storage, StorageError};

pub const WORKFLOWS_TABLE: &str = "workflows";

struct WorkflowInner {
    bus: EventBus,
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGen>,
    workflows: Mutex<IndexMap<WorkflowId, Workflow>>,
}

/// Cached, persisted set of workflows. Cheap to clone.
#[derive(Clone)]
pub struct WorkflowStore {
    inner: Arc<WorkflowInner>,
}

impl WorkflowStore {
    /// Load every stored workflow into the cache.
    pub async fn load(
        bus: EventBus,
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGen>,
    ) -> Result<Self, StorageError> {
        storage
            .ensure_table(WORKFLOWS_TABLE, &json!({"key": "id"}))
            .await?;
        let mut workflows = IndexMap::new();
        for record in storage.query(WORKFLOWS_TABLE, None).await? {
            match serde_json::from_value::<Workflow>(record.value) {
                Ok(workflow) => {
                    workflows.insert(workflow.id.clone(), workflow);
                }
                Err(e) => {
                    tracing::warn!(key = %record.key, error = %e, "skipping corrupt stored workflow")
                }
            }
        }
        workflows.sort_by(|_, a, _, b| a.created_at.cmp(&b.created_at));
        tracing::debug!(count = workflows.len(), "loaded workflows");
        Ok(Self {
            inner: Arc::new(WorkflowInner {
                bus,
                storage,
                clock,
                ids,
                workflows: Mutex::new(workflows),
            }),
        })
    }

    /// Return the live thread for (user, channel, agent), creating it if none exists.
    pub async fn find_or_create(
        &self,
        user_id: &str,
        channel_id: &str,
        agent_id: &str,
        parent: Option<&WorkflowId>,
    ) -> Result<Workflow, StorageError> {
        let created = {
            let mut workflows = self.inner.workflows.lock();
            if let Some(existing) = workflows
                .values()
                .rev()
                .find(|w| w.is_thread_of(user_id, channel_id, agent_id) && !w.status.is_terminal())
            {
                return Ok(existing.clone());
            }
            let workflow = self.fresh(user_id, channel_id, agent_id, parent);
            workflows.insert(workflow.id.clone(), workflow.clone());
            workflow
        };
        self.announce(created).await
    }

    /// Always start a new workflow, even when a live thread for the key exists.
    ///
    /// Background runs use this so each tick has its own record and memory.
    pub async fn create(
        &self,
        user_id: &str,
        channel_id: &str,
        agent_id: &str,
        parent: Option<&WorkflowId>,
    ) -> Result<Workflow, StorageError> {
        let workflow = self.fresh(user_id, channel_id, agent_id, parent);
        self.inner
            .workflows
            .lock()
            .insert(workflow.id.clone(), workflow.clone());
        self.announce(workflow).await
    }

    fn fresh(
        &self,
        user_id: &str,
        channel_id: &str,
        agent_id: &str,
        parent: Option<&WorkflowId>,
    ) -> Workflow {
        let now = self.inner.clock.epoch_ms();
        Workflow {
            id: WorkflowId::new(self.inner.ids.next_prefixed("wf")),
            name: format!("{agent_id}:{user_id}@{channel_id}"),
            status: WorkflowStatus::Pending,
            agent_id: agent_id.to_string(),
            parent_workflow_id: parent.cloned(),
            channel_id: channel_id.to_string(),
            user_id: user_id.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    async fn announce(&self, created: Workflow) -> Result<Workflow, StorageError> {
        if let Err(e) = self.persist(&created).await {
            self.inner.workflows.lock().shift_remove(&created.id);
            return Err(e);
        }
        tracing::info!(
            workflow_id = %created.id,
            agent_id = %created.agent_id,
            user_id = %created.user_id,
            channel_id = %created.channel_id,
            "workflow created"
        );
        self.inner
            .bus
            .emit(names::WORKFLOW_CREATED, json!(created));
        Ok(created)
    }

    pub async fn set_status(
        &self,
        id: &WorkflowId,
        status: WorkflowStatus,
    ) -> Result<Workflow, OrchestratorError> {
        let (updated, previous) = {
            let mut workflows = self.inner.workflows.lock();
            let workflow = workflows
                .get_mut(id)
                .ok_or_else(|| OrchestratorError::WorkflowNotFound(id.to_string()))?;
            let previous = workflow.status;
            workflow.status = status;
            workflow.updated_at = self.inner.clock.epoch_ms();
            (workflow.clone(), previous)
        };
        self.persist(&updated).await?;
        tracing::debug!(workflow_id = %id, from = %previous, to = %status, "workflow status");
        self.inner.bus.emit(
            names::WORKFLOW_UPDATED,
            json!({
                "workflowId": updated.id,
                "status": updated.status,
                "previous": previous,
            }),
        );
        Ok(updated)
    }

    pub fn get(&self, id: &WorkflowId) -> Option<Workflow> {
        self.inner.workflows.lock().get(id).cloned()
    }

    /// All workflows, oldest first.
    pub fn list(&self) -> Vec<Workflow> {
        self.inner.workflows.lock().values().cloned().collect()
    }

    /// Distinct channel ids that have carried a workflow, in first-seen order.
    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = Vec::new();
        for workflow in self.inner.workflows.lock().values() {
            if !channels.contains(&workflow.channel_id) {
                channels.push(workflow.channel_id.clone());
            }
        }
        channels
    }

    pub fn active_count(&self) -> usize {
        self.inner
            .workflows
            .lock()
            .values()
            .filter(|w| w.is_active())
            .count()
    }

    async fn persist(&self, workflow: &Workflow) -> Result<(), StorageError> {
        let value = serde_json::to_value(workflow)?;
        self.inner
            .storage
            .set(WORKFLOWS_TABLE, workflow.id.as_str(), value)
            .await
    }
}

#[cfg(test)]
#[path = "workflows_tests.rs"]
mod tests;
