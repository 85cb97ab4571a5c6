// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow: one tracked conversation or task thread.

use serde::{Deserialize, Serialize};
use std::fmt;

crate::define_id! {
    /// Unique identifier for a workflow.
    pub struct WorkflowId;
}

/// Agent id of the main interactive agent.
pub const MAIN_AGENT: &str = "main";

/// Lifecycle status of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    /// Statuses that end a thread for good.
    ///
    /// `Completed` is not terminal here: a completed interactive workflow is
    /// picked up again by the next message on the same (user, channel).
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowStatus::Failed | WorkflowStatus::Cancelled)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Paused => "paused",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A tracked thread for a (user, channel, agent) triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    pub status: WorkflowStatus,
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_workflow_id: Option<WorkflowId>,
    pub channel_id: String,
    pub user_id: String,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Workflow {
    /// Whether this workflow belongs to the given (user, channel, agent).
    pub fn is_thread_of(&self, user_id: &str, channel_id: &str, agent_id: &str) -> bool {
        self.user_id == user_id && self.channel_id == channel_id && self.agent_id == agent_id
    }

    /// Active = pending, running or paused.
    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            WorkflowStatus::Pending | WorkflowStatus::Running | WorkflowStatus::Paused
        )
    }
}

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;
