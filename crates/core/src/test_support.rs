// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::{
    JobCode, JobId, JobInfo, JobKind, JobStatus, PolicyAction, PolicyRule, PolicyScope,
    PolicyTarget, ScopeKind, ScriptStep, Workflow, WorkflowId, WorkflowStatus, MAIN_AGENT,
};
use serde_json::Value;

// ── Builders ────────────────────────────────────────────────────────────────

pub fn workflow(id: &str, user_id: &str, channel_id: &str) -> Workflow {
    Workflow {
        id: WorkflowId::new(id),
        name: format!("{user_id}@{channel_id}"),
        status: WorkflowStatus::Pending,
        agent_id: MAIN_AGENT.to_string(),
        parent_workflow_id: None,
        channel_id: channel_id.to_string(),
        user_id: user_id.to_string(),
        created_at: 1_000_000,
        updated_at: 1_000_000,
    }
}

pub fn job_info(id: &str, kind: JobKind, name: &str) -> JobInfo {
    let code = match kind {
        JobKind::Subagent => JobCode::Prompt {
            prompt: format!("watch {name}"),
        },
        JobKind::Task | JobKind::Skill => JobCode::Script { steps: Vec::new() },
    };
    JobInfo {
        id: JobId::new(id),
        kind,
        name: name.to_string(),
        description: String::new(),
        status: JobStatus::Running,
        interval_ms: 0,
        code,
        created_at: 1_000_000,
        last_run_at: None,
        run_count: 0,
        last_error: None,
        parent_id: None,
        channel_id: None,
        user_id: None,
        workflow_id: None,
    }
}

pub fn script(steps: &[(&str, Value)]) -> JobCode {
    JobCode::Script {
        steps: steps
            .iter()
            .map(|(call, params)| ScriptStep {
                call: call.to_string(),
                params: params.clone(),
            })
            .collect(),
    }
}

/// Rule with the given scope and priority and an empty target.
pub fn rule(id: &str, action: PolicyAction, scope: PolicyScope, priority: i32) -> PolicyRule {
    PolicyRule {
        id: id.to_string(),
        name: id.to_string(),
        description: String::new(),
        scope,
        action,
        target: PolicyTarget::default(),
        priority,
        enabled: true,
    }
}

pub fn tool_rule(id: &str, action: PolicyAction, tools: &[&str], priority: i32) -> PolicyRule {
    rule(id, action, PolicyScope::of(ScopeKind::Tool, tools), priority)
}
