// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background job records: sub-agents, tasks and skills.

use crate::workflow::WorkflowId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

crate::define_id! {
    /// Unique identifier for a background job.
    pub struct JobId;
}

/// Which flavour of background work a job is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Model-driven background agent, possibly recurring.
    Subagent,
    /// Periodic execution of persisted generated code.
    Task,
    /// On-demand reusable generated function.
    Skill,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Subagent => "subagent",
            JobKind::Task => "task",
            JobKind::Skill => "skill",
        }
    }

    /// Event name for a lifecycle action, e.g. `subagent:executed`.
    pub fn event(self, action: &str) -> String {
        format!("{}:{}", self.as_str(), action)
    }

    /// Kinds whose code survives a restart.
    pub fn is_persisted(self) -> bool {
        matches!(self, JobKind::Task | JobKind::Skill)
    }

    /// Skills run only when called; they never arm a timer.
    pub fn is_on_demand(self) -> bool {
        matches!(self, JobKind::Skill)
    }

    /// Storage table holding persisted jobs of this kind.
    pub fn table(self) -> &'static str {
        match self {
            JobKind::Subagent => "subagents",
            JobKind::Task => "tasks",
            JobKind::Skill => "skills",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Paused,
    Stopped,
    Error,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Running => "running",
            JobStatus::Paused => "paused",
            JobStatus::Stopped => "stopped",
            JobStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// One call in a step program.
///
/// `call` is a tool name, or `skill:<name>` to invoke another skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptStep {
    pub call: String,
    #[serde(default)]
    pub params: Value,
}

const SKILL_CALL_PREFIX: &str = "skill:";

impl ScriptStep {
    /// Skill name if this step calls a skill.
    pub fn skill_name(&self) -> Option<&str> {
        self.call.strip_prefix(SKILL_CALL_PREFIX)
    }

    /// Params with `{{input}}` and `{{prev}}` substituted in every string.
    pub fn render_params(&self, input: &str, prev: &str) -> Value {
        render_value(&self.params, input, prev)
    }
}

fn render_value(value: &Value, input: &str, prev: &str) -> Value {
    match value {
        Value::String(s) => Value::String(s.replace("{{input}}", input).replace("{{prev}}", prev)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| render_value(v, input, prev))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_value(v, input, prev)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Executable body of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobCode {
    /// Run the tool-calling agent loop with this assignment.
    Prompt { prompt: String },
    /// Sequential capability calls; output is the last step's output.
    Script { steps: Vec<ScriptStep> },
}

impl JobCode {
    /// Parse generated code text: a JSON object `{"steps": [...]}` or a bare step array.
    pub fn parse_script(text: &str) -> Result<Self, serde_json::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Wrapped { steps: Vec<ScriptStep> },
            Bare(Vec<ScriptStep>),
        }
        let steps = match serde_json::from_str::<Raw>(text)? {
            Raw::Wrapped { steps } | Raw::Bare(steps) => steps,
        };
        Ok(JobCode::Script { steps })
    }

    /// Parse code given either as JSON text or as an already-decoded value.
    pub fn script_from_value(value: &Value) -> Result<Self, serde_json::Error> {
        match value {
            Value::String(text) => Self::parse_script(text),
            other => Self::parse_script(&other.to_string()),
        }
    }
}

/// Snapshot of a job as seen by callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    pub id: JobId,
    pub kind: JobKind,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub status: JobStatus,
    pub interval_ms: u64,
    pub code: JobCode,
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<u64>,
    #[serde(default)]
    pub run_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Workflow that spawned the job, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<WorkflowId>,
}

impl JobInfo {
    /// Agent id the job acts as when it calls capabilities.
    pub fn agent_id(&self) -> String {
        format!("{}:{}", self.kind, self.name)
    }

    pub fn runs_once(&self) -> bool {
        self.interval_ms == 0
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
