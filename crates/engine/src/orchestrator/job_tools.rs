// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tools that let the model manage background jobs.

use super::workflows::WorkflowStore;
use crate::error::ToolError;
use crate::jobs::{JobScheduler, SpawnRequest};
use crate::tools::{Tool, ToolRegistry};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use wd_core::{
    JobCode, JobId, JobInfo, JobKind, ToolContext, ToolParameter, ToolResult, ToolSchema,
    WorkflowId,
};

pub const JOBS_CATEGORY: &str = "jobs";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobOp {
    SpawnSubagent,
    ListSubagents,
    DeleteSubagent,
    CreateTask,
    CreateSkill,
    RunSkill,
    ListSkills,
}

impl JobOp {
    const ALL: [JobOp; 7] = [
        JobOp::SpawnSubagent,
        JobOp::ListSubagents,
        JobOp::DeleteSubagent,
        JobOp::CreateTask,
        JobOp::CreateSkill,
        JobOp::RunSkill,
        JobOp::ListSkills,
    ];

    fn name(self) -> &'static str {
        match self {
            JobOp::SpawnSubagent => "spawn_subagent",
            JobOp::ListSubagents => "list_subagents",
            JobOp::DeleteSubagent => "delete_subagent",
            JobOp::CreateTask => "create_task",
            JobOp::CreateSkill => "create_skill",
            JobOp::RunSkill => "run_skill",
            JobOp::ListSkills => "list_skills",
        }
    }

    fn mutates(self) -> bool {
        !matches!(self, JobOp::ListSubagents | JobOp::ListSkills)
    }
}

const CODE_HELP: &str =
    "JSON step program: {\"steps\": [{\"call\": \"<tool>\" or \"skill:<name>\", \"params\": {...}}]}. \
     String params may use {{input}} and {{prev}}.";

/// One job-management operation exposed as a tool.
struct JobTool {
    op: JobOp,
    jobs: JobScheduler,
    workflows: WorkflowStore,
}

/// Register every job-management tool.
pub(crate) fn register(registry: &ToolRegistry, jobs: &JobScheduler, workflows: &WorkflowStore) {
    for op in JobOp::ALL {
        registry.register(Arc::new(JobTool {
            op,
            jobs: jobs.clone(),
            workflows: workflows.clone(),
        }));
    }
}

fn str_param<'a>(params: &'a Value, key: &str) -> &'a str {
    params.get(key).and_then(Value::as_str).unwrap_or("")
}

fn parse_code(code: Option<&Value>) -> Result<JobCode, String> {
    let code = code.ok_or_else(|| "code is required".to_string())?;
    JobCode::script_from_value(code).map_err(|e| format!("invalid step program: {e}"))
}

fn summary(info: &JobInfo) -> Value {
    json!({
        "id": info.id,
        "name": info.name,
        "description": info.description,
        "status": info.status,
        "intervalMs": info.interval_ms,
        "runCount": info.run_count,
        "lastRunAt": info.last_run_at,
        "lastError": info.last_error,
    })
}

impl JobTool {
    /// The sub-agent that owns the calling workflow, if the caller is one.
    fn calling_subagent(&self, ctx: &ToolContext) -> Option<JobId> {
        let workflow = self.workflows.get(&WorkflowId::new(ctx.workflow_id.as_str()))?;
        let name = workflow.agent_id.strip_prefix("subagent:")?;
        self.jobs
            .find_by_name(JobKind::Subagent, name)
            .map(|info| info.id)
    }

    fn owned(&self, request: SpawnRequest, ctx: &ToolContext) -> SpawnRequest {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        request.owner(
            non_empty(&ctx.user_id),
            non_empty(&ctx.channel_id),
            non_empty(&ctx.workflow_id).map(WorkflowId::new),
        )
    }

    fn list(&self, kind: JobKind) -> ToolResult {
        let jobs: Vec<Value> = self.jobs.list(Some(kind)).iter().map(summary).collect();
        ToolResult::ok(Value::Array(jobs))
    }
}

#[async_trait]
impl Tool for JobTool {
    fn schema(&self) -> ToolSchema {
        let name = ToolParameter::required("name", "string", "Unique name");
        let description = ToolParameter::optional("description", "string", "What it is for");
        let (summary, parameters) = match self.op {
            JobOp::SpawnSubagent => (
                "Start a background agent that works on a prompt, once or every interval_ms. \
                 It reports back only when it has something to say.",
                vec![
                    name,
                    ToolParameter::required("prompt", "string", "The agent's standing task"),
                    ToolParameter::optional(
                        "interval_ms",
                        "number",
                        "Run every this many milliseconds; 0 or omitted runs once",
                    ),
                    description,
                ],
            ),
            JobOp::ListSubagents => ("List background agents", Vec::new()),
            JobOp::DeleteSubagent => (
                "Stop and delete a background agent and everything it spawned",
                vec![name],
            ),
            JobOp::CreateTask => (
                "Create a task that runs a step program every interval_ms (0 runs once)",
                vec![
                    name,
                    ToolParameter::required("code", "string", CODE_HELP),
                    ToolParameter::required("interval_ms", "number", "Milliseconds between runs"),
                    description,
                ],
            ),
            JobOp::CreateSkill => (
                "Create a reusable skill: a step program run on demand with an input",
                vec![
                    name,
                    ToolParameter::required("code", "string", CODE_HELP),
                    description,
                ],
            ),
            JobOp::RunSkill => (
                "Run a skill and return its output",
                vec![
                    name,
                    ToolParameter::optional("input", "string", "Value for {{input}}"),
                ],
            ),
            JobOp::ListSkills => ("List skills", Vec::new()),
        };
        ToolSchema {
            name: self.op.name().to_string(),
            description: summary.to_string(),
            parameters,
            category: JOBS_CATEGORY.to_string(),
            permissions: Vec::new(),
        }
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let name = str_param(&params, "name");
        if ctx.dry_run && self.op.mutates() {
            return Ok(ToolResult::ok(format!(
                "dry run: would {} '{name}'",
                self.op.name().replace('_', " ")
            )));
        }
        let description = str_param(&params, "description");
        let interval_ms = params
            .get("interval_ms")
            .and_then(Value::as_u64)
            .unwrap_or(0);

        let result = match self.op {
            JobOp::SpawnSubagent => {
                let code = JobCode::Prompt {
                    prompt: str_param(&params, "prompt").to_string(),
                };
                let request = SpawnRequest::new(JobKind::Subagent, name, code)
                    .interval_ms(interval_ms)
                    .description(description)
                    .parent(self.calling_subagent(ctx));
                let info = self.jobs.spawn(self.owned(request, ctx)).await?;
                ToolResult::ok(format!(
                    "Spawned sub-agent '{}' ({}){}",
                    info.name,
                    info.id,
                    if info.runs_once() {
                        ", running once now".to_string()
                    } else {
                        format!(", running every {} ms", info.interval_ms)
                    }
                ))
            }
            JobOp::ListSubagents => self.list(JobKind::Subagent),
            JobOp::DeleteSubagent => {
                let info = self.jobs.resolve(JobKind::Subagent, name)?;
                let removed = self.jobs.delete(&info.id).await?;
                ToolResult::ok(format!(
                    "Deleted sub-agent '{}' and {} descendant(s)",
                    info.name,
                    removed.len().saturating_sub(1)
                ))
            }
            JobOp::CreateTask | JobOp::CreateSkill => {
                let code = match parse_code(params.get("code")) {
                    Ok(code) => code,
                    Err(e) => return Ok(ToolResult::fail(e)),
                };
                let (kind, request) = if self.op == JobOp::CreateTask {
                    let request = SpawnRequest::new(JobKind::Task, name, code).interval_ms(interval_ms);
                    (JobKind::Task, request)
                } else {
                    (JobKind::Skill, SpawnRequest::new(JobKind::Skill, name, code))
                };
                let request = request.description(description);
                let info = self.jobs.spawn(self.owned(request, ctx)).await?;
                ToolResult::ok(format!("Created {kind} '{}' ({})", info.name, info.id))
            }
            JobOp::RunSkill => {
                let output = self
                    .jobs
                    .run_skill(name, str_param(&params, "input"))
                    .await?;
                ToolResult::ok(output)
            }
            JobOp::ListSkills => self.list(JobKind::Skill),
        };
        Ok(result)
    }
}

#[cfg(test)]
#[path = "job_tools_tests.rs"]
mod tests;
