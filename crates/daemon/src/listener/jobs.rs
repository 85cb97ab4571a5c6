// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sub-agent, task and skill handlers.
//!
//! Every targeted operation takes `{id}`, which may also be the job's name.

use serde::Deserialize;
use serde_json::{json, Value};
use wd_core::{JobCode, JobId, JobKind};
use wd_engine::SpawnRequest;

use super::dispatch::{parse, to_value, HandlerError};
use super::DaemonCtx;

#[derive(Deserialize)]
struct TargetParams {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpawnParams {
    name: String,
    prompt: String,
    #[serde(default)]
    interval_ms: u64,
    #[serde(default)]
    description: String,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    channel_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateParams {
    name: String,
    code: Value,
    #[serde(default)]
    interval_ms: u64,
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
struct RunParams {
    name: String,
    #[serde(default)]
    input: String,
}

pub(super) fn list(ctx: &DaemonCtx, kind: JobKind) -> Result<Value, HandlerError> {
    to_value(&ctx.orchestrator.scheduler().list(Some(kind)))
}

pub(super) async fn spawn_subagent(ctx: &DaemonCtx, params: Value) -> Result<Value, HandlerError> {
    let params: SpawnParams = parse(params)?;
    let scheduler = ctx.orchestrator.scheduler();
    let parent = match params.parent_id.as_deref() {
        Some(parent) => Some(scheduler.resolve(JobKind::Subagent, parent)?.id),
        None => None,
    };
    let request = SpawnRequest::new(
        JobKind::Subagent,
        params.name,
        JobCode::Prompt {
            prompt: params.prompt,
        },
    )
    .interval_ms(params.interval_ms)
    .description(params.description)
    .parent(parent)
    .owner(params.user_id, params.channel_id, None);
    let info = scheduler.spawn(request).await?;
    to_value(&info)
}

pub(super) async fn create(
    ctx: &DaemonCtx,
    kind: JobKind,
    params: Value,
) -> Result<Value, HandlerError> {
    let params: CreateParams = parse(params)?;
    let code = JobCode::script_from_value(&params.code)
        .map_err(|e| HandlerError::InvalidParams(format!("invalid step program: {e}")))?;
    let mut request = SpawnRequest::new(kind, params.name, code).description(params.description);
    if !kind.is_on_demand() {
        request = request.interval_ms(params.interval_ms);
    }
    let info = ctx.orchestrator.scheduler().spawn(request).await?;
    to_value(&info)
}

pub(super) fn start(ctx: &DaemonCtx, kind: JobKind, params: Value) -> Result<Value, HandlerError> {
    let id = target(ctx, kind, params)?;
    to_value(&ctx.orchestrator.scheduler().start(&id)?)
}

pub(super) fn pause(ctx: &DaemonCtx, kind: JobKind, params: Value) -> Result<Value, HandlerError> {
    let id = target(ctx, kind, params)?;
    to_value(&ctx.orchestrator.scheduler().pause(&id)?)
}

pub(super) fn resume(ctx: &DaemonCtx, kind: JobKind, params: Value) -> Result<Value, HandlerError> {
    let id = target(ctx, kind, params)?;
    to_value(&ctx.orchestrator.scheduler().resume(&id)?)
}

pub(super) async fn delete(
    ctx: &DaemonCtx,
    kind: JobKind,
    params: Value,
) -> Result<Value, HandlerError> {
    let id = target(ctx, kind, params)?;
    let removed = ctx.orchestrator.scheduler().delete(&id).await?;
    let ids: Vec<&JobId> = removed.iter().map(|info| &info.id).collect();
    Ok(json!({ "deleted": ids }))
}

pub(super) async fn run_skill(ctx: &DaemonCtx, params: Value) -> Result<Value, HandlerError> {
    let RunParams { name, input } = parse(params)?;
    let output = ctx.orchestrator.scheduler().run_skill(&name, &input).await?;
    Ok(json!({ "output": output }))
}

fn target(ctx: &DaemonCtx, kind: JobKind, params: Value) -> Result<JobId, HandlerError> {
    let TargetParams { id } = parse(params)?;
    Ok(ctx.orchestrator.scheduler().resolve(kind, &id)?.id)
}

#[cfg(test)]
#[path = "jobs_tests.rs"]
mod tests;
