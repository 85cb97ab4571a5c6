// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conversation, status and history handlers.

use serde::Deserialize;
use serde_json::{json, Value};
use wd_core::{IncomingMessage, WorkflowId};

use super::dispatch::{parse, to_value, HandlerError};
use super::DaemonCtx;

/// Default number of audit entries returned.
const AUDIT_LIMIT: usize = 50;

/// Default number of events returned from history.
const EVENTS_LIMIT: usize = 100;

pub(super) async fn send_message(ctx: &DaemonCtx, params: Value) -> Result<Value, HandlerError> {
    let message: IncomingMessage = parse(params)?;
    if message.content.trim().is_empty() {
        return Err(HandlerError::InvalidParams("content is required".to_string()));
    }
    tracing::debug!(
        user_id = %message.user_id,
        channel_id = %message.channel_id,
        "message received"
    );
    let outcome = ctx.orchestrator.handle_message(message).await?;
    to_value(&outcome)
}

pub(super) fn status(ctx: &DaemonCtx) -> Value {
    let orchestrator = &ctx.orchestrator;
    json!({
        "running": true,
        "pid": std::process::id(),
        "uptime": ctx.start_time.elapsed().as_secs(),
        "channels": orchestrator.workflows().channels(),
        "plugins": orchestrator.tools().categories(),
        "tools": orchestrator.tools().len(),
        "activeWorkflows": orchestrator.workflows().active_count(),
        "model": orchestrator.has_model(),
        "jobs": orchestrator.scheduler().list(None).len(),
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemoryClearParams {
    #[serde(default)]
    workflow_id: Option<WorkflowId>,
}

pub(super) async fn memory_clear(ctx: &DaemonCtx, params: Value) -> Result<Value, HandlerError> {
    let MemoryClearParams { workflow_id } = parse(params)?;
    if let Some(id) = &workflow_id {
        if ctx.orchestrator.workflows().get(id).is_none() {
            return Err(wd_engine::OrchestratorError::WorkflowNotFound(id.to_string()).into());
        }
    }
    let cleared = ctx.orchestrator.clear_memory(workflow_id.as_ref()).await?;
    Ok(json!({ "cleared": cleared }))
}

#[derive(Deserialize)]
struct LimitParams {
    #[serde(default)]
    limit: Option<usize>,
}

pub(super) async fn audit_log(ctx: &DaemonCtx, params: Value) -> Result<Value, HandlerError> {
    let LimitParams { limit } = parse(params)?;
    let entries = ctx
        .orchestrator
        .audit_log(limit.unwrap_or(AUDIT_LIMIT))
        .await?;
    to_value(&entries)
}

#[derive(Deserialize)]
struct HistoryParams {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

pub(super) fn events_history(ctx: &DaemonCtx, params: Value) -> Result<Value, HandlerError> {
    let HistoryParams { name, limit } = parse(params)?;
    let events = ctx
        .orchestrator
        .bus()
        .history(name.as_deref(), Some(limit.unwrap_or(EVENTS_LIMIT)));
    to_value(&events)
}

#[cfg(test)]
#[path = "messages_tests.rs"]
mod tests;
