// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Method routing and the handler error boundary.

use std::future::Future;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use wd_core::JobKind;
use wd_engine::{JobError, OrchestratorError, PolicyError};

use super::{jobs, messages, policy, DaemonCtx};
use crate::protocol::{codes, AUTH_METHOD};

/// Errors a method handler reports back to the client as `{error: {code, message}}`.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error("handler timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    pub fn code(&self) -> u16 {
        match self {
            HandlerError::InvalidParams(_) | HandlerError::BadRequest(_) => codes::BAD_REQUEST,
            HandlerError::UnknownMethod(_) => codes::NOT_FOUND,
            HandlerError::Timeout(_) => codes::TIMEOUT,
            HandlerError::Policy(e) => match e {
                PolicyError::RuleNotFound(_) => codes::NOT_FOUND,
                PolicyError::DuplicateRule(_) | PolicyError::InvalidRule(_) => codes::BAD_REQUEST,
                PolicyError::Storage(_) | PolicyError::CorruptRule { .. } => codes::INTERNAL,
            },
            HandlerError::Job(e) => match e {
                JobError::NotFound(_) | JobError::ParentNotFound(_) => codes::NOT_FOUND,
                JobError::DuplicateName { .. }
                | JobError::InvalidState { .. }
                | JobError::Invalid(_)
                | JobError::DepthExceeded(_) => codes::BAD_REQUEST,
                JobError::Execution(_)
                | JobError::Cancelled
                | JobError::HostUnavailable
                | JobError::Storage(_) => codes::INTERNAL,
            },
            HandlerError::Orchestrator(OrchestratorError::WorkflowNotFound(_)) => {
                codes::NOT_FOUND
            }
            HandlerError::Orchestrator(_) | HandlerError::Internal(_) => codes::INTERNAL,
        }
    }
}

/// Route one authenticated request to its handler.
pub async fn dispatch(ctx: &DaemonCtx, method: &str, params: Value) -> Result<Value, HandlerError> {
    match method {
        "ping" => Ok(json!({ "pong": true })),
        "status" => Ok(messages::status(ctx)),
        "shutdown" => {
            tracing::info!("shutdown requested over IPC");
            ctx.shutdown.notify_one();
            Ok(json!({ "shuttingDown": true }))
        }
        AUTH_METHOD => Err(HandlerError::BadRequest(
            "connection is already authenticated".to_string(),
        )),

        "send_message" => messages::send_message(ctx, params).await,
        "list_workflows" => to_value(&ctx.orchestrator.workflows().list()),
        "list_tools" => to_value(&ctx.orchestrator.tools().schemas()),
        "memory_clear" => messages::memory_clear(ctx, params).await,
        "audit_log" => messages::audit_log(ctx, params).await,
        "events_history" => messages::events_history(ctx, params),

        "policy_list" => policy::list(ctx, params),
        "policy_get" => policy::get(ctx, params),
        "policy_add" => policy::add(ctx, params).await,
        "policy_remove" => policy::remove(ctx, params).await,
        "policy_update" => policy::update(ctx, params).await,
        "policy_evaluate" => policy::evaluate(ctx, params),

        "subagent_list" => jobs::list(ctx, JobKind::Subagent),
        "subagent_spawn" => jobs::spawn_subagent(ctx, params).await,
        "subagent_pause" => jobs::pause(ctx, JobKind::Subagent, params),
        "subagent_resume" => jobs::resume(ctx, JobKind::Subagent, params),
        "subagent_delete" => jobs::delete(ctx, JobKind::Subagent, params).await,

        "task_list" => jobs::list(ctx, JobKind::Task),
        "task_create" => jobs::create(ctx, JobKind::Task, params).await,
        "task_start" => jobs::start(ctx, JobKind::Task, params),
        "task_pause" => jobs::pause(ctx, JobKind::Task, params),
        "task_resume" => jobs::resume(ctx, JobKind::Task, params),
        "task_delete" => jobs::delete(ctx, JobKind::Task, params).await,

        "skill_list" => jobs::list(ctx, JobKind::Skill),
        "skill_create" => jobs::create(ctx, JobKind::Skill, params).await,
        "skill_run" => jobs::run_skill(ctx, params).await,
        "skill_delete" => jobs::delete(ctx, JobKind::Skill, params).await,

        other => Err(HandlerError::UnknownMethod(other.to_string())),
    }
}

/// Bound a handler by `limit`, reporting expiry as [`HandlerError::Timeout`].
pub async fn run_with_timeout<F>(limit: Duration, handler: F) -> Result<Value, HandlerError>
where
    F: Future<Output = Result<Value, HandlerError>>,
{
    match tokio::time::timeout(limit, handler).await {
        Ok(result) => result,
        Err(_) => Err(HandlerError::Timeout(limit)),
    }
}

/// Deserialize params, treating absent params as an empty object.
pub(super) fn parse<T: DeserializeOwned>(params: Value) -> Result<T, HandlerError> {
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params).map_err(|e| HandlerError::InvalidParams(e.to_string()))
}

pub(super) fn to_value<T: Serialize>(value: &T) -> Result<Value, HandlerError> {
    serde_json::to_value(value).map_err(|e| HandlerError::Internal(e.to_string()))
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
