// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Policy rule administration handlers.

use serde::Deserialize;
use serde_json::Value;
use wd_core::{PolicyRequest, PolicyRule, PolicyRulePatch};
use wd_engine::{PolicyError, RuleFilter};

use super::dispatch::{parse, to_value, HandlerError};
use super::DaemonCtx;

#[derive(Deserialize)]
struct IdParams {
    id: String,
}

#[derive(Deserialize)]
struct AddParams {
    rule: Value,
}

#[derive(Deserialize)]
struct UpdateParams {
    id: String,
    #[serde(flatten)]
    patch: PolicyRulePatch,
}

#[derive(Deserialize)]
struct EvaluateParams {
    request: PolicyRequest,
}

pub(super) fn list(ctx: &DaemonCtx, params: Value) -> Result<Value, HandlerError> {
    let filter: RuleFilter = parse(params)?;
    to_value(&ctx.orchestrator.policy().list_rules(&filter))
}

pub(super) fn get(ctx: &DaemonCtx, params: Value) -> Result<Value, HandlerError> {
    let IdParams { id } = parse(params)?;
    let rule = ctx
        .orchestrator
        .policy()
        .get_rule(&id)
        .ok_or(PolicyError::RuleNotFound(id))?;
    to_value(&rule)
}

pub(super) async fn add(ctx: &DaemonCtx, params: Value) -> Result<Value, HandlerError> {
    let AddParams { mut rule } = parse(params)?;
    // The engine assigns an id when none is given.
    if let Some(fields) = rule.as_object_mut() {
        fields
            .entry("id")
            .or_insert_with(|| Value::String(String::new()));
    }
    let rule: PolicyRule = parse(rule)?;
    let added = ctx.orchestrator.policy().add_rule(rule).await?;
    to_value(&added)
}

pub(super) async fn remove(ctx: &DaemonCtx, params: Value) -> Result<Value, HandlerError> {
    let IdParams { id } = parse(params)?;
    let removed = ctx.orchestrator.policy().remove_rule(&id).await?;
    to_value(&removed)
}

pub(super) async fn update(ctx: &DaemonCtx, params: Value) -> Result<Value, HandlerError> {
    let UpdateParams { id, patch } = parse(params)?;
    let updated = ctx.orchestrator.policy().update_rule(&id, patch).await?;
    to_value(&updated)
}

pub(super) fn evaluate(ctx: &DaemonCtx, params: Value) -> Result<Value, HandlerError> {
    let EvaluateParams { request } = parse(params)?;
    to_value(&ctx.orchestrator.policy().evaluate(&request))
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
