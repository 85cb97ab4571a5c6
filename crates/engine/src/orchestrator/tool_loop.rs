// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The tool-calling loop shared by interactive and background agent runs.

use super::prompt::{self, ANSWER_FROM_RESULTS, SILENT};
use super::{CallContext, Orchestrator};
use crate::error::OrchestratorError;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wd_adapters::{ChatMessage, Completion, FinishReason, LlmClient, ToolCall};
use wd_core::{
    names, AuditOutcome, PolicyRequest, ToolContext, ToolResult, ToolSchema, Turn,
};

/// Model rounds per run before the loop gives up asking for tools.
pub const MAX_ITERATIONS: usize = 10;

/// Stored turns replayed into each run.
pub const HISTORY_WINDOW: usize = 20;

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LoopOutcome {
    Reply(String),
    /// Background run with nothing to report.
    Silent,
}

/// Why a run produced no text, used to pick the fallback reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exhaustion {
    StepLimit,
    Length,
    ToolsOnly(usize),
    NoContent,
}

impl Exhaustion {
    fn message(self) -> String {
        match self {
            Exhaustion::StepLimit => format!(
                "I stopped after reaching the step limit of {MAX_ITERATIONS} tool rounds \
                 without a final answer. Ask me to continue if you need more."
            ),
            Exhaustion::Length => {
                "The model's reply was cut off by its length limit before it produced an answer."
                    .to_string()
            }
            Exhaustion::ToolsOnly(count) => format!(
                "I ran {count} tool call(s) but the model did not summarize the results."
            ),
            Exhaustion::NoContent => "The model returned no content.".to_string(),
        }
    }
}

/// Parse model-supplied arguments. Blank means no arguments.
pub(crate) fn parse_arguments(raw: &str) -> Result<Value, String> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err("tool arguments must be a JSON object".to_string()),
        Err(e) => Err(format!("malformed tool arguments: {e}")),
    }
}

impl Orchestrator {
    /// Drive the model until it answers without tool calls.
    ///
    /// `assignment` is the sub-agent's task; `None` is an interactive run.
    pub(crate) async fn run_loop(
        &self,
        llm: &Arc<dyn LlmClient>,
        ctx: &CallContext,
        assignment: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<LoopOutcome, OrchestratorError> {
        let background = assignment.is_some();
        let schemas = self.tools.schemas();
        let history = self.memory.recent(&ctx.workflow_id, HISTORY_WINDOW).await?;

        let mut messages = vec![ChatMessage::system(prompt::system_prompt(
            &schemas, assignment,
        ))];
        messages.extend(prompt::render_history(&history));
        if let Some(task) = assignment {
            messages.push(ChatMessage::user(task));
        }

        let mut tools_ran = 0;
        let mut capped = true;
        let mut finish = FinishReason::Stop;
        for _ in 0..MAX_ITERATIONS {
            let completion = self
                .complete(llm, &messages, &schemas, !background, cancel)
                .await?;
            finish = completion.finish_reason;
            if completion.tool_calls.is_empty() {
                let text = completion.text_content();
                if !text.is_empty() {
                    return Ok(settle_reply(text, background));
                }
                capped = false;
                break;
            }

            messages.push(ChatMessage::assistant_calls(
                completion.content.clone(),
                completion.tool_calls.clone(),
            ));
            for call in &completion.tool_calls {
                if cancel.is_cancelled() {
                    return Err(OrchestratorError::Cancelled);
                }
                let content = self.run_call(call, ctx).await.to_content();
                messages.push(ChatMessage::tool(&call.id, &content));
                self.memory
                    .append(
                        &ctx.workflow_id,
                        Turn::tool(&call.id, &call.name, content, self.clock.epoch_ms()),
                    )
                    .await?;
                tools_ran += 1;
            }
        }

        if background && tools_ran == 0 {
            return Ok(LoopOutcome::Silent);
        }

        // One more round with no tools offered.
        tracing::debug!(
            workflow_id = %ctx.workflow_id,
            tools_ran,
            capped,
            "empty reply; retrying without tools"
        );
        if tools_ran > 0 {
            messages.push(ChatMessage::system(ANSWER_FROM_RESULTS));
        }
        let retry = self.complete(llm, &messages, &[], !background, cancel).await?;
        let text = retry.text_content();
        if !text.is_empty() {
            return Ok(settle_reply(text, background));
        }
        if background {
            return Ok(LoopOutcome::Silent);
        }

        let cause = if capped {
            Exhaustion::StepLimit
        } else if finish == FinishReason::Length || retry.finish_reason == FinishReason::Length {
            Exhaustion::Length
        } else if tools_ran > 0 {
            Exhaustion::ToolsOnly(tools_ran)
        } else {
            Exhaustion::NoContent
        };
        tracing::warn!(workflow_id = %ctx.workflow_id, ?cause, "model produced no answer");
        Ok(LoopOutcome::Reply(cause.message()))
    }

    /// One model request, retried once on failure when `retry` is set.
    async fn complete(
        &self,
        llm: &Arc<dyn LlmClient>,
        messages: &[ChatMessage],
        tools: &[ToolSchema],
        retry: bool,
        cancel: &CancellationToken,
    ) -> Result<Completion, OrchestratorError> {
        let attempts = if retry { 2 } else { 1 };
        let mut attempt = 1;
        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(OrchestratorError::Cancelled),
                result = llm.complete(messages, tools) => result,
            };
            match result {
                Ok(completion) => return Ok(completion),
                Err(e) if attempt < attempts => {
                    tracing::warn!(attempt, error = %e, "model request failed; retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn run_call(&self, call: &ToolCall, ctx: &CallContext) -> ToolResult {
        match parse_arguments(&call.arguments) {
            Ok(params) => self.execute_tool(&call.name, params, ctx).await,
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "rejected tool call");
                ToolResult::fail(e)
            }
        }
    }

    /// Run one tool under policy: evaluate, audit, validate, execute.
    pub async fn execute_tool(&self, name: &str, params: Value, ctx: &CallContext) -> ToolResult {
        let Some(tool) = self.tools.get(name) else {
            return ToolResult::fail(format!("unknown tool: {name}"));
        };

        let request = PolicyRequest {
            user_id: Some(ctx.user_id.clone()),
            channel_id: Some(ctx.channel_id.clone()),
            workflow_id: Some(ctx.workflow_id.to_string()),
            agent_id: Some(ctx.agent_id.clone()),
            ..PolicyRequest::execute(name, params.clone())
        };
        let decision = self.policy.evaluate(&request);
        if !decision.allowed {
            tracing::info!(tool = name, agent_id = %ctx.agent_id, reason = %decision.reason, "tool call blocked");
            self.audit
                .record(ctx, name, &params, AuditOutcome::Blocked, Some(decision.reason.clone()))
                .await;
            return ToolResult::fail(decision.reason);
        }
        if decision.requires_confirmation() {
            self.bus.emit(
                names::CONFIRMATION_REQUIRED,
                json!({
                    "tool": name,
                    "parameters": params,
                    "workflowId": ctx.workflow_id,
                    "userId": ctx.user_id,
                    "channelId": ctx.channel_id,
                    "agentId": ctx.agent_id,
                    "ruleId": decision.rule.as_ref().map(|r| r.id.clone()),
                    "reason": decision.reason,
                }),
            );
            self.audit
                .record(ctx, name, &params, AuditOutcome::Confirmed, Some(decision.reason.clone()))
                .await;
        }

        let mut errors = tool.schema().missing_required(&params);
        if let Some(validation) = tool.validate(&params) {
            if !validation.valid {
                errors.extend(validation.errors);
            }
        }
        if !errors.is_empty() {
            let error = format!("invalid parameters: {}", errors.join("; "));
            self.audit
                .record(ctx, name, &params, AuditOutcome::Failure, Some(error.clone()))
                .await;
            return ToolResult::fail(error);
        }

        self.bus.emit(
            names::TOOL_EXECUTING,
            json!({
                "tool": name,
                "parameters": params,
                "workflowId": ctx.workflow_id,
                "agentId": ctx.agent_id,
            }),
        );
        let tool_ctx = ToolContext {
            workflow_id: ctx.workflow_id.to_string(),
            user_id: ctx.user_id.clone(),
            channel_id: ctx.channel_id.clone(),
            dry_run: false,
        };
        let result = match tool.execute(params.clone(), &tool_ctx).await {
            Ok(result) => result,
            Err(e) => ToolResult::fail(e.to_string()),
        };

        if result.success {
            tracing::info!(tool = name, workflow_id = %ctx.workflow_id, "tool completed");
            self.bus.emit(
                names::TOOL_COMPLETED,
                json!({
                    "tool": name,
                    "workflowId": ctx.workflow_id,
                    "agentId": ctx.agent_id,
                    "output": result.output,
                }),
            );
            self.audit
                .record(ctx, name, &params, AuditOutcome::Success, None)
                .await;
        } else {
            tracing::warn!(tool = name, workflow_id = %ctx.workflow_id, error = ?result.error, "tool failed");
            self.bus.emit(
                names::TOOL_ERROR,
                json!({
                    "tool": name,
                    "workflowId": ctx.workflow_id,
                    "agentId": ctx.agent_id,
                    "error": result.error,
                }),
            );
            self.audit
                .record(ctx, name, &params, AuditOutcome::Failure, result.error.clone())
                .await;
        }
        result
    }
}

fn settle_reply(text: &str, background: bool) -> LoopOutcome {
    if background && text.eq_ignore_ascii_case(SILENT) {
        LoopOutcome::Silent
    } else {
        LoopOutcome::Reply(text.to_string())
    }
}

#[cfg(test)]
#[path = "tool_loop_tests.rs"]
mod tests;
