// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::orchestrator::OutcomeStatus;
use crate::test_helpers::OrchestratorFixture;
use wd_adapters::LlmCall;
use wd_core::test_support::tool_rule;
use wd_core::{IncomingMessage, PolicyAction, Role};

#[yare::parameterized(
    empty      = { "", true },
    blank      = { "  \n", true },
    object     = { r#"{"text": "hi"}"#, true },
    array      = { "[1, 2]", false },
    scalar     = { "42", false },
    malformed  = { r#"{"text": "#, false },
)]
fn argument_parsing(raw: &str, ok: bool) {
    let parsed = parse_arguments(raw);
    assert_eq!(parsed.is_ok(), ok, "{parsed:?}");
    if let Ok(value) = parsed {
        assert!(value.is_object());
    }
}

fn ask(content: &str) -> IncomingMessage {
    IncomingMessage::new(content, "ana", "cli")
}

/// Tool-role messages the model saw on a given call.
fn tool_messages(call: &LlmCall) -> Vec<String> {
    call.messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .filter_map(|m| m.content.clone())
        .collect()
}

fn echo_call(id: &str) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: "echo".to_string(),
        arguments: r#"{"text": "again"}"#.to_string(),
    }
}

#[tokio::test]
async fn tool_result_is_fed_back_to_the_model() {
    let fx = OrchestratorFixture::new().await;
    fx.llm
        .push_call("c1", "echo", r#"{"text": "pong"}"#)
        .push_text("The echo said pong.");

    let outcome = fx.orchestrator.handle_message(ask("ping")).await.unwrap();

    assert_eq!(outcome.status, OutcomeStatus::Completed);
    assert_eq!(outcome.content, "The echo said pong.");
    let calls = fx.llm.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].tool_names.contains(&"echo".to_string()));
    assert_eq!(tool_messages(&calls[1]), ["pong"]);
    assert!(calls[1]
        .messages
        .iter()
        .any(|m| m.role == Role::Assistant && m.tool_calls.len() == 1));

    let echoed = fx.echo_calls.lock();
    assert_eq!(echoed[0].1.user_id, "ana");
    assert_eq!(echoed[0].1.channel_id, "cli");
    assert_eq!(echoed[0].1.workflow_id, outcome.workflow_id.as_str());

    assert_eq!(fx.events(names::TOOL_EXECUTING).len(), 1);
    assert_eq!(fx.events(names::TOOL_COMPLETED)[0].payload["output"], "pong");
    let audit = fx.orchestrator.audit_log(10).await.unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].outcome, AuditOutcome::Success);
}

#[tokio::test]
async fn tool_calls_in_one_turn_run_in_order() {
    let fx = OrchestratorFixture::new().await;
    fx.llm
        .push(Completion::calls(vec![
            ToolCall {
                id: "c1".to_string(),
                name: "echo".to_string(),
                arguments: r#"{"text": "first"}"#.to_string(),
            },
            ToolCall {
                id: "c2".to_string(),
                name: "echo".to_string(),
                arguments: r#"{"text": "second"}"#.to_string(),
            },
        ]))
        .push_text("done");

    fx.orchestrator.handle_message(ask("go")).await.unwrap();

    let texts: Vec<Value> = fx.echo_calls.lock().iter().map(|(p, _)| p["text"].clone()).collect();
    assert_eq!(texts, [json!("first"), json!("second")]);
    assert_eq!(tool_messages(&fx.llm.calls()[1]), ["first", "second"]);
}

#[tokio::test]
async fn step_limit_stops_after_ten_rounds() {
    let fx = OrchestratorFixture::new().await;
    fx.llm.set_fallback(Completion::calls(vec![echo_call("c")]));

    let outcome = fx.orchestrator.handle_message(ask("loop forever")).await.unwrap();

    assert_eq!(outcome.status, OutcomeStatus::Completed);
    assert!(outcome.content.contains("step limit of 10"), "{}", outcome.content);
    assert_eq!(fx.echo_calls.lock().len(), MAX_ITERATIONS);
    let calls = fx.llm.calls();
    assert_eq!(calls.len(), MAX_ITERATIONS + 1);
    assert!(calls[MAX_ITERATIONS].tool_names.is_empty());
}

#[tokio::test]
async fn empty_answer_after_tools_gets_one_retry() {
    let fx = OrchestratorFixture::new().await;
    fx.llm
        .push_call("c1", "echo", r#"{"text": "42"}"#)
        .push_text("")
        .push_text("The answer is 42.");

    let outcome = fx.orchestrator.handle_message(ask("answer?")).await.unwrap();

    assert_eq!(outcome.content, "The answer is 42.");
    let retry = &fx.llm.calls()[2];
    assert!(retry.tool_names.is_empty());
    assert!(retry
        .messages
        .iter()
        .any(|m| m.content.as_deref() == Some(ANSWER_FROM_RESULTS)));
}

#[tokio::test]
async fn still_empty_after_tools_explains_itself() {
    let fx = OrchestratorFixture::new().await;
    fx.llm
        .push_call("c1", "echo", r#"{"text": "42"}"#)
        .push_text("")
        .push_text("   ");

    let outcome = fx.orchestrator.handle_message(ask("answer?")).await.unwrap();
    assert_eq!(
        outcome.content,
        "I ran 1 tool call(s) but the model did not summarize the results."
    );
}

#[tokio::test]
async fn length_cutoff_is_reported() {
    let fx = OrchestratorFixture::new().await;
    let cut = Completion {
        content: None,
        tool_calls: Vec::new(),
        finish_reason: FinishReason::Length,
    };
    fx.llm.push(cut.clone()).push(cut);

    let outcome = fx.orchestrator.handle_message(ask("write an essay")).await.unwrap();
    assert!(outcome.content.contains("cut off"), "{}", outcome.content);
}

#[tokio::test]
async fn empty_reply_without_tools_is_retried_then_explained() {
    let fx = OrchestratorFixture::new().await;
    fx.llm.push_text("").push_text("");

    let outcome = fx.orchestrator.handle_message(ask("hello?")).await.unwrap();
    assert_eq!(outcome.content, "The model returned no content.");
    assert_eq!(fx.llm.call_count(), 2);
}

#[tokio::test]
async fn upstream_error_is_retried_once() {
    let fx = OrchestratorFixture::new().await;
    fx.llm.push_error("overloaded").push_text("recovered");

    let outcome = fx.orchestrator.handle_message(ask("hi")).await.unwrap();
    assert_eq!(outcome.status, OutcomeStatus::Completed);
    assert_eq!(outcome.content, "recovered");
}

#[tokio::test]
async fn repeated_upstream_error_surfaces_as_agent_error() {
    let fx = OrchestratorFixture::new().await;
    fx.llm.push_error("overloaded").push_error("overloaded");

    let outcome = fx.orchestrator.handle_message(ask("hi")).await.unwrap();

    assert_eq!(outcome.status, OutcomeStatus::Error);
    assert!(outcome.content.contains("overloaded"), "{}", outcome.content);
    let errors = fx.events(names::AGENT_ERROR);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].payload["userId"], "ana");
    assert!(fx.events(names::AGENT_RESPONSE).is_empty());
    let workflow = fx.orchestrator.workflows().get(&outcome.workflow_id).unwrap();
    assert_eq!(workflow.status, wd_core::WorkflowStatus::Completed);
}

#[tokio::test]
async fn malformed_arguments_fail_without_running_the_tool() {
    let fx = OrchestratorFixture::new().await;
    fx.llm
        .push_call("c1", "echo", r#"{"text": "#)
        .push_text("sorry");

    fx.orchestrator.handle_message(ask("go")).await.unwrap();

    assert!(fx.echo_calls.lock().is_empty());
    let fed_back = tool_messages(&fx.llm.calls()[1]);
    assert!(fed_back[0].starts_with("Error: malformed tool arguments"), "{fed_back:?}");
}

#[tokio::test]
async fn unknown_tool_fails() {
    let fx = OrchestratorFixture::new().await;
    fx.llm.push_call("c1", "teleport", "{}").push_text("no such tool");

    fx.orchestrator.handle_message(ask("beam me up")).await.unwrap();

    assert_eq!(tool_messages(&fx.llm.calls()[1]), ["Error: unknown tool: teleport"]);
    assert!(fx.orchestrator.audit_log(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn invalid_parameters_are_rejected_and_audited() {
    let fx = OrchestratorFixture::new().await;
    fx.llm.push_call("c1", "strict", "{}").push_text("ok");

    fx.orchestrator.handle_message(ask("go")).await.unwrap();

    assert_eq!(
        tool_messages(&fx.llm.calls()[1]),
        ["Error: invalid parameters: text is required"]
    );
    assert!(fx.events(names::TOOL_EXECUTING).is_empty());
    let audit = fx.orchestrator.audit_log(10).await.unwrap();
    assert_eq!(audit[0].outcome, AuditOutcome::Failure);
}

#[tokio::test]
async fn failing_tool_emits_tool_error() {
    let fx = OrchestratorFixture::new().await;
    fx.llm.push_call("c1", "broken", "{}").push_text("it broke");

    fx.orchestrator.handle_message(ask("go")).await.unwrap();

    assert_eq!(fx.events(names::TOOL_ERROR)[0].payload["error"], "broken exploded");
    assert_eq!(tool_messages(&fx.llm.calls()[1]), ["Error: broken exploded"]);
}

#[tokio::test]
async fn denied_call_is_blocked_and_audited() {
    let fx = OrchestratorFixture::new().await;
    fx.orchestrator
        .policy()
        .add_rule(tool_rule("no-echo", PolicyAction::Deny, &["echo"], 500))
        .await
        .unwrap();
    fx.llm
        .push_call("c1", "echo", r#"{"text": "x"}"#)
        .push_text("blocked");

    fx.orchestrator.handle_message(ask("go")).await.unwrap();

    assert!(fx.echo_calls.lock().is_empty());
    let fed_back = tool_messages(&fx.llm.calls()[1]);
    assert!(fed_back[0].starts_with("Error: denied by rule 'no-echo'"), "{fed_back:?}");
    assert!(fx.events(names::TOOL_EXECUTING).is_empty());
    let audit = fx.orchestrator.audit_log(10).await.unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].outcome, AuditOutcome::Blocked);

    let decision = &fx.events(names::POLICY_DECISION)[0];
    assert_eq!(decision.payload["tool"], "echo");
    assert_eq!(decision.payload["allowed"], false);
}

#[tokio::test]
async fn confirmation_is_announced_and_the_call_proceeds() {
    let fx = OrchestratorFixture::new().await;
    fx.llm
        .push_call("c1", "download_file", r#"{"text": "report.pdf"}"#)
        .push_text("downloaded");

    fx.orchestrator.handle_message(ask("fetch it")).await.unwrap();

    let confirmations = fx.events(names::CONFIRMATION_REQUIRED);
    assert_eq!(confirmations.len(), 1);
    assert_eq!(confirmations[0].payload["ruleId"], "default-confirm-downloads");
    let outcomes: Vec<AuditOutcome> = fx
        .orchestrator
        .audit_log(10)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.outcome)
        .collect();
    assert_eq!(outcomes, [AuditOutcome::Confirmed, AuditOutcome::Success]);
    assert_eq!(fx.events(names::TOOL_COMPLETED).len(), 1);
}

#[tokio::test]
async fn tool_turns_are_stored_in_memory() {
    let fx = OrchestratorFixture::new().await;
    fx.llm
        .push_call("c1", "echo", r#"{"text": "remember me"}"#)
        .push_text("stored");

    let outcome = fx.orchestrator.handle_message(ask("go")).await.unwrap();

    let turns = fx
        .orchestrator
        .memory
        .recent(&outcome.workflow_id, HISTORY_WINDOW)
        .await
        .unwrap();
    let roles: Vec<Role> = turns.iter().map(|t| t.role).collect();
    assert_eq!(roles, [Role::User, Role::Tool, Role::Assistant]);
    assert_eq!(turns[1].content, "remember me");
}
