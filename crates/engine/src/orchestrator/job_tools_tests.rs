// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::error::JobError;
use crate::test_helpers::OrchestratorFixture;
use wd_core::{JobStatus, MAIN_AGENT};

const HOUR_MS: u64 = 3_600_000;

fn ctx(workflow_id: &str) -> ToolContext {
    ToolContext {
        workflow_id: workflow_id.to_string(),
        user_id: "ana".to_string(),
        channel_id: "cli".to_string(),
        dry_run: false,
    }
}

async fn call(fx: &OrchestratorFixture, tool: &str, params: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
    let tool = fx.orchestrator.tools().get(tool).unwrap();
    tool.execute(params, ctx).await
}

#[tokio::test]
async fn spawn_subagent_records_its_owner() {
    let fx = OrchestratorFixture::new().await;
    let result = call(
        &fx,
        "spawn_subagent",
        json!({"name": "disk", "prompt": "watch the disk", "interval_ms": HOUR_MS}),
        &ctx("wf-7"),
    )
    .await
    .unwrap();

    assert!(result.success);
    assert!(result.to_content().contains("running every 3600000 ms"));
    let job = fx
        .orchestrator
        .scheduler()
        .find_by_name(JobKind::Subagent, "disk")
        .unwrap();
    assert_eq!(job.user_id.as_deref(), Some("ana"));
    assert_eq!(job.channel_id.as_deref(), Some("cli"));
    assert_eq!(job.workflow_id, Some(WorkflowId::new("wf-7")));
    assert_eq!(job.parent_id, None);
}

#[tokio::test]
async fn subagent_spawned_by_subagent_links_parent() {
    let fx = OrchestratorFixture::new().await;
    call(
        &fx,
        "spawn_subagent",
        json!({"name": "disk", "prompt": "watch", "interval_ms": HOUR_MS}),
        &ctx("wf-main"),
    )
    .await
    .unwrap();
    let parent = fx
        .orchestrator
        .scheduler()
        .find_by_name(JobKind::Subagent, "disk")
        .unwrap();
    let disk_workflow = fx
        .orchestrator
        .workflows()
        .find_or_create("ana", "cli", "subagent:disk", None)
        .await
        .unwrap();

    call(
        &fx,
        "spawn_subagent",
        json!({"name": "inode", "prompt": "count inodes", "interval_ms": HOUR_MS}),
        &ctx(disk_workflow.id.as_str()),
    )
    .await
    .unwrap();

    let child = fx
        .orchestrator
        .scheduler()
        .find_by_name(JobKind::Subagent, "inode")
        .unwrap();
    assert_eq!(child.parent_id, Some(parent.id));
}

#[tokio::test]
async fn main_agent_spawns_have_no_parent() {
    let fx = OrchestratorFixture::new().await;
    let main = fx
        .orchestrator
        .workflows()
        .find_or_create("ana", "cli", MAIN_AGENT, None)
        .await
        .unwrap();
    call(
        &fx,
        "spawn_subagent",
        json!({"name": "disk", "prompt": "watch", "interval_ms": HOUR_MS}),
        &ctx(main.id.as_str()),
    )
    .await
    .unwrap();
    let job = fx
        .orchestrator
        .scheduler()
        .find_by_name(JobKind::Subagent, "disk")
        .unwrap();
    assert_eq!(job.parent_id, None);
}

#[tokio::test]
async fn list_and_delete_subagents() {
    let fx = OrchestratorFixture::new().await;
    for name in ["a", "b"] {
        call(
            &fx,
            "spawn_subagent",
            json!({"name": name, "prompt": "watch", "interval_ms": HOUR_MS}),
            &ctx("wf-1"),
        )
        .await
        .unwrap();
    }

    let listed = call(&fx, "list_subagents", json!({}), &ctx("wf-1")).await.unwrap();
    let names: Vec<&str> = listed
        .output
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|j| j["name"].as_str())
        .collect();
    assert_eq!(names, ["a", "b"]);
    assert_eq!(listed.output[0]["status"], "running");

    let deleted = call(&fx, "delete_subagent", json!({"name": "a"}), &ctx("wf-1"))
        .await
        .unwrap();
    assert_eq!(deleted.to_content(), "Deleted sub-agent 'a' and 0 descendant(s)");
    assert_eq!(fx.orchestrator.scheduler().list(None).len(), 1);

    let missing = call(&fx, "delete_subagent", json!({"name": "a"}), &ctx("wf-1")).await;
    assert!(matches!(missing, Err(ToolError::Job(JobError::NotFound(_)))));
}

#[tokio::test]
async fn create_task_accepts_text_or_object_code() {
    let fx = OrchestratorFixture::new().await;
    let as_text = r#"{"steps": [{"call": "echo", "params": {"text": "tick"}}]}"#;
    call(
        &fx,
        "create_task",
        json!({"name": "ticker", "code": as_text, "interval_ms": HOUR_MS}),
        &ctx("wf-1"),
    )
    .await
    .unwrap();
    call(
        &fx,
        "create_task",
        json!({"name": "bare", "code": [{"call": "echo"}], "interval_ms": HOUR_MS}),
        &ctx("wf-1"),
    )
    .await
    .unwrap();

    let tasks = fx.orchestrator.scheduler().list(Some(JobKind::Task));
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].interval_ms, HOUR_MS);
    assert_eq!(tasks[0].status, JobStatus::Running);
}

#[tokio::test]
async fn bad_code_fails_without_creating() {
    let fx = OrchestratorFixture::new().await;
    let result = call(
        &fx,
        "create_skill",
        json!({"name": "broken", "code": "not json"}),
        &ctx("wf-1"),
    )
    .await
    .unwrap();
    assert!(!result.success);
    assert!(result.error.unwrap().starts_with("invalid step program"));
    assert!(fx.orchestrator.scheduler().list(None).is_empty());
}

#[tokio::test]
async fn skills_are_created_run_and_listed() {
    let fx = OrchestratorFixture::new().await;
    call(
        &fx,
        "create_skill",
        json!({
            "name": "greet",
            "code": {"steps": [{"call": "echo", "params": {"text": "hello {{input}}"}}]},
            "description": "say hello",
        }),
        &ctx("wf-1"),
    )
    .await
    .unwrap();

    let ran = call(&fx, "run_skill", json!({"name": "greet", "input": "ana"}), &ctx("wf-1"))
        .await
        .unwrap();
    assert_eq!(ran.to_content(), "hello ana");

    let listed = call(&fx, "list_skills", json!({}), &ctx("wf-1")).await.unwrap();
    assert_eq!(listed.output[0]["description"], "say hello");
    assert_eq!(listed.output[0]["runCount"], 1);
}

#[tokio::test]
async fn duplicate_name_is_an_error() {
    let fx = OrchestratorFixture::new().await;
    let params = json!({"name": "greet", "code": [{"call": "echo"}]});
    call(&fx, "create_skill", params.clone(), &ctx("wf-1")).await.unwrap();
    let err = call(&fx, "create_skill", params, &ctx("wf-1")).await.unwrap_err();
    assert!(matches!(err, ToolError::Job(JobError::DuplicateName { .. })));
}

#[tokio::test]
async fn dry_run_changes_nothing() {
    let fx = OrchestratorFixture::new().await;
    let dry = ToolContext {
        dry_run: true,
        ..ctx("wf-1")
    };
    let result = call(
        &fx,
        "spawn_subagent",
        json!({"name": "disk", "prompt": "watch"}),
        &dry,
    )
    .await
    .unwrap();
    assert_eq!(result.to_content(), "dry run: would spawn subagent 'disk'");
    assert!(fx.orchestrator.scheduler().list(None).is_empty());

    // Listing is read-only, so it still answers.
    let listed = call(&fx, "list_skills", json!({}), &dry).await.unwrap();
    assert_eq!(listed.output, json!([]));
}
