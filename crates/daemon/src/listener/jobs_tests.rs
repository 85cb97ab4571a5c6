// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::test_helpers::TestDaemon;
use serde_json::{json, Value};

fn echo_program() -> Value {
    json!({"steps": [{"call": "echo", "params": {"text": "{{input}}!"}}]})
}

#[tokio::test(start_paused = true)]
async fn subagent_pause_resume_delete_by_name() {
    let daemon = TestDaemon::without_model().await;
    let spawned = daemon
        .call(
            "subagent_spawn",
            json!({"name": "disk", "prompt": "watch disk usage", "intervalMs": 60_000}),
        )
        .await
        .unwrap();
    assert_eq!(spawned["status"], "running");
    assert_eq!(spawned["kind"], "subagent");
    assert_eq!(spawned["intervalMs"], 60_000);

    let listed = daemon.call("subagent_list", Value::Null).await.unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let paused = daemon
        .call("subagent_pause", json!({"id": "disk"}))
        .await
        .unwrap();
    assert_eq!(paused["status"], "paused");

    let err = daemon
        .call("subagent_pause", json!({"id": "disk"}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), 400);

    let resumed = daemon
        .call("subagent_resume", json!({"id": spawned["id"]}))
        .await
        .unwrap();
    assert_eq!(resumed["status"], "running");

    let deleted = daemon
        .call("subagent_delete", json!({"id": "disk"}))
        .await
        .unwrap();
    assert_eq!(deleted, json!({"deleted": [spawned["id"]]}));
    let listed = daemon.call("subagent_list", Value::Null).await.unwrap();
    assert_eq!(listed, json!([]));
}

#[tokio::test(start_paused = true)]
async fn deleting_a_parent_removes_children_first() {
    let daemon = TestDaemon::without_model().await;
    let parent = daemon
        .call(
            "subagent_spawn",
            json!({"name": "lead", "prompt": "coordinate", "intervalMs": 60_000}),
        )
        .await
        .unwrap();
    let child = daemon
        .call(
            "subagent_spawn",
            json!({"name": "helper", "prompt": "assist", "intervalMs": 60_000, "parentId": "lead"}),
        )
        .await
        .unwrap();
    assert_eq!(child["parentId"], parent["id"]);

    let deleted = daemon
        .call("subagent_delete", json!({"id": "lead"}))
        .await
        .unwrap();
    assert_eq!(deleted, json!({"deleted": [child["id"], parent["id"]]}));
}

#[tokio::test]
async fn spawn_with_unknown_parent_is_not_found() {
    let daemon = TestDaemon::without_model().await;
    let err = daemon
        .call(
            "subagent_spawn",
            json!({"name": "orphan", "prompt": "hi", "parentId": "ghost"}),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), 404);
}

#[tokio::test]
async fn spawn_requires_a_prompt() {
    let daemon = TestDaemon::without_model().await;
    let err = daemon
        .call("subagent_spawn", json!({"name": "mute"}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), 400);
}

#[tokio::test(start_paused = true)]
async fn task_create_validates_code_and_names() {
    let daemon = TestDaemon::without_model().await;
    let created = daemon
        .call(
            "task_create",
            json!({"name": "ping", "code": echo_program().to_string(), "intervalMs": 30_000}),
        )
        .await
        .unwrap();
    assert_eq!(created["kind"], "task");
    assert_eq!(created["status"], "running");

    let err = daemon
        .call(
            "task_create",
            json!({"name": "ping", "code": echo_program(), "intervalMs": 30_000}),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), 400);

    let err = daemon
        .call(
            "task_create",
            json!({"name": "broken", "code": "print('hi')", "intervalMs": 30_000}),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), 400);
    assert!(err.to_string().contains("invalid step program"));
}

#[tokio::test(start_paused = true)]
async fn task_start_requires_a_stopped_task() {
    let daemon = TestDaemon::without_model().await;
    daemon
        .call(
            "task_create",
            json!({"name": "ping", "code": echo_program(), "intervalMs": 30_000}),
        )
        .await
        .unwrap();

    let err = daemon
        .call("task_start", json!({"id": "ping"}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), 400);

    let paused = daemon.call("task_pause", json!({"id": "ping"})).await.unwrap();
    assert_eq!(paused["status"], "paused");
    let listed = daemon.call("task_list", Value::Null).await.unwrap();
    assert_eq!(listed[0]["status"], "paused");
}

#[tokio::test]
async fn skills_run_on_demand() {
    let daemon = TestDaemon::without_model().await;
    let created = daemon
        .call(
            "skill_create",
            json!({"name": "shout", "code": echo_program(), "description": "adds emphasis"}),
        )
        .await
        .unwrap();
    assert_eq!(created["kind"], "skill");
    assert_eq!(created["intervalMs"], 0);

    let result = daemon
        .call("skill_run", json!({"name": "shout", "input": "hello"}))
        .await
        .unwrap();
    assert_eq!(result, json!({"output": "hello!"}));

    let skills = daemon.call("skill_list", Value::Null).await.unwrap();
    assert_eq!(skills[0]["runCount"], 1);

    daemon
        .call("skill_delete", json!({"id": "shout"}))
        .await
        .unwrap();
    let err = daemon
        .call("skill_run", json!({"name": "shout"}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), 404);
}

#[tokio::test]
async fn kinds_do_not_resolve_each_other() {
    let daemon = TestDaemon::without_model().await;
    daemon
        .call("skill_create", json!({"name": "shared", "code": echo_program()}))
        .await
        .unwrap();

    let err = daemon
        .call("task_pause", json!({"id": "shared"}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), 404);
}
