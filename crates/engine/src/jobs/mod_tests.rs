// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{settle, SchedulerFixture};
use serde_json::json;
use wd_core::test_support::script;

fn task(name: &str, interval_ms: u64, steps: &[(&str, Value)]) -> SpawnRequest {
    SpawnRequest::new(JobKind::Task, name, script(steps)).interval_ms(interval_ms)
}

fn echo(text: &str) -> (&'static str, Value) {
    ("echo", json!({ "text": text }))
}

fn skill(name: &str, steps: &[(&str, Value)]) -> SpawnRequest {
    SpawnRequest::new(JobKind::Skill, name, script(steps))
}

fn subagent(name: &str, interval_ms: u64) -> SpawnRequest {
    SpawnRequest::new(
        JobKind::Subagent,
        name,
        JobCode::Prompt {
            prompt: format!("check {name}"),
        },
    )
    .interval_ms(interval_ms)
}

async fn advance(ms: u64) {
    tokio::time::advance(Duration::from_millis(ms)).await;
    settle().await;
}

#[tokio::test(start_paused = true)]
async fn interval_zero_runs_exactly_once() {
    let fx = SchedulerFixture::new();
    let info = fx
        .scheduler
        .spawn(task("watcher", 0, &[echo("hi")]))
        .await
        .unwrap();
    settle().await;

    let after = fx.scheduler.get(&info.id).unwrap();
    assert_eq!(after.run_count, 1);
    assert!(after.last_run_at.is_some());
    assert_eq!(after.status, JobStatus::Running);

    advance(3_600_000).await;
    assert_eq!(fx.scheduler.get(&info.id).unwrap().run_count, 1);
}

#[tokio::test(start_paused = true)]
async fn interval_job_runs_after_each_interval() {
    let fx = SchedulerFixture::new();
    let info = fx
        .scheduler
        .spawn(task("poller", 1_000, &[echo("tick")]))
        .await
        .unwrap();
    settle().await;
    assert_eq!(fx.scheduler.get(&info.id).unwrap().run_count, 0);

    advance(999).await;
    assert_eq!(fx.scheduler.get(&info.id).unwrap().run_count, 0);
    advance(1).await;
    assert_eq!(fx.scheduler.get(&info.id).unwrap().run_count, 1);
    advance(1_000).await;
    assert_eq!(fx.scheduler.get(&info.id).unwrap().run_count, 2);

    let executed = fx.bus.history(Some("task:executed"), None);
    assert_eq!(executed.len(), 2);
    assert_eq!(executed[1].payload["output"], "tick");
}

#[tokio::test]
async fn names_are_unique_per_kind() {
    let fx = SchedulerFixture::new();
    fx.scheduler
        .spawn(skill("digest", &[echo("a")]))
        .await
        .unwrap();
    let err = fx
        .scheduler
        .spawn(skill("digest", &[echo("b")]))
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::DuplicateName { kind: JobKind::Skill, .. }));

    // Same name, different kind is fine.
    fx.scheduler
        .spawn(task("digest", 60_000, &[echo("c")]))
        .await
        .unwrap();
}

#[yare::parameterized(
    empty_name       = { SpawnRequest::new(JobKind::Task, " ", script(&[("echo", json!({}))])) },
    empty_steps      = { SpawnRequest::new(JobKind::Task, "t", script(&[])) },
    prompt_for_skill = { SpawnRequest::new(JobKind::Skill, "s", JobCode::Prompt { prompt: "p".into() }) },
    script_subagent  = { SpawnRequest::new(JobKind::Subagent, "a", script(&[("echo", json!({}))])) },
    blank_prompt     = { SpawnRequest::new(JobKind::Subagent, "a", JobCode::Prompt { prompt: "".into() }) },
)]
fn invalid_spawn_requests(request: SpawnRequest) {
    assert!(matches!(request.validate(), Err(JobError::Invalid(_))));
}

#[tokio::test]
async fn spawn_with_unknown_parent_fails() {
    let fx = SchedulerFixture::new();
    let err = fx
        .scheduler
        .spawn(skill("s", &[echo("x")]).parent(Some(JobId::new("ghost"))))
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::ParentNotFound(_)));
    assert!(fx.scheduler.list(None).is_empty());
}

#[tokio::test(start_paused = true)]
async fn pause_and_resume_require_matching_status() {
    let fx = SchedulerFixture::new();
    let info = fx
        .scheduler
        .spawn(task("t", 60_000, &[echo("x")]))
        .await
        .unwrap();

    let err = fx.scheduler.resume(&info.id).unwrap_err();
    assert!(
        err.to_string().contains("is running; this operation requires it to be paused"),
        "{err}"
    );
    assert_eq!(fx.scheduler.get(&info.id).unwrap().status, JobStatus::Running);

    fx.scheduler.pause(&info.id).unwrap();
    let err = fx.scheduler.pause(&info.id).unwrap_err();
    assert!(matches!(
        err,
        JobError::InvalidState { expected: JobStatus::Running, actual: JobStatus::Paused, .. }
    ));
    assert_eq!(fx.scheduler.get(&info.id).unwrap().status, JobStatus::Paused);

    assert!(matches!(
        fx.scheduler.pause(&JobId::new("nope")),
        Err(JobError::NotFound(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn paused_job_does_not_tick_until_resumed() {
    let fx = SchedulerFixture::new();
    let info = fx
        .scheduler
        .spawn(task("t", 1_000, &[echo("x")]))
        .await
        .unwrap();
    settle().await;
    fx.scheduler.pause(&info.id).unwrap();

    advance(5_000).await;
    assert_eq!(fx.scheduler.get(&info.id).unwrap().run_count, 0);

    fx.scheduler.resume(&info.id).unwrap();
    settle().await;
    advance(1_000).await;
    assert_eq!(fx.scheduler.get(&info.id).unwrap().run_count, 1);

    let names = fx.event_names();
    assert!(names.contains(&"task:paused".to_string()));
    assert!(names.contains(&"task:resumed".to_string()));
}

#[tokio::test(start_paused = true)]
async fn pause_cancels_in_flight_run_quietly() {
    let fx = SchedulerFixture::new();
    let info = fx
        .scheduler
        .spawn(task("slowpoke", 0, &[("slow", json!({"text": "late"}))]))
        .await
        .unwrap();
    settle().await;
    assert_eq!(fx.host.tool_calls.lock().len(), 1);

    fx.scheduler.pause(&info.id).unwrap();
    settle().await;
    advance(60_000).await;

    let after = fx.scheduler.get(&info.id).unwrap();
    assert_eq!(after.run_count, 0);
    assert_eq!(after.last_error, None);
    assert!(fx.bus.history(Some("task:executed"), None).is_empty());
    assert!(fx.bus.history(Some("task:error"), None).is_empty());
}

#[tokio::test(start_paused = true)]
async fn failure_sets_last_error_and_keeps_schedule() {
    let fx = SchedulerFixture::new();
    let info = fx
        .scheduler
        .spawn(task("flaky", 1_000, &[("broken", json!({}))]))
        .await
        .unwrap();
    settle().await;

    advance(1_000).await;
    let after = fx.scheduler.get(&info.id).unwrap();
    assert_eq!(after.run_count, 1);
    assert_eq!(after.status, JobStatus::Running);
    assert!(after.last_error.unwrap().contains("broken exploded"));

    advance(1_000).await;
    assert_eq!(fx.scheduler.get(&info.id).unwrap().run_count, 2);
    assert_eq!(fx.bus.history(Some("task:error"), None).len(), 2);
}

#[tokio::test]
async fn delete_removes_every_descendant() {
    let fx = SchedulerFixture::new();
    let root = fx.scheduler.spawn(skill("root", &[echo("r")])).await.unwrap();
    let child = fx
        .scheduler
        .spawn(skill("child", &[echo("c")]).parent(Some(root.id.clone())))
        .await
        .unwrap();
    fx.scheduler
        .spawn(skill("grandchild", &[echo("g")]).parent(Some(child.id.clone())))
        .await
        .unwrap();
    fx.scheduler
        .spawn(skill("sibling", &[echo("s")]).parent(Some(root.id.clone())))
        .await
        .unwrap();
    let unrelated = fx.scheduler.spawn(skill("other", &[echo("o")])).await.unwrap();

    let removed = fx.scheduler.delete(&root.id).await.unwrap();

    assert_eq!(removed.len(), 4);
    assert_eq!(removed.last().unwrap().id, root.id);
    let left: Vec<_> = fx.scheduler.list(None).into_iter().map(|j| j.id).collect();
    assert_eq!(left, [unrelated.id]);
    assert_eq!(fx.bus.history(Some("skill:deleted"), None).len(), 4);
    assert!(fx
        .storage
        .get("skills", root.id.as_str())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn delete_leaf_is_base_case() {
    let fx = SchedulerFixture::new();
    let only = fx.scheduler.spawn(skill("only", &[echo("x")])).await.unwrap();
    assert_eq!(fx.scheduler.delete(&only.id).await.unwrap().len(), 1);
    assert!(fx.scheduler.list(None).is_empty());
    assert!(matches!(
        fx.scheduler.delete(&only.id).await,
        Err(JobError::NotFound(_))
    ));
}

#[tokio::test]
async fn snapshots_are_copies() {
    let fx = SchedulerFixture::new();
    let info = fx.scheduler.spawn(skill("s", &[echo("x")])).await.unwrap();
    let mut copy = fx.scheduler.list(None).remove(0);
    copy.name = "mutated".to_string();
    copy.status = JobStatus::Error;
    let fresh = fx.scheduler.get(&info.id).unwrap();
    assert_eq!(fresh.name, "s");
    assert_eq!(fresh.status, JobStatus::Running);
}

#[tokio::test]
async fn run_skill_threads_input_and_prev() {
    let fx = SchedulerFixture::new();
    fx.scheduler
        .spawn(skill(
            "shout",
            &[
                ("echo", json!({"text": "got {{input}}"})),
                ("echo", json!({"text": "{{prev}}!"})),
            ],
        ))
        .await
        .unwrap();

    let output = fx.scheduler.run_skill("shout", "mail").await.unwrap();
    assert_eq!(output, "got mail!");

    let skill = fx.scheduler.find_by_name(JobKind::Skill, "shout").unwrap();
    assert_eq!(skill.run_count, 1);
    let calls = fx.host.tool_calls.lock();
    assert_eq!(calls[0].0, "skill:shout");
}

#[tokio::test]
async fn skills_compose_other_skills() {
    let fx = SchedulerFixture::new();
    fx.scheduler
        .spawn(skill("inner", &[("echo", json!({"text": "<{{input}}>"}))]))
        .await
        .unwrap();
    fx.scheduler
        .spawn(skill(
            "outer",
            &[
                ("echo", json!({"text": "raw"})),
                ("skill:inner", json!({})),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(fx.scheduler.run_skill("outer", "").await.unwrap(), "<raw>");
}

#[tokio::test]
async fn recursive_skill_hits_depth_limit() {
    let fx = SchedulerFixture::new();
    fx.scheduler
        .spawn(skill("loop", &[("skill:loop", json!({"input": "again"}))]))
        .await
        .unwrap();

    let err = fx.scheduler.run_skill("loop", "").await.unwrap_err();
    assert!(matches!(err, JobError::DepthExceeded(MAX_SKILL_DEPTH)), "{err}");
}

#[tokio::test]
async fn paused_skill_cannot_run() {
    let fx = SchedulerFixture::new();
    let info = fx.scheduler.spawn(skill("s", &[echo("x")])).await.unwrap();
    fx.scheduler.pause(&info.id).unwrap();
    assert!(matches!(
        fx.scheduler.run_skill("s", "").await,
        Err(JobError::InvalidState { .. })
    ));
    assert!(matches!(
        fx.scheduler.run_skill("missing", "").await,
        Err(JobError::NotFound(_))
    ));
}

#[tokio::test]
async fn persisted_jobs_rehydrate_stopped() {
    let first = SchedulerFixture::new();
    first
        .scheduler
        .spawn(task("nightly", 86_400_000, &[echo("x")]))
        .await
        .unwrap();
    first.scheduler.spawn(skill("fmt", &[echo("y")])).await.unwrap();
    first.scheduler.spawn(subagent("ephemeral", 60_000)).await.unwrap();
    first.scheduler.shutdown();

    let second = SchedulerFixture::with_storage(Arc::clone(&first.storage));
    assert_eq!(second.scheduler.rehydrate().await.unwrap(), 2);

    let jobs = second.scheduler.list(None);
    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().all(|j| j.status == JobStatus::Stopped));
    assert!(second
        .scheduler
        .find_by_name(JobKind::Subagent, "ephemeral")
        .is_none());

    // A second rehydrate does not duplicate.
    assert_eq!(second.scheduler.rehydrate().await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn start_arms_a_stopped_job() {
    let first = SchedulerFixture::new();
    first
        .scheduler
        .spawn(task("once", 0, &[echo("x")]))
        .await
        .unwrap();
    first.scheduler.shutdown();

    let second = SchedulerFixture::with_storage(Arc::clone(&first.storage));
    second.scheduler.rehydrate().await.unwrap();
    let stopped = second.scheduler.find_by_name(JobKind::Task, "once").unwrap();
    assert!(second.scheduler.pause(&stopped.id).is_err());

    second.scheduler.start(&stopped.id).unwrap();
    settle().await;
    let started = second.scheduler.get(&stopped.id).unwrap();
    assert_eq!(started.status, JobStatus::Running);
    assert!(started.run_count >= 1);
    assert!(second.event_names().contains(&"task:started".to_string()));
}

#[tokio::test(start_paused = true)]
async fn subagent_runs_through_host_agent_loop() {
    let fx = SchedulerFixture::new();
    fx.host
        .agent_replies
        .lock()
        .push_back(Ok(Some("disk is 91% full".to_string())));
    let info = fx.scheduler.spawn(subagent("disk", 0)).await.unwrap();
    settle().await;

    let runs = fx.host.agent_runs.lock().clone();
    assert_eq!(runs, [("subagent:disk".to_string(), "check disk".to_string())]);
    assert_eq!(fx.scheduler.get(&info.id).unwrap().run_count, 1);
    let executed = fx.bus.history(Some("subagent:executed"), None);
    assert_eq!(executed[0].payload["output"], "disk is 91% full");
    assert_eq!(executed[0].payload["silent"], false);
}

#[tokio::test(start_paused = true)]
async fn silent_subagent_run_is_flagged() {
    let fx = SchedulerFixture::new();
    fx.scheduler.spawn(subagent("quiet", 0)).await.unwrap();
    settle().await;
    let executed = fx.bus.history(Some("subagent:executed"), None);
    assert_eq!(executed[0].payload["silent"], true);
}

#[tokio::test]
async fn resolve_accepts_id_or_name() {
    let fx = SchedulerFixture::new();
    let info = fx.scheduler.spawn(skill("s", &[echo("x")])).await.unwrap();
    assert_eq!(fx.scheduler.resolve(JobKind::Skill, info.id.as_str()).unwrap().id, info.id);
    assert_eq!(fx.scheduler.resolve(JobKind::Skill, "s").unwrap().id, info.id);
    assert!(fx.scheduler.resolve(JobKind::Task, "s").is_err());
}
