// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background job scheduler.
//!
//! One mechanism drives sub-agents, periodic tasks and on-demand skills. Each
//! armed job owns a driver task that sleeps for its interval, runs the code,
//! and repeats while the job stays `running`. Pause and delete cancel the
//! job's token, which stops the driver and abandons any in-flight run.

mod capabilities;
mod script;

pub use capabilities::{BoxFuture, Capabilities, JobHost, MAX_SKILL_DEPTH};

use crate::error::JobError;
use crate::event_bus::EventBus;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wd_core::{Clock, IdGen, JobCode, JobId, JobInfo, JobKind, JobStatus, WorkflowId};
use wd_storage::Storage;

/// Parameters for creating a job.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub kind: JobKind,
    pub name: String,
    pub description: String,
    pub interval_ms: u64,
    pub code: JobCode,
    pub parent_id: Option<JobId>,
    pub channel_id: Option<String>,
    pub user_id: Option<String>,
    pub workflow_id: Option<WorkflowId>,
}

impl SpawnRequest {
    pub fn new(kind: JobKind, name: impl Into<String>, code: JobCode) -> Self {
        Self {
            kind,
            name: name.into(),
            description: String::new(),
            interval_ms: 0,
            code,
            parent_id: None,
            channel_id: None,
            user_id: None,
            workflow_id: None,
        }
    }

    pub fn interval_ms(mut self, interval_ms: u64) -> Self {
        self.interval_ms = interval_ms;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn parent(mut self, parent_id: Option<JobId>) -> Self {
        self.parent_id = parent_id;
        self
    }

    pub fn owner(
        mut self,
        user_id: Option<String>,
        channel_id: Option<String>,
        workflow_id: Option<WorkflowId>,
    ) -> Self {
        self.user_id = user_id;
        self.channel_id = channel_id;
        self.workflow_id = workflow_id;
        self
    }

    fn validate(&self) -> Result<(), JobError> {
        if self.name.trim().is_empty() {
            return Err(JobError::Invalid("job name is required".to_string()));
        }
        match (&self.code, self.kind) {
            (JobCode::Prompt { prompt }, JobKind::Subagent) if !prompt.trim().is_empty() => Ok(()),
            (JobCode::Prompt { .. }, JobKind::Subagent) => {
                Err(JobError::Invalid("sub-agent prompt is empty".to_string()))
            }
            (JobCode::Script { steps }, JobKind::Task | JobKind::Skill) if !steps.is_empty() => {
                Ok(())
            }
            (JobCode::Script { .. }, JobKind::Task | JobKind::Skill) => {
                Err(JobError::Invalid(format!("{} code has no steps", self.kind)))
            }
            (_, kind) => Err(JobError::Invalid(format!(
                "{kind} code must be a {}",
                if kind == JobKind::Subagent {
                    "prompt"
                } else {
                    "step program"
                }
            ))),
        }
    }
}

struct JobEntry {
    info: JobInfo,
    cancel: CancellationToken,
}

struct SchedulerInner {
    bus: EventBus,
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGen>,
    jobs: Mutex<IndexMap<JobId, JobEntry>>,
    host: Mutex<Option<Weak<dyn JobHost>>>,
}

/// Registry and driver of background jobs. Cheap to clone.
#[derive(Clone)]
pub struct JobScheduler {
    inner: Arc<SchedulerInner>,
}

fn job_event(info: &JobInfo) -> Value {
    json!({ "id": info.id, "kind": info.kind, "name": info.name })
}

impl JobScheduler {
    pub fn new(
        bus: EventBus,
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGen>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                bus,
                storage,
                clock,
                ids,
                jobs: Mutex::new(IndexMap::new()),
                host: Mutex::new(None),
            }),
        }
    }

    /// Attach the host that executes tool calls and agent runs.
    pub fn set_host(&self, host: Weak<dyn JobHost>) {
        *self.inner.host.lock() = Some(host);
    }

    fn host(&self) -> Result<Arc<dyn JobHost>, JobError> {
        self.inner
            .host
            .lock()
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or(JobError::HostUnavailable)
    }

    /// Create a job and arm its schedule. Interval 0 runs once immediately.
    pub async fn spawn(&self, request: SpawnRequest) -> Result<JobInfo, JobError> {
        request.validate()?;
        let info = {
            let mut jobs = self.inner.jobs.lock();
            if jobs
                .values()
                .any(|e| e.info.kind == request.kind && e.info.name == request.name)
            {
                return Err(JobError::DuplicateName {
                    kind: request.kind,
                    name: request.name,
                });
            }
            if let Some(parent) = &request.parent_id {
                if !jobs.contains_key(parent) {
                    return Err(JobError::ParentNotFound(parent.to_string()));
                }
            }
            let info = JobInfo {
                id: JobId::new(self.inner.ids.next_prefixed(request.kind.as_str())),
                kind: request.kind,
                name: request.name,
                description: request.description,
                status: JobStatus::Running,
                interval_ms: request.interval_ms,
                code: request.code,
                created_at: self.inner.clock.epoch_ms(),
                last_run_at: None,
                run_count: 0,
                last_error: None,
                parent_id: request.parent_id,
                channel_id: request.channel_id,
                user_id: request.user_id,
                workflow_id: request.workflow_id,
            };
            jobs.insert(
                info.id.clone(),
                JobEntry {
                    info: info.clone(),
                    cancel: CancellationToken::new(),
                },
            );
            info
        };

        if info.kind.is_persisted() {
            if let Err(e) = self.persist(&info).await {
                self.inner.jobs.lock().shift_remove(&info.id);
                return Err(e);
            }
        }

        tracing::info!(
            job_id = %info.id,
            kind = %info.kind,
            name = %info.name,
            interval_ms = info.interval_ms,
            "job spawned"
        );
        self.inner
            .bus
            .emit(&info.kind.event("spawned"), json!(info));
        if !info.kind.is_on_demand() {
            self.arm(&info.id);
        }
        Ok(info)
    }

    /// Stop a running job's schedule and cancel any in-flight run.
    pub fn pause(&self, id: &JobId) -> Result<JobInfo, JobError> {
        let info = self.transition(id, JobStatus::Running, JobStatus::Paused)?;
        self.inner.bus.emit(&info.kind.event("paused"), job_event(&info));
        Ok(info)
    }

    /// Re-arm a paused job.
    pub fn resume(&self, id: &JobId) -> Result<JobInfo, JobError> {
        let info = self.transition(id, JobStatus::Paused, JobStatus::Running)?;
        if !info.kind.is_on_demand() {
            self.arm(id);
        }
        self.inner
            .bus
            .emit(&info.kind.event("resumed"), job_event(&info));
        Ok(info)
    }

    /// Arm a stopped (rehydrated) job for the first time in this process.
    pub fn start(&self, id: &JobId) -> Result<JobInfo, JobError> {
        let info = self.transition(id, JobStatus::Stopped, JobStatus::Running)?;
        if !info.kind.is_on_demand() {
            self.arm(id);
        }
        self.inner
            .bus
            .emit(&info.kind.event("started"), job_event(&info));
        Ok(info)
    }

    fn transition(
        &self,
        id: &JobId,
        expected: JobStatus,
        next: JobStatus,
    ) -> Result<JobInfo, JobError> {
        let mut jobs = self.inner.jobs.lock();
        let entry = jobs
            .get_mut(id)
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;
        if entry.info.status != expected {
            return Err(JobError::InvalidState {
                kind: entry.info.kind,
                name: entry.info.name.clone(),
                expected,
                actual: entry.info.status,
            });
        }
        entry.info.status = next;
        if next == JobStatus::Running {
            entry.cancel = CancellationToken::new();
        } else {
            entry.cancel.cancel();
        }
        tracing::info!(job_id = %id, from = %expected, to = %next, "job status changed");
        Ok(entry.info.clone())
    }

    /// Delete a job and every descendant. Returns the removed jobs, children first.
    pub async fn delete(&self, id: &JobId) -> Result<Vec<JobInfo>, JobError> {
        let removed: Vec<JobInfo> = {
            let mut jobs = self.inner.jobs.lock();
            if !jobs.contains_key(id) {
                return Err(JobError::NotFound(id.to_string()));
            }
            let mut subtree = vec![id.clone()];
            let mut next = 0;
            while next < subtree.len() {
                let parent = subtree[next].clone();
                for (child_id, entry) in jobs.iter() {
                    if entry.info.parent_id.as_ref() == Some(&parent)
                        && !subtree.contains(child_id)
                    {
                        subtree.push(child_id.clone());
                    }
                }
                next += 1;
            }
            subtree
                .iter()
                .rev()
                .filter_map(|job_id| jobs.shift_remove(job_id))
                .map(|entry| {
                    entry.cancel.cancel();
                    entry.info
                })
                .collect()
        };

        for info in &removed {
            if info.kind.is_persisted() {
                if let Err(e) = self.inner.storage.delete(info.kind.table(), info.id.as_str()).await
                {
                    tracing::warn!(job_id = %info.id, error = %e, "failed to delete stored job");
                }
            }
            tracing::info!(job_id = %info.id, kind = %info.kind, name = %info.name, "job deleted");
            self.inner.bus.emit(&info.kind.event("deleted"), job_event(info));
        }
        Ok(removed)
    }

    /// Snapshot of jobs, optionally of one kind, in creation order.
    pub fn list(&self, kind: Option<JobKind>) -> Vec<JobInfo> {
        self.inner
            .jobs
            .lock()
            .values()
            .filter(|e| kind.map_or(true, |k| e.info.kind == k))
            .map(|e| e.info.clone())
            .collect()
    }

    pub fn get(&self, id: &JobId) -> Option<JobInfo> {
        self.inner.jobs.lock().get(id).map(|e| e.info.clone())
    }

    pub fn find_by_name(&self, kind: JobKind, name: &str) -> Option<JobInfo> {
        self.inner
            .jobs
            .lock()
            .values()
            .find(|e| e.info.kind == kind && e.info.name == name)
            .map(|e| e.info.clone())
    }

    /// Look a job of `kind` up by id, falling back to name.
    pub fn resolve(&self, kind: JobKind, id_or_name: &str) -> Result<JobInfo, JobError> {
        self.get(&JobId::new(id_or_name))
            .filter(|info| info.kind == kind)
            .or_else(|| self.find_by_name(kind, id_or_name))
            .ok_or_else(|| JobError::NotFound(format!("{kind} {id_or_name}")))
    }

    /// Run a skill on demand and return its output.
    pub async fn run_skill(&self, name: &str, input: &str) -> Result<String, JobError> {
        self.invoke_skill(name, input, 0).await
    }

    pub(crate) async fn invoke_skill(
        &self,
        name: &str,
        input: &str,
        depth: usize,
    ) -> Result<String, JobError> {
        if depth > MAX_SKILL_DEPTH {
            return Err(JobError::DepthExceeded(MAX_SKILL_DEPTH));
        }
        let (info, token) = {
            let jobs = self.inner.jobs.lock();
            let entry = jobs
                .values()
                .find(|e| e.info.kind == JobKind::Skill && e.info.name == name)
                .ok_or_else(|| JobError::NotFound(format!("skill {name}")))?;
            if entry.info.status == JobStatus::Paused {
                return Err(JobError::InvalidState {
                    kind: JobKind::Skill,
                    name: name.to_string(),
                    expected: JobStatus::Running,
                    actual: JobStatus::Paused,
                });
            }
            (entry.info.clone(), entry.cancel.child_token())
        };
        let outcome = self.run_code(&info, input, depth, token.clone()).await;
        self.record(&info.id, &outcome, &token);
        outcome.map(Option::unwrap_or_default)
    }

    /// Restore persisted tasks and skills as `stopped`. Returns how many were restored.
    pub async fn rehydrate(&self) -> Result<usize, JobError> {
        let mut restored = 0;
        for kind in [JobKind::Task, JobKind::Skill] {
            self.ensure_table(kind).await?;
            for record in self.inner.storage.query(kind.table(), None).await? {
                let mut info: JobInfo = match serde_json::from_value(record.value) {
                    Ok(info) => info,
                    Err(e) => {
                        tracing::warn!(key = %record.key, error = %e, "skipping corrupt stored job");
                        continue;
                    }
                };
                if info.kind != kind {
                    continue;
                }
                info.status = JobStatus::Stopped;
                info.last_error = None;
                let mut jobs = self.inner.jobs.lock();
                let taken = jobs.contains_key(&info.id)
                    || jobs
                        .values()
                        .any(|e| e.info.kind == kind && e.info.name == info.name);
                if taken {
                    continue;
                }
                jobs.insert(
                    info.id.clone(),
                    JobEntry {
                        info,
                        cancel: CancellationToken::new(),
                    },
                );
                restored += 1;
            }
        }
        tracing::info!(restored, "rehydrated stored jobs");
        Ok(restored)
    }

    /// Cancel every driver and in-flight run.
    pub fn shutdown(&self) {
        for entry in self.inner.jobs.lock().values() {
            entry.cancel.cancel();
        }
    }

    async fn ensure_table(&self, kind: JobKind) -> Result<(), JobError> {
        self.inner
            .storage
            .ensure_table(kind.table(), &json!({"key": "id"}))
            .await?;
        Ok(())
    }

    async fn persist(&self, info: &JobInfo) -> Result<(), JobError> {
        self.ensure_table(info.kind).await?;
        let value = serde_json::to_value(info).map_err(|e| JobError::Invalid(e.to_string()))?;
        self.inner
            .storage
            .set(info.kind.table(), info.id.as_str(), value)
            .await?;
        Ok(())
    }

    fn arm(&self, id: &JobId) {
        let armed = {
            let jobs = self.inner.jobs.lock();
            jobs.get(id)
                .map(|e| (e.info.interval_ms, e.cancel.clone()))
        };
        let Some((interval_ms, token)) = armed else {
            return;
        };
        let this = self.clone();
        let id = id.clone();
        tokio::spawn(async move { this.drive(id, interval_ms, token).await });
    }

    async fn drive(self, id: JobId, interval_ms: u64, token: CancellationToken) {
        if interval_ms == 0 {
            self.tick(&id, &token).await;
            return;
        }
        let period = Duration::from_millis(interval_ms);
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(period) => {}
            }
            if !self.is_running(&id) {
                return;
            }
            self.tick(&id, &token).await;
        }
    }

    fn is_running(&self, id: &JobId) -> bool {
        self.inner
            .jobs
            .lock()
            .get(id)
            .is_some_and(|e| e.info.status == JobStatus::Running)
    }

    async fn tick(&self, id: &JobId, token: &CancellationToken) {
        let Some(info) = self.get(id) else {
            return;
        };
        let run_token = token.child_token();
        let outcome = self.run_code(&info, "", 0, run_token.clone()).await;
        self.record(id, &outcome, &run_token);
    }

    /// Execute job code with its capabilities. `Ok(None)` means the run had nothing to report.
    async fn run_code(
        &self,
        info: &JobInfo,
        input: &str,
        depth: usize,
        cancel: CancellationToken,
    ) -> Result<Option<String>, JobError> {
        let host = self.host()?;
        let caps = Capabilities::new(
            self.clone(),
            Arc::clone(&host),
            info.clone(),
            depth,
            cancel.clone(),
        );
        let work = async {
            match &info.code {
                JobCode::Prompt { prompt } => host.run_agent(info, prompt, &cancel).await,
                JobCode::Script { steps } => script::run_script(steps, input, &caps).await.map(Some),
            }
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(JobError::Cancelled),
            result = work => result,
        }
    }

    /// Fold a run's outcome into the job's metadata and announce it.
    fn record(
        &self,
        id: &JobId,
        outcome: &Result<Option<String>, JobError>,
        token: &CancellationToken,
    ) {
        if matches!(outcome, Err(JobError::Cancelled)) || token.is_cancelled() {
            tracing::debug!(job_id = %id, "run cancelled; result discarded");
            return;
        }
        let now = self.inner.clock.epoch_ms();
        let info = {
            let mut jobs = self.inner.jobs.lock();
            let Some(entry) = jobs.get_mut(id) else {
                return;
            };
            entry.info.run_count += 1;
            entry.info.last_run_at = Some(now);
            entry.info.last_error = outcome.as_ref().err().map(|e| e.to_string());
            entry.info.clone()
        };
        match outcome {
            Ok(output) => {
                tracing::info!(job_id = %id, run_count = info.run_count, "job executed");
                self.inner.bus.emit(
                    &info.kind.event("executed"),
                    json!({
                        "id": info.id,
                        "kind": info.kind,
                        "name": info.name,
                        "runCount": info.run_count,
                        "output": output,
                        "silent": output.is_none(),
                    }),
                );
            }
            Err(e) => {
                tracing::warn!(job_id = %id, error = %e, "job run failed");
                self.inner.bus.emit(
                    &info.kind.event("error"),
                    json!({
                        "id": info.id,
                        "kind": info.kind,
                        "name": info.name,
                        "runCount": info.run_count,
                        "error": e.to_string(),
                    }),
                );
            }
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
