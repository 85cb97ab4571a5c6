// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The capability boundary handed to running job code.

use super::JobScheduler;
use crate::error::JobError;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wd_core::{JobInfo, JobKind, ToolResult};

/// Maximum nesting of skill-calls-skill.
pub const MAX_SKILL_DEPTH: usize = 8;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What the scheduler needs from the rest of the daemon to run job code.
///
/// Implemented by the orchestrator, which routes tool calls through the
/// policy engine and runs prompt-driven jobs through the agent loop.
#[async_trait]
pub trait JobHost: Send + Sync {
    fn tool_names(&self) -> Vec<String>;

    /// Call a tool on behalf of `job`, subject to policy.
    async fn call_tool(&self, job: &JobInfo, tool: &str, params: Value) -> ToolResult;

    /// Run the agent loop for a prompt-driven job. `None` means nothing to report.
    async fn run_agent(
        &self,
        job: &JobInfo,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, JobError>;
}

/// Read-only view of every tool and skill, scoped to one running job.
pub struct Capabilities {
    scheduler: JobScheduler,
    host: Arc<dyn JobHost>,
    job: JobInfo,
    depth: usize,
    cancel: CancellationToken,
}

impl Capabilities {
    pub(crate) fn new(
        scheduler: JobScheduler,
        host: Arc<dyn JobHost>,
        job: JobInfo,
        depth: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            scheduler,
            host,
            job,
            depth,
            cancel,
        }
    }

    pub fn job(&self) -> &JobInfo {
        &self.job
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.host.tool_names()
    }

    pub fn skill_names(&self) -> Vec<String> {
        self.scheduler
            .list(Some(JobKind::Skill))
            .into_iter()
            .map(|s| s.name)
            .collect()
    }

    pub async fn call_tool(&self, name: &str, params: Value) -> ToolResult {
        if self.is_cancelled() {
            return ToolResult::fail("cancelled");
        }
        self.host.call_tool(&self.job, name, params).await
    }

    /// Invoke a skill by name with a text input; returns its output.
    pub fn call_skill<'a>(
        &'a self,
        name: &'a str,
        input: &'a str,
    ) -> BoxFuture<'a, Result<String, JobError>> {
        Box::pin(async move {
            if self.is_cancelled() {
                return Err(JobError::Cancelled);
            }
            self.scheduler
                .invoke_skill(name, input, self.depth + 1)
                .await
        })
    }
}
