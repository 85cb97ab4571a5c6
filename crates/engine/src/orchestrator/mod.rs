// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestrator: routes messages to the model-driven tool loop.
//!
//! Every message lands in a workflow. Interactive messages share one live
//! thread per user and channel and reply to the caller. Sub-agent runs are
//! driven by the job scheduler through [`JobHost`], get a fresh workflow per
//! tick, and stay quiet unless they have something to report.

mod audit;
mod interpreter;
mod job_tools;
mod memory;
mod prompt;
mod tool_loop;
mod workflows;

pub use audit::{AuditLog, AUDIT_TABLE, MAX_AUDIT_ENTRIES};
pub use job_tools::JOBS_CATEGORY;
pub use memory::{MemoryStore, MAX_STORED_TURNS, MEMORY_TABLE};
pub use prompt::SILENT;
pub use tool_loop::{HISTORY_WINDOW, MAX_ITERATIONS};
pub use workflows::{WorkflowStore, WORKFLOWS_TABLE};

use crate::error::{JobError, OrchestratorError};
use crate::event_bus::EventBus;
use crate::jobs::{JobHost, JobScheduler};
use crate::policy::PolicyEngine;
use crate::tools::ToolRegistry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;
use tool_loop::LoopOutcome;
use wd_adapters::LlmClient;
use wd_core::{
    names, AuditEntry, Clock, IdGen, IncomingMessage, JobInfo, Role, ToolResult, Turn, WorkflowId,
    WorkflowStatus, MAIN_AGENT,
};
use wd_storage::Storage;

/// Owner used for job runs with no recorded user.
pub const SYSTEM_USER: &str = "system";
/// Channel used for job runs with no recorded channel.
pub const JOBS_CHANNEL: &str = "jobs";

/// Who is calling a tool, for policy and audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    pub workflow_id: WorkflowId,
    pub user_id: String,
    pub channel_id: String,
    pub agent_id: String,
}

impl CallContext {
    pub fn new(workflow_id: WorkflowId, user_id: &str, channel_id: &str, agent_id: &str) -> Self {
        Self {
            workflow_id,
            user_id: user_id.to_string(),
            channel_id: channel_id.to_string(),
            agent_id: agent_id.to_string(),
        }
    }

    fn for_job(job: &JobInfo, workflow_id: WorkflowId) -> Self {
        Self {
            workflow_id,
            user_id: job.user_id.clone().unwrap_or_else(|| SYSTEM_USER.to_string()),
            channel_id: job.channel_id.clone().unwrap_or_else(|| JOBS_CHANNEL.to_string()),
            agent_id: job.agent_id(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Completed,
    Error,
}

/// Reply to one incoming message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageOutcome {
    pub status: OutcomeStatus,
    pub workflow_id: WorkflowId,
    pub content: String,
}

/// Collaborators the orchestrator is built from.
pub struct OrchestratorDeps {
    pub bus: EventBus,
    pub storage: Arc<dyn Storage>,
    pub policy: Arc<PolicyEngine>,
    pub tools: ToolRegistry,
    pub scheduler: JobScheduler,
    /// `None` answers with the built-in command interpreter.
    pub llm: Option<Arc<dyn LlmClient>>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGen>,
}

pub struct Orchestrator {
    pub(crate) bus: EventBus,
    pub(crate) policy: Arc<PolicyEngine>,
    pub(crate) tools: ToolRegistry,
    pub(crate) scheduler: JobScheduler,
    pub(crate) llm: Option<Arc<dyn LlmClient>>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) workflows: WorkflowStore,
    pub(crate) memory: MemoryStore,
    pub(crate) audit: AuditLog,
}

impl Orchestrator {
    /// Open the stores, register job tools, and attach as the scheduler's host.
    pub async fn new(deps: OrchestratorDeps) -> Result<Arc<Self>, OrchestratorError> {
        let workflows = WorkflowStore::load(
            deps.bus.clone(),
            Arc::clone(&deps.storage),
            Arc::clone(&deps.clock),
            Arc::clone(&deps.ids),
        )
        .await?;
        let memory = MemoryStore::open(Arc::clone(&deps.storage)).await?;
        let audit = AuditLog::open(
            Arc::clone(&deps.storage),
            Arc::clone(&deps.clock),
            Arc::clone(&deps.ids),
        )
        .await?;
        job_tools::register(&deps.tools, &deps.scheduler, &workflows);

        let orchestrator = Arc::new(Self {
            bus: deps.bus,
            policy: deps.policy,
            tools: deps.tools,
            scheduler: deps.scheduler,
            llm: deps.llm,
            clock: deps.clock,
            workflows,
            memory,
            audit,
        });
        let host: Weak<dyn JobHost> = Arc::downgrade(&orchestrator) as _;
        orchestrator.scheduler.set_host(host);
        tracing::info!(
            model = orchestrator.llm.as_ref().map(|l| l.model()).unwrap_or("none"),
            tools = orchestrator.tools.len(),
            "orchestrator ready"
        );
        Ok(orchestrator)
    }

    /// Route one message through its workflow and return the reply.
    ///
    /// Once the workflow exists every failure is reported as `agent:error`
    /// and the workflow still ends `completed`. Only a failure to open the
    /// workflow is returned as `Err`.
    pub async fn handle_message(
        &self,
        message: IncomingMessage,
    ) -> Result<MessageOutcome, OrchestratorError> {
        let workflow = match self
            .workflows
            .find_or_create(&message.user_id, &message.channel_id, MAIN_AGENT, None)
            .await
        {
            Ok(workflow) => workflow,
            Err(e) => {
                tracing::error!(user_id = %message.user_id, error = %e, "failed to open workflow");
                self.bus.emit(
                    names::AGENT_ERROR,
                    json!({
                        "workflowId": Value::Null,
                        "userId": message.user_id,
                        "channelId": message.channel_id,
                        "error": e.to_string(),
                    }),
                );
                return Err(e.into());
            }
        };
        let ctx = CallContext::new(
            workflow.id.clone(),
            &message.user_id,
            &message.channel_id,
            MAIN_AGENT,
        );

        let outcome = match self.converse(&ctx, &message.content).await {
            Ok(content) => {
                self.bus.emit(
                    names::AGENT_RESPONSE,
                    json!({
                        "workflowId": ctx.workflow_id,
                        "userId": ctx.user_id,
                        "channelId": ctx.channel_id,
                        "content": content,
                    }),
                );
                MessageOutcome {
                    status: OutcomeStatus::Completed,
                    workflow_id: workflow.id.clone(),
                    content,
                }
            }
            Err(e) => {
                let error = e.to_string();
                tracing::error!(workflow_id = %workflow.id, error = %error, "message handling failed");
                self.bus.emit(
                    names::AGENT_ERROR,
                    json!({
                        "workflowId": ctx.workflow_id,
                        "userId": ctx.user_id,
                        "channelId": ctx.channel_id,
                        "error": error,
                    }),
                );
                MessageOutcome {
                    status: OutcomeStatus::Error,
                    workflow_id: workflow.id.clone(),
                    content: error,
                }
            }
        };

        if let Err(e) = self
            .workflows
            .set_status(&workflow.id, WorkflowStatus::Completed)
            .await
        {
            tracing::warn!(workflow_id = %workflow.id, error = %e, "failed to complete workflow");
        }
        Ok(outcome)
    }

    /// Store the user turn, mark the workflow running, and produce the reply.
    async fn converse(&self, ctx: &CallContext, content: &str) -> Result<String, OrchestratorError> {
        self.memory
            .append(
                &ctx.workflow_id,
                Turn::new(Role::User, content, self.clock.epoch_ms()),
            )
            .await?;
        self.workflows
            .set_status(&ctx.workflow_id, WorkflowStatus::Running)
            .await?;
        self.bus.emit(
            names::AGENT_STARTED,
            json!({
                "workflowId": ctx.workflow_id,
                "userId": ctx.user_id,
                "channelId": ctx.channel_id,
                "agentId": ctx.agent_id,
            }),
        );
        self.reply(ctx, content).await
    }

    async fn reply(&self, ctx: &CallContext, content: &str) -> Result<String, OrchestratorError> {
        let reply = match &self.llm {
            Some(llm) => match self
                .run_loop(llm, ctx, None, &CancellationToken::new())
                .await?
            {
                LoopOutcome::Reply(text) => text,
                LoopOutcome::Silent => String::new(),
            },
            None => interpreter::interpret(content, &self.tools.names(), self.clock.epoch_ms()),
        };
        self.memory
            .append(
                &ctx.workflow_id,
                Turn::new(Role::Assistant, &reply, self.clock.epoch_ms()),
            )
            .await?;
        Ok(reply)
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn policy(&self) -> &PolicyEngine {
        &self.policy
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn scheduler(&self) -> &JobScheduler {
        &self.scheduler
    }

    pub fn workflows(&self) -> &WorkflowStore {
        &self.workflows
    }

    pub fn has_model(&self) -> bool {
        self.llm.is_some()
    }

    /// Forget one workflow's conversation, or all of them. Returns how many were wiped.
    pub async fn clear_memory(
        &self,
        workflow_id: Option<&WorkflowId>,
    ) -> Result<usize, OrchestratorError> {
        Ok(self.memory.clear(workflow_id).await?)
    }

    pub async fn audit_log(&self, limit: usize) -> Result<Vec<AuditEntry>, OrchestratorError> {
        Ok(self.audit.recent(limit).await?)
    }
}

#[async_trait]
impl JobHost for Orchestrator {
    fn tool_names(&self) -> Vec<String> {
        self.tools.names()
    }

    async fn call_tool(&self, job: &JobInfo, tool: &str, params: Value) -> ToolResult {
        let workflow_id = job.workflow_id.clone().unwrap_or_else(|| WorkflowId::new(""));
        self.execute_tool(tool, params, &CallContext::for_job(job, workflow_id))
            .await
    }

    async fn run_agent(
        &self,
        job: &JobInfo,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, JobError> {
        let Some(llm) = &self.llm else {
            return Err(JobError::Execution(
                OrchestratorError::NoModel.to_string(),
            ));
        };
        let agent_id = job.agent_id();
        let owner = CallContext::for_job(job, WorkflowId::new(""));
        let workflow = self
            .workflows
            .create(
                &owner.user_id,
                &owner.channel_id,
                &agent_id,
                job.workflow_id.as_ref(),
            )
            .await?;
        let ctx = CallContext {
            workflow_id: workflow.id.clone(),
            ..owner
        };
        if let Err(e) = self
            .workflows
            .set_status(&workflow.id, WorkflowStatus::Running)
            .await
        {
            tracing::warn!(workflow_id = %workflow.id, error = %e, "failed to mark workflow running");
        }

        let result = self.run_loop(llm, &ctx, Some(prompt), cancel).await;
        let report = match result {
            Ok(LoopOutcome::Reply(text)) => {
                if let Err(e) = self
                    .memory
                    .append(
                        &workflow.id,
                        Turn::new(Role::Assistant, &text, self.clock.epoch_ms()),
                    )
                    .await
                {
                    tracing::warn!(workflow_id = %workflow.id, error = %e, "failed to store reply");
                }
                self.bus.emit(
                    names::AGENT_RESPONSE,
                    json!({
                        "workflowId": ctx.workflow_id,
                        "userId": ctx.user_id,
                        "channelId": ctx.channel_id,
                        "agentId": ctx.agent_id,
                        "jobId": job.id,
                        "content": text,
                    }),
                );
                Ok(Some(text))
            }
            Ok(LoopOutcome::Silent) => {
                tracing::debug!(job_id = %job.id, "sub-agent had nothing to report");
                Ok(None)
            }
            Err(OrchestratorError::Cancelled) => Err(JobError::Cancelled),
            Err(e) => Err(JobError::Execution(e.to_string())),
        };

        if let Err(e) = self
            .workflows
            .set_status(&workflow.id, WorkflowStatus::Completed)
            .await
        {
            tracing::warn!(workflow_id = %workflow.id, error = %e, "failed to complete workflow");
        }
        report
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
