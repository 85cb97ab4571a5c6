// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for the engine crate.

use crate::error::{JobError, ToolError};
use crate::event_bus::EventBus;
use crate::jobs::{JobHost, JobScheduler};
use crate::orchestrator::{Orchestrator, OrchestratorDeps};
use crate::policy::PolicyEngine;
use crate::tools::{Tool, ToolRegistry};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wd_adapters::{FakeLlmClient, LlmClient};
use wd_core::{
    FakeClock, JobInfo, SequentialIdGen, ToolContext, ToolParameter, ToolResult, ToolSchema,
    ValidationResult,
};
use wd_storage::{Filter, MemoryStorage, Record, Storage, StorageError};

/// Tool that echoes its `text` parameter and records every call.
pub(crate) struct EchoTool {
    name: String,
    category: String,
    fail: bool,
    delay: Option<Duration>,
    require_text: bool,
    calls: Arc<Mutex<Vec<(Value, ToolContext)>>>,
}

impl EchoTool {
    pub fn new(name: &str, category: &str) -> Self {
        Self {
            name: name.to_string(),
            category: category.to_string(),
            fail: false,
            delay: None,
            require_text: false,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Validate that `text` is present.
    pub fn validating(mut self) -> Self {
        self.require_text = true;
        self
    }

    pub fn calls(&self) -> Arc<Mutex<Vec<(Value, ToolContext)>>> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name.clone(),
            description: format!("Echo text back ({})", self.name),
            parameters: vec![ToolParameter::optional("text", "string", "Text to echo")],
            category: self.category.clone(),
            permissions: Vec::new(),
        }
    }

    fn validate(&self, params: &Value) -> Option<ValidationResult> {
        if !self.require_text {
            return None;
        }
        Some(if params.get("text").is_some_and(Value::is_string) {
            ValidationResult::valid()
        } else {
            ValidationResult::invalid(vec!["text is required".to_string()])
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        self.calls.lock().push((params.clone(), ctx.clone()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(ToolError::Failed(format!("{} exploded", self.name)));
        }
        Ok(ToolResult::ok(
            params.get("text").cloned().unwrap_or(Value::Null),
        ))
    }
}

/// Job host that runs tools straight from a registry, without policy.
pub(crate) struct FakeHost {
    pub tools: ToolRegistry,
    pub tool_calls: Mutex<Vec<(String, String, Value)>>,
    pub agent_runs: Mutex<Vec<(String, String)>>,
    pub agent_replies: Mutex<VecDeque<Result<Option<String>, String>>>,
}

impl FakeHost {
    pub fn new(tools: ToolRegistry) -> Self {
        Self {
            tools,
            tool_calls: Mutex::new(Vec::new()),
            agent_runs: Mutex::new(Vec::new()),
            agent_replies: Mutex::new(VecDeque::new()),
        }
    }
}

#[async_trait]
impl JobHost for FakeHost {
    fn tool_names(&self) -> Vec<String> {
        self.tools.names()
    }

    async fn call_tool(&self, job: &JobInfo, tool: &str, params: Value) -> ToolResult {
        self.tool_calls
            .lock()
            .push((job.agent_id(), tool.to_string(), params.clone()));
        let Some(t) = self.tools.get(tool) else {
            return ToolResult::fail(format!("unknown tool: {tool}"));
        };
        match t.execute(params, &ToolContext::default()).await {
            Ok(result) => result,
            Err(e) => ToolResult::fail(e.to_string()),
        }
    }

    async fn run_agent(
        &self,
        job: &JobInfo,
        prompt: &str,
        _cancel: &CancellationToken,
    ) -> Result<Option<String>, JobError> {
        self.agent_runs
            .lock()
            .push((job.agent_id(), prompt.to_string()));
        let reply = self.agent_replies.lock().pop_front();
        match reply {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(e)) => Err(JobError::Execution(e)),
            None => Ok(None),
        }
    }
}

/// Scheduler wired to a [`FakeHost`] over in-memory storage.
pub(crate) struct SchedulerFixture {
    pub scheduler: JobScheduler,
    pub host: Arc<FakeHost>,
    pub bus: EventBus,
    pub storage: Arc<dyn Storage>,
    pub clock: FakeClock,
}

impl SchedulerFixture {
    pub fn new() -> Self {
        Self::with_storage(Arc::new(MemoryStorage::new()))
    }

    pub fn with_storage(storage: Arc<dyn Storage>) -> Self {
        let clock = FakeClock::new();
        let bus = EventBus::new(Arc::new(clock.clone()));
        let scheduler = JobScheduler::new(
            bus.clone(),
            Arc::clone(&storage),
            Arc::new(clock.clone()),
            Arc::new(SequentialIdGen::new()),
        );
        let tools = ToolRegistry::new();
        tools.register(Arc::new(EchoTool::new("echo", "util")));
        tools.register(Arc::new(EchoTool::new("broken", "util").failing()));
        tools.register(Arc::new(
            EchoTool::new("slow", "util").slow(Duration::from_secs(30)),
        ));
        let host = Arc::new(FakeHost::new(tools));
        let weak: std::sync::Weak<dyn JobHost> = Arc::downgrade(&host) as _;
        scheduler.set_host(weak);
        Self {
            scheduler,
            host,
            bus,
            storage,
            clock,
        }
    }

    pub fn event_names(&self) -> Vec<String> {
        self.bus
            .history(None, None)
            .into_iter()
            .map(|e| e.name)
            .collect()
    }
}

/// In-memory storage whose writes to one table can be made to fail.
#[derive(Default)]
pub(crate) struct FlakyStorage {
    inner: MemoryStorage,
    broken: Mutex<Option<String>>,
}

impl FlakyStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every later `set` on `table`.
    pub fn break_writes(&self, table: &str) {
        *self.broken.lock() = Some(table.to_string());
    }

    fn check(&self, table: &str) -> Result<(), StorageError> {
        if self.broken.lock().as_deref() == Some(table) {
            return Err(StorageError::Io(std::io::Error::other("disk full")));
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for FlakyStorage {
    async fn ensure_table(&self, name: &str, schema: &Value) -> Result<(), StorageError> {
        self.inner.ensure_table(name, schema).await
    }

    async fn get(&self, table: &str, key: &str) -> Result<Option<Value>, StorageError> {
        self.inner.get(table, key).await
    }

    async fn set(&self, table: &str, key: &str, value: Value) -> Result<(), StorageError> {
        self.check(table)?;
        self.inner.set(table, key, value).await
    }

    async fn delete(&self, table: &str, key: &str) -> Result<bool, StorageError> {
        self.inner.delete(table, key).await
    }

    async fn query(&self, table: &str, filter: Option<&Filter>) -> Result<Vec<Record>, StorageError> {
        self.inner.query(table, filter).await
    }
}

type CallLog = Arc<Mutex<Vec<(Value, ToolContext)>>>;

/// Orchestrator over in-memory storage with the default policy rules.
///
/// Tools: `echo`, `broken` (fails), `strict` (validates `text`),
/// `shell_exec` and `download_file` (echo, for the default rules).
pub(crate) struct OrchestratorFixture {
    pub orchestrator: Arc<Orchestrator>,
    pub llm: FakeLlmClient,
    pub bus: EventBus,
    pub storage: Arc<dyn Storage>,
    pub clock: FakeClock,
    pub echo_calls: CallLog,
    pub shell_calls: CallLog,
}

impl OrchestratorFixture {
    pub async fn new() -> Self {
        Self::build(true, Arc::new(MemoryStorage::new())).await
    }

    /// No model configured: the built-in interpreter answers.
    pub async fn without_model() -> Self {
        Self::build(false, Arc::new(MemoryStorage::new())).await
    }

    pub async fn with_storage(storage: Arc<dyn Storage>) -> Self {
        Self::build(true, storage).await
    }

    async fn build(with_model: bool, storage: Arc<dyn Storage>) -> Self {
        let clock = FakeClock::new();
        let ids: Arc<SequentialIdGen> = Arc::new(SequentialIdGen::new());
        let bus = EventBus::new(Arc::new(clock.clone()));
        let policy = PolicyEngine::init(bus.clone(), Arc::clone(&storage), ids.clone())
            .await
            .unwrap();
        let scheduler = JobScheduler::new(
            bus.clone(),
            Arc::clone(&storage),
            Arc::new(clock.clone()),
            ids.clone(),
        );

        let tools = ToolRegistry::new();
        let echo = EchoTool::new("echo", "util");
        let echo_calls = echo.calls();
        let shell = EchoTool::new("shell_exec", "system");
        let shell_calls = shell.calls();
        tools.register(Arc::new(echo));
        tools.register(Arc::new(EchoTool::new("broken", "util").failing()));
        tools.register(Arc::new(EchoTool::new("strict", "util").validating()));
        tools.register(Arc::new(shell));
        tools.register(Arc::new(EchoTool::new("download_file", "web")));

        let llm = FakeLlmClient::new();
        let model: Option<Arc<dyn LlmClient>> = if with_model {
            Some(Arc::new(llm.clone()))
        } else {
            None
        };
        let orchestrator = Orchestrator::new(OrchestratorDeps {
            bus: bus.clone(),
            storage: Arc::clone(&storage),
            policy: Arc::new(policy),
            tools,
            scheduler,
            llm: model,
            clock: Arc::new(clock.clone()),
            ids,
        })
        .await
        .unwrap();

        Self {
            orchestrator,
            llm,
            bus,
            storage,
            clock,
            echo_calls,
            shell_calls,
        }
    }

    pub fn events(&self, name: &str) -> Vec<wd_core::Event> {
        self.bus.history(Some(name), None)
    }
}

/// Let spawned driver tasks make progress.
pub(crate) async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
