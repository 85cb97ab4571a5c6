// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for the daemon crate.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Notify;
use wd_adapters::{FakeLlmClient, LlmClient};
use wd_core::{FakeClock, SequentialIdGen, ToolContext, ToolParameter, ToolResult, ToolSchema};
use wd_engine::{Tool, ToolError};
use wd_storage::MemoryStorage;

use crate::lifecycle::build_orchestrator;
use crate::listener::{dispatch, DaemonCtx, HandlerError};

/// Echoes its `text` parameter.
pub(crate) struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "echo".to_string(),
            description: "Echo text back".to_string(),
            parameters: vec![ToolParameter::required("text", "string", "Text to echo")],
            category: "util".to_string(),
            permissions: Vec::new(),
        }
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        Ok(ToolResult::ok(
            params.get("text").cloned().unwrap_or(Value::Null),
        ))
    }
}

/// In-memory daemon context driven through [`dispatch`].
pub(crate) struct TestDaemon {
    pub ctx: Arc<DaemonCtx>,
    pub llm: FakeLlmClient,
}

impl TestDaemon {
    pub async fn new() -> Self {
        Self::build(true).await
    }

    pub async fn without_model() -> Self {
        Self::build(false).await
    }

    async fn build(with_model: bool) -> Self {
        let llm = FakeLlmClient::new();
        let client: Option<Arc<dyn LlmClient>> = if with_model {
            Some(Arc::new(llm.clone()))
        } else {
            None
        };
        let orchestrator = build_orchestrator(
            Arc::new(MemoryStorage::new()),
            client,
            Arc::new(FakeClock::new()),
            Arc::new(SequentialIdGen::new()),
        )
        .await
        .unwrap();
        orchestrator.tools().register(Arc::new(EchoTool));
        Self {
            ctx: Arc::new(DaemonCtx {
                orchestrator,
                start_time: Instant::now(),
                shutdown: Arc::new(Notify::new()),
            }),
            llm,
        }
    }

    pub async fn call(&self, method: &str, params: Value) -> Result<Value, HandlerError> {
        dispatch(&self.ctx, method, params).await
    }
}
