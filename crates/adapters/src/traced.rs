// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced adapter wrappers for consistent observability

use crate::llm::{ChatMessage, Completion, LlmClient, LlmError};
use async_trait::async_trait;
use tracing::Instrument;
use wd_core::ToolSchema;

/// Wrapper that adds tracing to any LlmClient
#[derive(Clone)]
pub struct TracedLlm<L> {
    inner: L,
}

impl<L> TracedLlm<L> {
    pub fn new(inner: L) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<L: LlmClient> LlmClient for TracedLlm<L> {
    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSchema],
    ) -> Result<Completion, LlmError> {
        let span = tracing::info_span!("llm.complete", model = self.inner.model());
        async {
            tracing::debug!(
                messages = messages.len(),
                tools = tools.len(),
                "requesting"
            );
            let start = std::time::Instant::now();
            let result = self.inner.complete(messages, tools).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;
            match &result {
                Ok(c) => tracing::info!(
                    elapsed_ms,
                    tool_calls = c.tool_calls.len(),
                    finish = ?c.finish_reason,
                    "completion received"
                ),
                Err(e) => tracing::error!(elapsed_ms, error = %e, "completion failed"),
            }
            result
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
