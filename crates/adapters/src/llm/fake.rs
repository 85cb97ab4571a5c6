// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake model client for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{ChatMessage, Completion, LlmClient, LlmError, ToolCall};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use wd_core::ToolSchema;

/// Recorded model request
#[derive(Debug, Clone)]
pub struct LlmCall {
    pub messages: Vec<ChatMessage>,
    pub tool_names: Vec<String>,
}

struct FakeLlmState {
    script: VecDeque<Result<Completion, String>>,
    fallback: Option<Completion>,
    calls: Vec<LlmCall>,
}

/// Fake model client that replays a script of completions.
///
/// Once the script is exhausted it returns the fallback completion if one is
/// set, otherwise an upstream error.
#[derive(Clone)]
pub struct FakeLlmClient {
    inner: Arc<Mutex<FakeLlmState>>,
}

impl Default for FakeLlmClient {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeLlmState {
                script: VecDeque::new(),
                fallback: None,
                calls: Vec::new(),
            })),
        }
    }
}

impl FakeLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a completion.
    pub fn push(&self, completion: Completion) -> &Self {
        self.inner.lock().script.push_back(Ok(completion));
        self
    }

    /// Queue a plain text reply.
    pub fn push_text(&self, text: &str) -> &Self {
        self.push(Completion::text(text))
    }

    /// Queue a reply requesting one tool call.
    pub fn push_call(&self, id: &str, name: &str, arguments: &str) -> &Self {
        self.push(Completion::calls(vec![ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }]))
    }

    /// Queue an upstream failure.
    pub fn push_error(&self, message: &str) -> &Self {
        self.inner.lock().script.push_back(Err(message.to_string()));
        self
    }

    /// Completion returned once the script runs out.
    pub fn set_fallback(&self, completion: Completion) -> &Self {
        self.inner.lock().fallback = Some(completion);
        self
    }

    /// Get all recorded requests
    pub fn calls(&self) -> Vec<LlmCall> {
        self.inner.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.inner.lock().calls.len()
    }
}

#[async_trait]
impl LlmClient for FakeLlmClient {
    fn model(&self) -> &str {
        "fake"
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSchema],
    ) -> Result<Completion, LlmError> {
        let mut state = self.inner.lock();
        state.calls.push(LlmCall {
            messages: messages.to_vec(),
            tool_names: tools.iter().map(|t| t.name.clone()).collect(),
        });
        match state.script.pop_front() {
            Some(Ok(completion)) => Ok(completion),
            Some(Err(message)) => Err(LlmError::Upstream(message)),
            None => state
                .fallback
                .clone()
                .ok_or_else(|| LlmError::Upstream("fake script exhausted".to_string())),
        }
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
