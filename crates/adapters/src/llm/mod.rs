// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Language-model adapters

mod openai;

pub use openai::{OpenAiClient, OpenAiConfig};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeLlmClient, LlmCall};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use wd_core::{Role, ToolSchema};

/// Errors from model requests
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("model request timed out")]
    Timeout,
    #[error("model request failed: {0}")]
    Transport(String),
    #[error("model returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid model response: {0}")]
    Decode(String),
    #[error("model error: {0}")]
    Upstream(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout
        } else if e.is_decode() {
            LlmError::Decode(e.to_string())
        } else {
            LlmError::Transport(e.to_string())
        }
    }
}

/// A function call the model asked for. `arguments` is raw JSON text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// One message of the conversation sent to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    /// Assistant turn that requested tool calls.
    pub fn assistant_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }

    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    Other,
}

impl FinishReason {
    pub fn parse(s: Option<&str>) -> Self {
        match s {
            Some("stop") | None => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("tool_calls") | Some("function_call") => FinishReason::ToolCalls,
            Some(_) => FinishReason::Other,
        }
    }
}

/// The model's answer to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
}

impl Completion {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
            finish_reason: FinishReason::Stop,
        }
    }

    pub fn calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: None,
            tool_calls,
            finish_reason: FinishReason::ToolCalls,
        }
    }

    /// Trimmed content, or `""` when absent.
    pub fn text_content(&self) -> &str {
        self.content.as_deref().map(str::trim).unwrap_or("")
    }
}

/// Adapter for chat-completion models with function calling
#[async_trait]
pub trait LlmClient: Send + Sync + 'static {
    /// Model identifier, for logs and status.
    fn model(&self) -> &str;

    /// Send the conversation and the callable tools; return the next completion.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSchema],
    ) -> Result<Completion, LlmError>;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
