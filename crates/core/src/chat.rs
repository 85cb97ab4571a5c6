// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conversation turns and inbound messages.

use serde::{Deserialize, Serialize};

/// User id assumed when a front-end does not supply one.
pub const DEFAULT_USER: &str = "local";
/// Channel id assumed when a front-end does not supply one.
pub const DEFAULT_CHANNEL: &str = "cli";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One stored conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    pub timestamp_ms: u64,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>, timestamp_ms: u64) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            tool_name: None,
            timestamp_ms,
        }
    }

    pub fn tool(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_call_id: Some(call_id.into()),
            tool_name: Some(tool_name.into()),
            timestamp_ms,
        }
    }
}

/// A message arriving from a front-end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMessage {
    pub content: String,
    #[serde(default = "default_user")]
    pub user_id: String,
    #[serde(default = "default_channel")]
    pub channel_id: String,
}

fn default_user() -> String {
    DEFAULT_USER.to_string()
}

fn default_channel() -> String {
    DEFAULT_CHANNEL.to_string()
}

impl IncomingMessage {
    pub fn new(content: impl Into<String>, user_id: &str, channel_id: &str) -> Self {
        Self {
            content: content.into(),
            user_id: user_id.to_string(),
            channel_id: channel_id.to_string(),
        }
    }
}

#[cfg(test)]
#[path = "chat_tests.rs"]
mod tests;
