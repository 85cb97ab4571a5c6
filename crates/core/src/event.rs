// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event records carried by the in-process event bus.
//!
//! Events are named with a `category:action` convention and carry an
//! arbitrary JSON payload. They are immutable once emitted.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wildcard subscription name: receives every event.
pub const WILDCARD: &str = "*";

/// A single emitted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    #[serde(default)]
    pub payload: Value,
    pub timestamp_ms: u64,
}

impl Event {
    pub fn new(name: impl Into<String>, payload: Value, timestamp_ms: u64) -> Self {
        Self {
            name: name.into(),
            payload,
            timestamp_ms,
        }
    }

    /// Category portion of the name (`"agent"` for `"agent:started"`).
    pub fn category(&self) -> &str {
        self.name.split(':').next().unwrap_or(&self.name)
    }

    /// Fetch a string field from an object payload.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

/// Well-known event names.
pub mod names {
    // -- policy --
    pub const POLICY_DECISION: &str = "policy:decision";
    pub const POLICY_RULE_ADDED: &str = "policy:rule_added";
    pub const POLICY_RULE_REMOVED: &str = "policy:rule_removed";
    pub const POLICY_RULE_UPDATED: &str = "policy:rule_updated";

    // -- agent --
    pub const AGENT_STARTED: &str = "agent:started";
    pub const AGENT_RESPONSE: &str = "agent:response";
    pub const AGENT_ERROR: &str = "agent:error";

    // -- tool --
    pub const TOOL_EXECUTING: &str = "tool:executing";
    pub const TOOL_COMPLETED: &str = "tool:completed";
    pub const TOOL_ERROR: &str = "tool:error";
    pub const CONFIRMATION_REQUIRED: &str = "confirmation:required";

    // -- workflow --
    pub const WORKFLOW_CREATED: &str = "workflow:created";
    pub const WORKFLOW_UPDATED: &str = "workflow:updated";

    // -- daemon --
    pub const DAEMON_SHUTDOWN: &str = "daemon:shutdown";
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
