// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Policy rule, request and decision types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// What a matching rule does to the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyAction {
    Allow,
    Deny,
    RequireConfirmation,
}

impl PolicyAction {
    /// Whether execution may proceed (confirmation is fire-and-forget).
    pub fn permits(self) -> bool {
        !matches!(self, PolicyAction::Deny)
    }
}

impl fmt::Display for PolicyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PolicyAction::Allow => "allow",
            PolicyAction::Deny => "deny",
            PolicyAction::RequireConfirmation => "require-confirmation",
        };
        f.write_str(s)
    }
}

/// Which dimension of a request a rule's scope selects on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Global,
    Tool,
    Channel,
    Agent,
    Workflow,
}

/// Selects which requests a rule is a candidate for.
///
/// `members` are glob patterns; `*` matches everything. Ignored for
/// [`ScopeKind::Global`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyScope {
    pub kind: ScopeKind,
    #[serde(default)]
    pub members: Vec<String>,
}

impl PolicyScope {
    pub fn global() -> Self {
        Self {
            kind: ScopeKind::Global,
            members: Vec::new(),
        }
    }

    pub fn of(kind: ScopeKind, members: &[&str]) -> Self {
        Self {
            kind,
            members: members.iter().map(|m| m.to_string()).collect(),
        }
    }
}

/// Narrows a rule beyond its scope. Every non-empty list must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyTarget {
    /// Tool-name patterns (exact or glob).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,
    /// Command patterns matched against the `command` parameter.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<String>,
    /// Domain substrings matched against the `url` parameter's host; `*` = any URL.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<String>,
    /// User allow-list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<String>,
}

impl PolicyTarget {
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
            && self.commands.is_empty()
            && self.domains.is_empty()
            && self.users.is_empty()
    }
}

fn default_enabled() -> bool {
    true
}

/// A scoped, prioritized authorization rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub scope: PolicyScope,
    pub action: PolicyAction,
    #[serde(default)]
    pub target: PolicyTarget,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// Partial update for a rule; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyRulePatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub scope: Option<PolicyScope>,
    #[serde(default)]
    pub action: Option<PolicyAction>,
    #[serde(default)]
    pub target: Option<PolicyTarget>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

impl PolicyRule {
    /// Apply a patch in place. The id never changes.
    pub fn apply(&mut self, patch: PolicyRulePatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(scope) = patch.scope {
            self.scope = scope;
        }
        if let Some(action) = patch.action {
            self.action = action;
        }
        if let Some(target) = patch.target {
            self.target = target;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(enabled) = patch.enabled {
            self.enabled = enabled;
        }
    }
}

/// A capability invocation awaiting authorization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRequest {
    pub tool: String,
    #[serde(default = "default_request_action")]
    pub action: String,
    #[serde(default)]
    pub parameters: Value,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
}

fn default_request_action() -> String {
    "execute".to_string()
}

impl PolicyRequest {
    pub fn execute(tool: impl Into<String>, parameters: Value) -> Self {
        Self {
            tool: tool.into(),
            action: default_request_action(),
            parameters,
            ..Self::default()
        }
    }

    /// String parameter by key, if present.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(Value::as_str)
    }
}

/// Outcome of one evaluation. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub action: PolicyAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<PolicyRule>,
    pub reason: String,
}

impl PolicyDecision {
    /// Decision when no rule matched.
    pub fn default_allow() -> Self {
        Self {
            allowed: true,
            action: PolicyAction::Allow,
            rule: None,
            reason: "default allow".to_string(),
        }
    }

    /// Decision produced by a matching rule.
    pub fn from_rule(rule: &PolicyRule) -> Self {
        let reason = match rule.action {
            PolicyAction::Allow => format!("allowed by rule '{}'", rule.name),
            PolicyAction::Deny => format!("denied by rule '{}': {}", rule.name, rule.description),
            PolicyAction::RequireConfirmation => {
                format!("confirmation required by rule '{}': {}", rule.name, rule.description)
            }
        };
        Self {
            allowed: rule.action.permits(),
            action: rule.action,
            rule: Some(rule.clone()),
            reason,
        }
    }

    pub fn requires_confirmation(&self) -> bool {
        self.action == PolicyAction::RequireConfirmation
    }
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
