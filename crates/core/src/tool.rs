// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capability (tool) schema, invocation context and result types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One declared parameter of a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    /// JSON type name: `string`, `number`, `boolean`, `object`, `array`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

impl ToolParameter {
    pub fn required(name: &str, kind: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            description: description.to_string(),
            required: true,
        }
    }

    pub fn optional(name: &str, kind: &str, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }
}

/// Self-description a tool advertises to the model and to IPC clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<ToolParameter>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl ToolSchema {
    /// Render the schema as a JSON-Schema object for function-calling models.
    pub fn json_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for p in &self.parameters {
            properties.insert(
                p.name.clone(),
                serde_json::json!({ "type": p.kind, "description": p.description }),
            );
            if p.required {
                required.push(Value::String(p.name.clone()));
            }
        }
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Names of required parameters missing (or null) in `params`.
    pub fn missing_required(&self, params: &Value) -> Vec<String> {
        self.parameters
            .iter()
            .filter(|p| p.required)
            .filter(|p| params.get(&p.name).map_or(true, Value::is_null))
            .map(|p| p.name.clone())
            .collect()
    }
}

/// Ambient information passed to every tool execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolContext {
    pub workflow_id: String,
    pub user_id: String,
    pub channel_id: String,
    /// Tools must simulate rather than act.
    #[serde(default)]
    pub dry_run: bool,
}

/// Outcome of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(default)]
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(output: impl Into<Value>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: Value::Null,
            error: Some(error.into()),
        }
    }

    /// Text handed back to the model as the tool turn content.
    pub fn to_content(&self) -> String {
        if self.success {
            match &self.output {
                Value::String(s) => s.clone(),
                Value::Null => "ok".to_string(),
                other => other.to_string(),
            }
        } else {
            format!("Error: {}", self.error.as_deref().unwrap_or("unknown error"))
        }
    }
}

/// Result of a tool's own parameter validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    pub fn invalid(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

#[cfg(test)]
#[path = "tool_tests.rs"]
mod tests;
