// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capability registry.
//!
//! Tools are looked up by name at runtime. The registry keeps registration
//! order, which is the order tools are presented to the model.

use crate::error::ToolError;
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use wd_core::{ToolContext, ToolResult, ToolSchema, ValidationResult};

/// A named, schema-described unit of action.
#[async_trait]
pub trait Tool: Send + Sync + 'static {
    fn schema(&self) -> ToolSchema;

    /// Optional parameter validation run before `execute`.
    fn validate(&self, _params: &Value) -> Option<ValidationResult> {
        None
    }

    /// Run the tool. When `ctx.dry_run` is set the tool must simulate.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError>;
}

/// Shared registry of tools, keyed by name.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Arc<Mutex<IndexMap<String, Arc<dyn Tool>>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.schema().name;
        if self.tools.lock().insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "replaced registered tool");
        }
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.tools.lock().shift_remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.lock().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.lock().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.lock().keys().cloned().collect()
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        let tools: Vec<_> = self.tools.lock().values().cloned().collect();
        tools.iter().map(|t| t.schema()).collect()
    }

    /// Distinct tool categories, sorted.
    pub fn categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = self
            .schemas()
            .into_iter()
            .map(|s| s.category)
            .filter(|c| !c.is_empty())
            .collect();
        categories.sort();
        categories.dedup();
        categories
    }

    pub fn len(&self) -> usize {
        self.tools.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
