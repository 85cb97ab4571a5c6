// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the engine

use thiserror::Error;
use wd_adapters::LlmError;
use wd_core::{JobKind, JobStatus};
use wd_storage::StorageError;

/// Errors from policy rule management
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("rule not found: {0}")]
    RuleNotFound(String),
    #[error("rule already exists: {0}")]
    DuplicateRule(String),
    #[error("invalid rule: {0}")]
    InvalidRule(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("corrupt stored rule {id}: {message}")]
    CorruptRule { id: String, message: String },
}

/// Errors from the background job scheduler
#[derive(Debug, Error)]
pub enum JobError {
    #[error("job not found: {0}")]
    NotFound(String),
    #[error("a {kind} named '{name}' already exists")]
    DuplicateName { kind: JobKind, name: String },
    #[error("{kind} '{name}' is {actual}; this operation requires it to be {expected}")]
    InvalidState {
        kind: JobKind,
        name: String,
        expected: JobStatus,
        actual: JobStatus,
    },
    #[error("invalid job: {0}")]
    Invalid(String),
    #[error("parent job not found: {0}")]
    ParentNotFound(String),
    #[error("skill nesting exceeds depth {0}")]
    DepthExceeded(usize),
    #[error("{0}")]
    Execution(String),
    #[error("execution cancelled")]
    Cancelled,
    #[error("job host unavailable")]
    HostUnavailable,
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Errors a tool may raise during execution; converted to a failed result.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0}")]
    Failed(String),
    #[error(transparent)]
    Job(#[from] JobError),
}

/// Errors from the orchestrator
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("the language model request failed: {0}")]
    Model(#[from] LlmError),
    #[error("no language model is configured")]
    NoModel,
    #[error("run cancelled")]
    Cancelled,
    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),
}
