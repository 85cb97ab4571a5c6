// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! wd-core: data types shared by the warden daemon crates

pub mod audit;
pub mod chat;
pub mod clock;
pub mod event;
pub mod id;
pub mod job;
pub mod policy;
pub mod tool;
pub mod workflow;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use audit::{AuditEntry, AuditOutcome};
pub use chat::{IncomingMessage, Role, Turn, DEFAULT_CHANNEL, DEFAULT_USER};
pub use clock::{Clock, FakeClock, SystemClock};
pub use event::{names, Event, WILDCARD};
pub use id::{IdGen, SequentialIdGen, UuidIdGen};
pub use job::{JobCode, JobId, JobInfo, JobKind, JobStatus, ScriptStep};
pub use policy::{
    PolicyAction, PolicyDecision, PolicyRequest, PolicyRule, PolicyRulePatch, PolicyScope,
    PolicyTarget, ScopeKind,
};
pub use tool::{ToolContext, ToolParameter, ToolResult, ToolSchema, ValidationResult};
pub use workflow::{Workflow, WorkflowId, WorkflowStatus, MAIN_AGENT};
