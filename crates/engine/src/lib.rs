// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Warden control-plane engine: event bus, policy, tools, jobs, orchestrator

mod error;
pub mod event_bus;
pub mod jobs;
pub mod orchestrator;
pub mod policy;
pub mod tools;

#[cfg(test)]
mod test_helpers;

pub use error::{JobError, OrchestratorError, PolicyError, ToolError};
pub use event_bus::{EventBus, HandlerError, SubscriptionId, HISTORY_CAPACITY};
pub use jobs::{Capabilities, JobHost, JobScheduler, SpawnRequest, MAX_SKILL_DEPTH};
pub use orchestrator::{
    CallContext, MessageOutcome, Orchestrator, OrchestratorDeps, OutcomeStatus,
};
pub use policy::{default_rules, PolicyEngine, RuleFilter, RULES_TABLE};
pub use tools::{Tool, ToolRegistry};
