// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scope and target matching for policy rules.

use wd_core::{PolicyRequest, PolicyScope, PolicyTarget, ScopeKind};

/// `*`, exact, or glob match.
pub(crate) fn pattern_matches(pattern: &str, value: &str) -> bool {
    if pattern == "*" || pattern == value {
        return true;
    }
    glob::Pattern::new(pattern)
        .map(|p| p.matches(value))
        .unwrap_or(false)
}

fn any_matches(patterns: &[String], value: Option<&str>) -> bool {
    match value {
        Some(value) => patterns.iter().any(|p| pattern_matches(p, value)),
        None => false,
    }
}

/// Whether a rule's scope makes it a candidate for `request`.
pub(crate) fn scope_matches(scope: &PolicyScope, request: &PolicyRequest) -> bool {
    let value = match scope.kind {
        ScopeKind::Global => return true,
        ScopeKind::Tool => Some(request.tool.as_str()),
        ScopeKind::Channel => request.channel_id.as_deref(),
        ScopeKind::Agent => request.agent_id.as_deref(),
        ScopeKind::Workflow => request.workflow_id.as_deref(),
    };
    any_matches(&scope.members, value)
}

/// Whether every non-empty target list matches `request`.
///
/// Domains match when they occur anywhere in the host of `parameters.url`
/// (case-insensitive); the path and query are never consulted.
pub(crate) fn target_matches(target: &PolicyTarget, request: &PolicyRequest) -> bool {
    if !target.tools.is_empty() && !any_matches(&target.tools, Some(&request.tool)) {
        return false;
    }
    if !target.commands.is_empty() {
        let Some(command) = request.param_str("command") else {
            return false;
        };
        if !target.commands.iter().any(|p| command_matches(p, command)) {
            return false;
        }
    }
    if !target.domains.is_empty() {
        let Some(url) = request.param_str("url") else {
            return false;
        };
        let host = url_host(url);
        if !target
            .domains
            .iter()
            .any(|d| d == "*" || host.contains(&d.to_ascii_lowercase()))
        {
            return false;
        }
    }
    if !target.users.is_empty() && !any_matches(&target.users, request.user_id.as_deref()) {
        return false;
    }
    true
}

/// Command pattern: exact, first word exact, or glob against the whole command.
fn command_matches(pattern: &str, command: &str) -> bool {
    let command = command.trim();
    let first_word = command.split_whitespace().next().unwrap_or("");
    pattern == command || pattern == first_word || pattern_matches(pattern, command)
}

/// Lowercased host of a URL, or of a bare `host/path` string.
pub(crate) fn url_host(url: &str) -> String {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or("");
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    let host = match host_port.strip_prefix('[') {
        Some(v6) => v6.split(']').next().unwrap_or(""),
        None => host_port.split(':').next().unwrap_or(""),
    };
    host.to_ascii_lowercase()
}

#[cfg(test)]
#[path = "matcher_tests.rs"]
mod tests;
