// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rules seeded into an empty policy store.

use wd_core::{PolicyAction, PolicyRule, PolicyScope, PolicyTarget, ScopeKind};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn rule(
    id: &str,
    name: &str,
    description: &str,
    scope: PolicyScope,
    action: PolicyAction,
    target: PolicyTarget,
    priority: i32,
) -> PolicyRule {
    PolicyRule {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        scope,
        action,
        target,
        priority,
        enabled: true,
    }
}

/// The fixed default policy, in seeding order.
pub fn default_rules() -> Vec<PolicyRule> {
    vec![
        rule(
            "default-deny-subagent-shell",
            "Deny sub-agent shell",
            "Sub-agents may not execute shell commands",
            PolicyScope::of(ScopeKind::Agent, &["subagent:*"]),
            PolicyAction::Deny,
            PolicyTarget {
                tools: strings(&["shell_exec"]),
                ..PolicyTarget::default()
            },
            200,
        ),
        rule(
            "default-confirm-downloads",
            "Confirm downloads",
            "Downloading files requires confirmation",
            PolicyScope::of(ScopeKind::Tool, &["download_file", "web_download"]),
            PolicyAction::RequireConfirmation,
            PolicyTarget::default(),
            100,
        ),
        rule(
            "default-confirm-package-commands",
            "Confirm package commands",
            "Package installs and raw network fetches from the shell require confirmation",
            PolicyScope::of(ScopeKind::Tool, &["shell_exec"]),
            PolicyAction::RequireConfirmation,
            PolicyTarget {
                commands: strings(&[
                    "apt",
                    "apt-get",
                    "brew",
                    "npm",
                    "pip",
                    "pip3",
                    "cargo install*",
                    "curl",
                    "wget",
                ]),
                ..PolicyTarget::default()
            },
            90,
        ),
        // Hosts match by substring, so `github.com.example.net` is allowed too.
        rule(
            "default-allow-known-domains",
            "Allow known domains",
            "Well-known documentation and code hosts are allowed",
            PolicyScope::global(),
            PolicyAction::Allow,
            PolicyTarget {
                domains: strings(&["github.com", "wikipedia.org", "docs.rs", "crates.io"]),
                ..PolicyTarget::default()
            },
            60,
        ),
        rule(
            "default-confirm-network",
            "Confirm unfamiliar domains",
            "Network access to unfamiliar domains requires confirmation",
            PolicyScope::global(),
            PolicyAction::RequireConfirmation,
            PolicyTarget {
                domains: strings(&["*"]),
                ..PolicyTarget::default()
            },
            50,
        ),
    ]
}
