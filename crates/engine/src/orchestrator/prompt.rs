// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! System prompt and history rendering for the tool loop.

use std::fmt::Write;
use wd_adapters::ChatMessage;
use wd_core::{Role, ToolSchema, Turn};

/// Reply a background agent gives when it has nothing to report.
pub const SILENT: &str = "SILENT";

/// Sent on the extra turn that asks the model to stop calling tools.
pub(crate) const ANSWER_FROM_RESULTS: &str = "Answer now using the tool results above. \
     Do not call any more tools; summarize what they returned.";

const PREAMBLE: &str = "You are Warden, an operator assistant running as a local daemon. \
     You act by calling tools. Prefer one tool call at a time and explain results briefly.";

/// Build the system prompt. `assignment` is set for background sub-agent runs.
pub(crate) fn system_prompt(tools: &[ToolSchema], assignment: Option<&str>) -> String {
    let mut prompt = String::from(PREAMBLE);
    prompt.push_str("\n\nAvailable tools:\n");
    if tools.is_empty() {
        prompt.push_str("(none)\n");
    }
    for tool in tools {
        let _ = writeln!(prompt, "- {}: {}", tool.name, tool.description);
        for param in &tool.parameters {
            let _ = writeln!(
                prompt,
                "    {} ({}{}): {}",
                param.name,
                param.kind,
                if param.required { ", required" } else { "" },
                param.description
            );
        }
    }
    if let Some(task) = assignment {
        let _ = write!(
            prompt,
            "\nYou are a background agent. Your assigned task:\n{task}\n\n\
             If there is nothing worth reporting, reply with exactly {SILENT} and nothing else."
        );
    }
    prompt
}

/// Replay stored turns as chat messages.
///
/// Tool turns from earlier rounds have no matching assistant call in the
/// window, so they are folded into system notes.
pub(crate) fn render_history(turns: &[Turn]) -> Vec<ChatMessage> {
    turns
        .iter()
        .map(|turn| match turn.role {
            Role::System => ChatMessage::system(&turn.content),
            Role::User => ChatMessage::user(&turn.content),
            Role::Assistant => ChatMessage::assistant(&turn.content),
            Role::Tool => ChatMessage::system(format!(
                "Earlier result from {}: {}",
                turn.tool_name.as_deref().unwrap_or("tool"),
                turn.content
            )),
        })
        .collect()
}

#[cfg(test)]
#[path = "prompt_tests.rs"]
mod tests;
