// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use wd_core::ToolParameter;

fn echo_schema() -> ToolSchema {
    ToolSchema {
        name: "echo".to_string(),
        description: "Echo text".to_string(),
        parameters: vec![ToolParameter::required("text", "string", "What to say")],
        category: "util".to_string(),
        permissions: Vec::new(),
    }
}

#[test]
fn prompt_lists_tools_and_parameters() {
    let prompt = system_prompt(&[echo_schema()], None);
    assert!(prompt.contains("- echo: Echo text"));
    assert!(prompt.contains("text (string, required): What to say"));
    assert!(!prompt.contains(SILENT));
}

#[test]
fn background_prompt_carries_task_and_silent_rule() {
    let prompt = system_prompt(&[], Some("watch the disk"));
    assert!(prompt.contains("(none)"));
    assert!(prompt.contains("watch the disk"));
    assert!(prompt.contains("reply with exactly SILENT"));
}

#[test]
fn history_folds_tool_turns_into_notes() {
    let turns = vec![
        Turn::new(Role::User, "hi", 1),
        Turn::tool("c1", "echo", "hi back", 2),
        Turn::new(Role::Assistant, "done", 3),
    ];
    let messages = render_history(&turns);
    assert_eq!(messages[0], ChatMessage::user("hi"));
    assert_eq!(
        messages[1],
        ChatMessage::system("Earlier result from echo: hi back")
    );
    assert_eq!(messages[2], ChatMessage::assistant("done"));
}
