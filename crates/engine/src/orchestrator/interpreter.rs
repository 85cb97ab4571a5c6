// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Built-in command interpreter used when no model is configured.

use chrono::{DateTime, Utc};

const USAGE: &str = "No language model is configured; only built-in commands are available.\n\
    \n  tools   list registered tools\
    \n  time    show the current time\
    \n  help    show this message";

pub(crate) fn interpret(input: &str, tool_names: &[String], now_ms: u64) -> String {
    let command = input.trim().to_lowercase();
    match command.as_str() {
        "tools" | "list tools" => {
            if tool_names.is_empty() {
                "No tools are registered.".to_string()
            } else {
                format!("Available tools: {}", tool_names.join(", "))
            }
        }
        "time" => {
            let now = DateTime::<Utc>::from_timestamp_millis(now_ms as i64).unwrap_or_default();
            format!("The current time is {}", now.format("%Y-%m-%d %H:%M:%S UTC"))
        }
        _ => USAGE.to_string(),
    }
}

#[cfg(test)]
#[path = "interpreter_tests.rs"]
mod tests;
