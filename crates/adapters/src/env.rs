// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the adapters crate.

use std::time::Duration;

fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Model request timeout (default: 120s).
pub fn llm_timeout() -> Duration {
    parse_duration_ms("WARDEN_LLM_TIMEOUT_MS").unwrap_or(Duration::from_secs(120))
}
