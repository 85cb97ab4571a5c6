// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::time::Duration;

use crate::lifecycle::LifecycleError;

/// Resolve state directory: WARDEN_STATE_DIR > XDG_STATE_HOME/warden > ~/.local/state/warden
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Some(dir) = non_empty("WARDEN_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Some(xdg) = non_empty("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("warden"));
    }
    let home = dirs::home_dir().ok_or(LifecycleError::NoStateDir)?;
    Ok(home.join(".local/state/warden"))
}

/// Shared IPC token override. When unset the token file is used.
pub fn ipc_token() -> Option<String> {
    non_empty("WARDEN_IPC_TOKEN")
}

pub fn llm_url() -> Option<String> {
    non_empty("WARDEN_LLM_URL")
}

pub fn llm_model() -> Option<String> {
    non_empty("WARDEN_LLM_MODEL")
}

pub fn llm_api_key() -> Option<String> {
    non_empty("WARDEN_LLM_API_KEY")
}

/// Handler execution timeout override
pub fn handler_timeout() -> Option<Duration> {
    std::env::var("WARDEN_HANDLER_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

fn non_empty(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}
