// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Step-program interpreter for tasks and skills.

use super::Capabilities;
use crate::error::JobError;
use serde_json::Value;
use wd_core::ScriptStep;

/// Run steps in order. Each step sees `{{input}}` and the previous step's
/// output as `{{prev}}`; the last output is the program's output.
pub(crate) async fn run_script(
    steps: &[ScriptStep],
    input: &str,
    caps: &Capabilities,
) -> Result<String, JobError> {
    let mut prev = String::new();
    for (index, step) in steps.iter().enumerate() {
        if caps.is_cancelled() {
            return Err(JobError::Cancelled);
        }
        let params = step.render_params(input, &prev);
        prev = match step.skill_name() {
            Some(skill) => {
                let skill_input = params
                    .get("input")
                    .and_then(Value::as_str)
                    .map_or_else(|| prev.clone(), str::to_string);
                caps.call_skill(skill, &skill_input).await?
            }
            None => {
                let result = caps.call_tool(&step.call, params).await;
                if !result.success {
                    return Err(JobError::Execution(format!(
                        "step {} ({}) failed: {}",
                        index + 1,
                        step.call,
                        result.error.as_deref().unwrap_or("unknown error")
                    )));
                }
                result.to_content()
            }
        };
    }
    Ok(prev)
}
