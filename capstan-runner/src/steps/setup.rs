//! Runtime setup step handler
//!
//! Verifies the requested runtime is present at the requested version.
//! Provisioning the runtime itself belongs to the machine image, so this
//! step is a check, not an install.

use async_trait::async_trait;

use capstan_core::domain::credential::Credential;
use capstan_core::domain::pipeline::{Step, StepAction};
use capstan_core::error::{EngineError, EngineResult};

use crate::context::RunContext;
use crate::process::CommandRunner;
use crate::steps::{StepHandler, StepOutput};

pub struct StandardSetupHandler {
    runner: std::sync::Arc<dyn CommandRunner>,
}

impl StandardSetupHandler {
    pub fn new(runner: std::sync::Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl StepHandler for StandardSetupHandler {
    async fn run(
        &self,
        step: &Step,
        ctx: &RunContext,
        _credentials: &[Credential],
    ) -> EngineResult<StepOutput> {
        let StepAction::Setup { runtime, version } = &step.action else {
            return Err(EngineError::Io(format!(
                "setup handler dispatched for step '{}' with a different action",
                step.name
            )));
        };

        let env = ctx.step_env(&step.env);
        let output = self
            .runner
            .run(runtime, &["--version".to_string()], &env, &ctx.workspace)
            .await
            .map_err(|e| EngineError::Io(e.to_string()))?;

        if !output.success() {
            return Ok(StepOutput::from_command(output));
        }

        let reported = if output.stdout.trim().is_empty() {
            output.stderr.trim().to_string()
        } else {
            output.stdout.trim().to_string()
        };

        if !version_matches(&reported, version) {
            ctx.log_error(format!(
                "Runtime {} reports '{}', expected version {}",
                runtime, reported, version
            ));
            return Ok(StepOutput {
                exit_code: 1,
                stderr: format!("runtime version mismatch: wanted {}, got '{}'", version, reported),
                ..StepOutput::default()
            });
        }

        ctx.log_info(format!("Runtime ready: {}", reported));
        Ok(StepOutput::from_command(output))
    }
}

/// Match the requested version against the runtime's report on a
/// component boundary, so "3.1" does not accept 3.12.1 and "3.12" does
/// not accept a hypothetical 3.121
fn version_matches(reported: &str, wanted: &str) -> bool {
    let bytes = reported.as_bytes();
    let mut search_from = 0;
    while let Some(offset) = reported[search_from..].find(wanted) {
        let begin = search_from + offset;
        let end = begin + wanted.len();
        let boundary_before = begin == 0 || {
            let c = bytes[begin - 1] as char;
            !c.is_ascii_digit() && c != '.'
        };
        let boundary_after = end == reported.len() || {
            let c = bytes[end] as char;
            c == '.' || c.is_whitespace()
        };
        if boundary_before && boundary_after {
            return true;
        }
        search_from = begin + 1;
    }
    false
}
