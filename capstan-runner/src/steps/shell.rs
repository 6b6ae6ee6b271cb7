//! Generic run step handler

use async_trait::async_trait;

use capstan_core::domain::credential::Credential;
use capstan_core::domain::pipeline::{Step, StepAction};
use capstan_core::error::{EngineError, EngineResult};

use crate::context::RunContext;
use crate::process::CommandRunner;
use crate::steps::{StepHandler, StepOutput};

pub struct StandardRunHandler {
    runner: std::sync::Arc<dyn CommandRunner>,
}

impl StandardRunHandler {
    pub fn new(runner: std::sync::Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl StepHandler for StandardRunHandler {
    async fn run(
        &self,
        step: &Step,
        ctx: &RunContext,
        _credentials: &[Credential],
    ) -> EngineResult<StepOutput> {
        let StepAction::Run { command, args } = &step.action else {
            return Err(EngineError::Io(format!(
                "run handler dispatched for step '{}' with a different action",
                step.name
            )));
        };

        let env = ctx.step_env(&step.env);
        let output = self
            .runner
            .run(command, args, &env, &ctx.source_dir())
            .await
            .map_err(|e| EngineError::Io(e.to_string()))?;

        Ok(StepOutput::from_command(output))
    }
}
