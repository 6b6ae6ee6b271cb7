//! Checkout step handler
//!
//! Clones the repository into the run workspace. Each run gets a fresh
//! uuid-named workspace, so a shallow clone of the requested reference is
//! always the right move; there is no prior clone to update.

use async_trait::async_trait;
use tracing::info;

use capstan_core::domain::credential::Credential;
use capstan_core::domain::pipeline::{Step, StepAction};
use capstan_core::error::{EngineError, EngineResult};

use crate::context::RunContext;
use crate::process::CommandRunner;
use crate::steps::{StepHandler, StepOutput};

pub struct StandardCheckoutHandler {
    runner: std::sync::Arc<dyn CommandRunner>,
}

impl StandardCheckoutHandler {
    pub fn new(runner: std::sync::Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl StepHandler for StandardCheckoutHandler {
    async fn run(
        &self,
        step: &Step,
        ctx: &RunContext,
        _credentials: &[Credential],
    ) -> EngineResult<StepOutput> {
        let StepAction::Checkout {
            repository,
            reference,
        } = &step.action
        else {
            return Err(EngineError::Io(format!(
                "checkout handler dispatched for step '{}' with a different action",
                step.name
            )));
        };

        let source = ctx.source_dir();
        let env = ctx.step_env(&step.env);

        info!("Cloning {} at {}", repository, reference);
        let args = vec![
            "clone".to_string(),
            "--depth".to_string(),
            "1".to_string(),
            "--branch".to_string(),
            reference.clone(),
            repository.clone(),
            source.to_string_lossy().to_string(),
        ];

        let output = self
            .runner
            .run("git", &args, &env, &ctx.workspace)
            .await
            .map_err(|e| EngineError::Io(e.to_string()))?;

        if output.success() {
            ctx.log_info(format!("Checked out {} at {}", repository, reference));
        }
        Ok(StepOutput::from_command(output))
    }
}
