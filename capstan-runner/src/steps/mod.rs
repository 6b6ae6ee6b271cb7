//! Step handlers
//!
//! One handler per step kind, behind the `StepHandler` trait so the
//! executor can be driven with mocks. Handlers report completed commands
//! through `StepOutput`; the executor decides what an exit code means
//! (fail-fast, reported test failures, tolerated publish errors).

pub mod checkout;
pub mod publish;
pub mod setup;
pub mod shell;
pub mod test;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use capstan_core::domain::credential::Credential;
use capstan_core::domain::pipeline::{Step, StepKind};
use capstan_core::domain::report::{CoverageReport, PublishAck};
use capstan_core::error::EngineResult;

use crate::broker::CredentialBroker;
use crate::config::EngineConfig;
use crate::context::RunContext;
use crate::installer::Installer;
use crate::process::CommandRunner;

pub use checkout::StandardCheckoutHandler;
pub use publish::{HttpReportSink, ReportSink, StandardPublishHandler};
pub use setup::StandardSetupHandler;
pub use shell::StandardRunHandler;
pub use test::StandardTestHandler;

/// What a step handler produced
#[derive(Debug, Clone, Default)]
pub struct StepOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Coverage report reference, when the step produced one
    pub coverage: Option<CoverageReport>,
    /// Collector acknowledgement, when the step uploaded a report
    pub publish_ack: Option<PublishAck>,
    /// Failing-test count when the harness ran and reported failures
    pub failing_tests: Option<u32>,
    /// Set when a failure occurred but the step's configuration declared
    /// tolerance; carries the degradation description
    pub tolerated: Option<String>,
}

impl StepOutput {
    /// Output for a cleanly completed command
    pub fn from_command(output: crate::process::CommandOutput) -> Self {
        Self {
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
            ..Self::default()
        }
    }

    /// Output for a step that did no external work
    pub fn ok() -> Self {
        Self::default()
    }
}

/// Service trait for executing one pipeline step
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// Runs the step to completion in the given context
    ///
    /// `credentials` holds one credential per scope the step declared, in
    /// declaration order; empty for unscoped steps.
    async fn run(
        &self,
        step: &Step,
        ctx: &RunContext,
        credentials: &[Credential],
    ) -> EngineResult<StepOutput>;
}

/// Registry mapping step kinds to their handlers
pub struct HandlerRegistry {
    handlers: HashMap<StepKind, Arc<dyn StepHandler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Creates the standard registry with the production handlers
    pub fn standard(
        config: &EngineConfig,
        runner: Arc<dyn CommandRunner>,
        installer: Arc<Installer>,
        sink: Arc<dyn ReportSink>,
        broker: Arc<CredentialBroker>,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(
            StepKind::Checkout,
            Arc::new(StandardCheckoutHandler::new(runner.clone())),
        );
        registry.register(
            StepKind::Setup,
            Arc::new(StandardSetupHandler::new(runner.clone())),
        );
        registry.register(
            StepKind::Authenticate,
            Arc::new(AuthenticateHandler::new(broker)),
        );
        registry.register(StepKind::Install, Arc::new(InstallHandler::new(installer)));
        registry.register(
            StepKind::Test,
            Arc::new(StandardTestHandler::new(runner.clone(), config.harness.clone())),
        );
        registry.register(StepKind::Publish, Arc::new(StandardPublishHandler::new(sink)));
        registry.register(StepKind::Run, Arc::new(StandardRunHandler::new(runner)));
        registry
    }

    pub fn register(&mut self, kind: StepKind, handler: Arc<dyn StepHandler>) {
        self.handlers.insert(kind, handler);
    }

    pub fn get(&self, kind: StepKind) -> Option<Arc<dyn StepHandler>> {
        self.handlers.get(&kind).cloned()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Handler for the authenticate step
///
/// Binds the run to the declared identity provider and warms the cache
/// for the declared scope, so later scoped steps hit a live credential.
pub struct AuthenticateHandler {
    broker: Arc<CredentialBroker>,
}

impl AuthenticateHandler {
    pub fn new(broker: Arc<CredentialBroker>) -> Self {
        Self { broker }
    }
}

#[async_trait]
impl StepHandler for AuthenticateHandler {
    async fn run(
        &self,
        step: &Step,
        ctx: &RunContext,
        _credentials: &[Credential],
    ) -> EngineResult<StepOutput> {
        use capstan_core::domain::pipeline::StepAction;

        let StepAction::Authenticate {
            provider_url,
            service_account,
            scope,
        } = &step.action
        else {
            return Err(capstan_core::error::EngineError::Io(format!(
                "authenticate handler dispatched for step '{}' with a different action",
                step.name
            )));
        };

        self.broker.set_provider(crate::broker::ProviderBinding {
            provider_url: provider_url.clone(),
            service_account: service_account.clone(),
        });

        self.broker.acquire(scope).await?;
        ctx.log_info(format!("Authenticated for scope '{}'", scope));

        Ok(StepOutput::ok())
    }
}

/// Handler for the install step
pub struct InstallHandler {
    installer: Arc<Installer>,
}

impl InstallHandler {
    pub fn new(installer: Arc<Installer>) -> Self {
        Self { installer }
    }
}

#[async_trait]
impl StepHandler for InstallHandler {
    async fn run(
        &self,
        step: &Step,
        ctx: &RunContext,
        _credentials: &[Credential],
    ) -> EngineResult<StepOutput> {
        use capstan_core::domain::pipeline::StepAction;

        let StepAction::Install { requirements } = &step.action else {
            return Err(capstan_core::error::EngineError::Io(format!(
                "install handler dispatched for step '{}' with a different action",
                step.name
            )));
        };

        let env_dir = self.installer.install(ctx, requirements).await?;
        ctx.log_info(format!("Environment ready at {}", env_dir.display()));

        Ok(StepOutput::ok())
    }
}
