//! Step executor
//!
//! Drives a validated `PipelineSpec` to completion: one step at a time, in
//! the loader's topological order, fail-fast on the first fatal error.
//! Scoped credentials are resolved through the broker before a step's body
//! runs, so the credential invariant holds no matter what the handler does.
//!
//! Two outcomes deliberately do not halt the run: a reported test failure
//! (coverage still publishes, the run fails at summary time) and a publish
//! error on a step whose configuration tolerates it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use capstan_core::domain::credential::Credential;
use capstan_core::domain::pipeline::{PipelineSpec, Step};
use capstan_core::domain::run::{RunReport, RunResult, StepStatus};
use capstan_core::error::EngineError;

use crate::broker::{CredentialBroker, HttpTokenExchange};
use crate::config::EngineConfig;
use crate::context::RunContext;
use crate::installer::Installer;
use crate::process::ShellRunner;
use crate::steps::{HandlerRegistry, HttpReportSink, StepOutput};

/// Pipeline executor
pub struct Executor {
    config: EngineConfig,
    broker: Arc<CredentialBroker>,
    registry: HandlerRegistry,
}

impl Executor {
    /// Creates an executor with the production wiring
    pub fn new(config: EngineConfig) -> Self {
        let runner = Arc::new(ShellRunner);
        let broker = Arc::new(CredentialBroker::new(
            Arc::new(HttpTokenExchange::new()),
            config.auth_timeout,
        ));
        let installer = Arc::new(Installer::new(runner.clone(), config.package_tool.clone()));
        let sink = Arc::new(HttpReportSink::new(config.upload_token.clone()));
        let registry =
            HandlerRegistry::standard(&config, runner, installer, sink, broker.clone());

        Self {
            config,
            broker,
            registry,
        }
    }

    /// Creates an executor from pre-wired parts (test seam)
    pub fn with_parts(
        config: EngineConfig,
        broker: Arc<CredentialBroker>,
        registry: HandlerRegistry,
    ) -> Self {
        Self {
            config,
            broker,
            registry,
        }
    }

    /// Executes the pipeline and returns the run report
    ///
    /// `extra_env` is overlaid on the pipeline's own env bindings; this is
    /// how the invoking environment passes values in.
    pub async fn run(
        &self,
        spec: &PipelineSpec,
        extra_env: HashMap<String, String>,
    ) -> RunReport {
        let run_id = Uuid::new_v4();
        let mut env = spec.env.clone();
        env.extend(extra_env);

        let ctx = RunContext::new(run_id, self.config.workspace_root.clone(), env);
        let mut report = RunReport::begin(run_id, &spec.name);

        info!(
            "Starting run {} of pipeline '{}' ({} steps)",
            run_id,
            spec.name,
            spec.steps.len()
        );

        if let Err(e) = std::fs::create_dir_all(&ctx.workspace) {
            report.fail(format!("failed to create workspace: {}", e));
            return self.finish(&ctx, spec, report);
        }

        for (idx, step) in spec.steps.iter().enumerate() {
            info!(
                "Executing step {}/{}: {}",
                idx + 1,
                spec.steps.len(),
                step.name
            );
            ctx.log_info(format!("Starting step: {}", step.name));

            // Credential invariant: every declared scope is covered by a
            // live credential before the step body runs
            let credentials = match self.resolve_scopes(step).await {
                Ok(credentials) => credentials,
                Err(e) => {
                    error!("Step '{}' credential acquisition failed: {}", step.name, e);
                    ctx.log_error(format!("Step '{}' blocked: {}", step.name, e));
                    report.results.push(RunResult {
                        step: step.name.clone(),
                        status: StepStatus::Failed,
                        exit_code: 1,
                        duration_ms: 0,
                        stdout: String::new(),
                        stderr: String::new(),
                        error: Some(e.to_string()),
                    });
                    report.fail(e.to_string());
                    break;
                }
            };

            let Some(handler) = self.registry.get(step.kind()) else {
                let e = EngineError::Io(format!("no handler registered for '{}'", step.kind()));
                report.results.push(RunResult {
                    step: step.name.clone(),
                    status: StepStatus::Failed,
                    exit_code: 1,
                    duration_ms: 0,
                    stdout: String::new(),
                    stderr: String::new(),
                    error: Some(e.to_string()),
                });
                report.fail(e.to_string());
                break;
            };

            let started = Instant::now();
            let outcome = handler.run(step, &ctx, &credentials).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(output) => {
                    if !self.record_output(&ctx, step, output, duration_ms, &mut report) {
                        break;
                    }
                }
                Err(e) => {
                    error!("Step '{}' failed: {}", step.name, e);
                    ctx.log_error(format!("Step '{}' failed: {}", step.name, e));
                    report.results.push(RunResult {
                        step: step.name.clone(),
                        status: StepStatus::Failed,
                        exit_code: 1,
                        duration_ms,
                        stdout: String::new(),
                        stderr: String::new(),
                        error: Some(e.to_string()),
                    });
                    report.fail(e.to_string());
                    break;
                }
            }
        }

        self.finish(&ctx, spec, report)
    }

    /// Completes the report: unreached steps become skipped results and the
    /// finish time is stamped
    fn finish(&self, ctx: &RunContext, spec: &PipelineSpec, mut report: RunReport) -> RunReport {
        // Steps the halt never reached still get a result, marked skipped
        for step in spec.steps.iter().skip(report.results.len()) {
            report.results.push(RunResult {
                step: step.name.clone(),
                status: StepStatus::Skipped,
                exit_code: 0,
                duration_ms: 0,
                stdout: String::new(),
                stderr: String::new(),
                error: None,
            });
        }

        report.finished_at = Some(chrono::Utc::now());
        if report.is_success() {
            info!("Run {} completed successfully", report.run_id);
            ctx.log_info("Pipeline completed successfully".to_string());
        } else {
            error!(
                "Run {} failed: {}",
                report.run_id,
                report.error.as_deref().unwrap_or("unknown error")
            );
        }

        report
    }

    /// Acquires one credential per declared scope, in declaration order
    async fn resolve_scopes(&self, step: &Step) -> Result<Vec<Credential>, EngineError> {
        let mut credentials = Vec::with_capacity(step.scopes.len());
        for scope in &step.scopes {
            credentials.push(self.broker.acquire(scope).await?);
        }
        Ok(credentials)
    }

    /// Folds a handler output into the report
    ///
    /// Returns false when the run must halt (fail-fast).
    fn record_output(
        &self,
        ctx: &RunContext,
        step: &Step,
        output: StepOutput,
        duration_ms: u64,
        report: &mut RunReport,
    ) -> bool {
        if let Some(coverage) = output.coverage {
            report.coverage = Some(coverage);
        }
        if let Some(ack) = output.publish_ack {
            report.publish_ack = Some(ack);
        }

        if let Some(failing) = output.failing_tests {
            // Reported, not fatal mid-run: later steps (publish) still
            // execute, the run fails at summary time
            let e = EngineError::TestsFailed { failing };
            warn!("Step '{}': {}", step.name, e);
            report.results.push(RunResult {
                step: step.name.clone(),
                status: StepStatus::Failed,
                exit_code: output.exit_code,
                duration_ms,
                stdout: output.stdout,
                stderr: output.stderr,
                error: Some(e.to_string()),
            });
            report.tests_failed = Some(failing);
            report.fail(e.to_string());
            return true;
        }

        if let Some(degradation) = output.tolerated {
            report.results.push(RunResult {
                step: step.name.clone(),
                status: StepStatus::Tolerated,
                exit_code: output.exit_code,
                duration_ms,
                stdout: output.stdout,
                stderr: output.stderr,
                error: Some(degradation),
            });
            return true;
        }

        if output.exit_code != 0 {
            let e = EngineError::StepFailed {
                name: step.name.clone(),
                exit_code: output.exit_code,
            };
            error!("{}", e);
            ctx.log_error(e.to_string());
            report.results.push(RunResult {
                step: step.name.clone(),
                status: StepStatus::Failed,
                exit_code: output.exit_code,
                duration_ms,
                stdout: output.stdout,
                stderr: output.stderr,
                error: Some(e.to_string()),
            });
            report.fail(e.to_string());
            return false;
        }

        ctx.log_info(format!("Step '{}' completed", step.name));
        report.results.push(RunResult {
            step: step.name.clone(),
            status: StepStatus::Succeeded,
            exit_code: 0,
            duration_ms,
            stdout: output.stdout,
            stderr: output.stderr,
            error: None,
        });
        true
    }
}
