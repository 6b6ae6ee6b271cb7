//! Test & coverage step handler
//!
//! Invokes the test harness with the requested worker count and coverage
//! flags, then reads the failing-test count out of the harness summary.
//! Harness exit 1 means tests failed: that outcome is recorded, not fatal,
//! so the coverage report still reaches the publish step. Any other
//! non-zero exit is a hard step failure.

use async_trait::async_trait;
use tracing::info;

use capstan_core::domain::credential::Credential;
use capstan_core::domain::pipeline::{Step, StepAction};
use capstan_core::domain::report::{CoverageFormat, CoverageReport};
use capstan_core::error::{EngineError, EngineResult};

use crate::context::RunContext;
use crate::process::CommandRunner;
use crate::steps::{StepHandler, StepOutput};

pub struct StandardTestHandler {
    runner: std::sync::Arc<dyn CommandRunner>,
    harness: String,
}

impl StandardTestHandler {
    pub fn new(runner: std::sync::Arc<dyn CommandRunner>, harness: String) -> Self {
        Self { runner, harness }
    }
}

#[async_trait]
impl StepHandler for StandardTestHandler {
    async fn run(
        &self,
        step: &Step,
        ctx: &RunContext,
        _credentials: &[Credential],
    ) -> EngineResult<StepOutput> {
        let StepAction::Test {
            targets,
            parallelism,
            coverage_target,
            coverage_formats,
        } = &step.action
        else {
            return Err(EngineError::Io(format!(
                "test handler dispatched for step '{}' with a different action",
                step.name
            )));
        };

        let mut args: Vec<String> = targets.clone();
        args.push("-n".to_string());
        args.push(parallelism.as_flag_value());

        match coverage_target {
            Some(target) => args.push(format!("--cov={}", target)),
            None => args.push("--cov".to_string()),
        }
        for format in coverage_formats {
            match format {
                CoverageFormat::Xml => args.push("--cov-report=xml".to_string()),
                CoverageFormat::TermMissing => args.push("--cov-report=term-missing".to_string()),
            }
        }

        let env = ctx.step_env(&step.env);
        let output = self
            .runner
            .run(&self.harness, &args, &env, &ctx.source_dir())
            .await
            .map_err(|e| EngineError::Io(e.to_string()))?;

        // Exit 1 is the harness convention for "ran, some tests failed";
        // anything above that is a harness-level failure
        let failing_tests = match output.exit_code {
            0 => None,
            1 => Some(parse_failing_count(&output.stdout).unwrap_or(1)),
            _ => {
                return Ok(StepOutput::from_command(output));
            }
        };

        let coverage = coverage_formats
            .contains(&CoverageFormat::Xml)
            .then(|| CoverageReport {
                path: ctx.source_dir().join("coverage.xml"),
                formats: coverage_formats.clone(),
            });

        match failing_tests {
            Some(n) => {
                info!("Harness reported {} failing test(s)", n);
                ctx.log_error(format!("{} test(s) failed", n));
            }
            None => ctx.log_info("All tests passed".to_string()),
        }

        Ok(StepOutput {
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
            coverage,
            failing_tests,
            ..StepOutput::default()
        })
    }
}

/// Pull the failing-test count out of a harness summary line such as
/// `==== 2 failed, 3 passed in 0.41s ====`
fn parse_failing_count(stdout: &str) -> Option<u32> {
    for line in stdout.lines().rev() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        for window in tokens.windows(2) {
            if window[1].starts_with("failed") {
                if let Ok(count) = window[0].parse::<u32>() {
                    return Some(count);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::CommandOutput;
    use capstan_core::domain::pipeline::Parallelism;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;

    struct RecordingRunner {
        args: Mutex<Vec<String>>,
        stdout: String,
        exit_code: i32,
    }

    impl RecordingRunner {
        fn new(stdout: &str, exit_code: i32) -> Arc<Self> {
            Arc::new(Self {
                args: Mutex::new(Vec::new()),
                stdout: stdout.to_string(),
                exit_code,
            })
        }
    }

    #[async_trait]
    impl CommandRunner for RecordingRunner {
        async fn run(
            &self,
            _program: &str,
            args: &[String],
            _env: &HashMap<String, String>,
            _cwd: &Path,
        ) -> anyhow::Result<CommandOutput> {
            *self.args.lock().unwrap() = args.to_vec();
            Ok(CommandOutput {
                stdout: self.stdout.clone(),
                stderr: String::new(),
                exit_code: self.exit_code,
            })
        }
    }

    fn test_step() -> Step {
        Step {
            name: "test".to_string(),
            action: StepAction::Test {
                targets: vec!["./tests".to_string()],
                parallelism: Parallelism::Auto,
                coverage_target: Some("app".to_string()),
                coverage_formats: vec![CoverageFormat::Xml, CoverageFormat::TermMissing],
            },
            needs: vec![],
            scopes: vec![],
            env: HashMap::new(),
        }
    }

    fn ctx() -> Arc<RunContext> {
        RunContext::new(
            Uuid::new_v4(),
            std::env::temp_dir().join("capstan-test"),
            HashMap::new(),
        )
    }

    #[test]
    fn test_parse_failing_count() {
        let summary = "collected 5 items\n\n==== 2 failed, 3 passed in 0.41s ====\n";
        assert_eq!(parse_failing_count(summary), Some(2));

        let clean = "==== 5 passed in 0.2s ====";
        assert_eq!(parse_failing_count(clean), None);

        assert_eq!(parse_failing_count(""), None);
    }

    #[tokio::test]
    async fn test_builds_harness_command() {
        let runner = RecordingRunner::new("==== 5 passed in 0.2s ====", 0);
        let handler = StandardTestHandler::new(runner.clone(), "pytest".to_string());

        let out = handler.run(&test_step(), &ctx(), &[]).await.unwrap();
        assert_eq!(out.exit_code, 0);
        assert!(out.failing_tests.is_none());

        let args = runner.args.lock().unwrap().clone();
        assert_eq!(
            args,
            vec![
                "./tests",
                "-n",
                "auto",
                "--cov=app",
                "--cov-report=xml",
                "--cov-report=term-missing",
            ]
        );
    }

    #[tokio::test]
    async fn test_failing_tests_reported_with_coverage() {
        let runner = RecordingRunner::new("==== 2 failed, 3 passed in 0.4s ====", 1);
        let handler = StandardTestHandler::new(runner, "pytest".to_string());

        let out = handler.run(&test_step(), &ctx(), &[]).await.unwrap();
        assert_eq!(out.failing_tests, Some(2));
        // coverage still produced so the publish step can upload it
        assert!(out.coverage.is_some());
    }

    #[tokio::test]
    async fn test_harness_crash_is_not_tests_failed() {
        let runner = RecordingRunner::new("internal error", 3);
        let handler = StandardTestHandler::new(runner, "pytest".to_string());

        let out = handler.run(&test_step(), &ctx(), &[]).await.unwrap();
        assert_eq!(out.exit_code, 3);
        assert!(out.failing_tests.is_none());
        assert!(out.coverage.is_none());
    }
}
