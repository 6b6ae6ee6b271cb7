//! Subprocess execution seam
//!
//! Step handlers run external tools through the `CommandRunner` trait so
//! the executor can be exercised with a mock. The production `ShellRunner`
//! spawns the tool with a cleared environment; only the bindings the step
//! declared are visible.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Captured output of a completed command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Seam for running external commands
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs a command to completion with only the given environment
    /// visible, capturing stdout and stderr
    async fn run(
        &self,
        program: &str,
        args: &[String],
        env: &HashMap<String, String>,
        cwd: &Path,
    ) -> Result<CommandOutput>;
}

/// Production command runner backed by tokio subprocesses
pub struct ShellRunner;

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        env: &HashMap<String, String>,
        cwd: &Path,
    ) -> Result<CommandOutput> {
        debug!("Executing: {} {:?} in {}", program, args, cwd.display());

        std::fs::create_dir_all(cwd)
            .with_context(|| format!("failed to create working directory {}", cwd.display()))?;

        let mut command = tokio::process::Command::new(program);
        command.args(args).current_dir(cwd).env_clear().envs(env);

        // PATH has to survive the env scrub or nothing resolves
        if let Ok(path) = std::env::var("PATH") {
            command.env("PATH", path);
        }

        let output = command
            .output()
            .await
            .with_context(|| format!("failed to execute '{}'", program))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code().unwrap_or(1);

        if !output.status.success() {
            debug!(
                "Command failed: {} exit_code={} stderr='{}'",
                program,
                exit_code,
                stderr.trim()
            );
        } else {
            debug!(
                "Command completed: exit_code={}, stdout_len={}, stderr_len={}",
                exit_code,
                stdout.len(),
                stderr.len()
            );
        }

        Ok(CommandOutput {
            stdout,
            stderr,
            exit_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shell_runner_captures_stdout() {
        let runner = ShellRunner;
        let out = runner
            .run(
                "echo",
                &["hello".to_string()],
                &HashMap::new(),
                &std::env::temp_dir(),
            )
            .await
            .unwrap();

        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_shell_runner_scopes_environment() {
        let runner = ShellRunner;
        let env = HashMap::from([("CAPSTAN_TEST_VAR".to_string(), "visible".to_string())]);

        let out = runner
            .run(
                "sh",
                &["-c".to_string(), "echo ${CAPSTAN_TEST_VAR}-${HOME}".to_string()],
                &env,
                &std::env::temp_dir(),
            )
            .await
            .unwrap();

        // declared binding is visible, ambient HOME is not
        assert_eq!(out.stdout.trim(), "visible-");
    }

    #[tokio::test]
    async fn test_shell_runner_nonzero_exit() {
        let runner = ShellRunner;
        let out = runner
            .run(
                "sh",
                &["-c".to_string(), "exit 3".to_string()],
                &HashMap::new(),
                &std::env::temp_dir(),
            )
            .await
            .unwrap();

        assert!(!out.success());
        assert_eq!(out.exit_code, 3);
    }

    #[tokio::test]
    async fn test_shell_runner_missing_program() {
        let runner = ShellRunner;
        let result = runner
            .run(
                "capstan-definitely-not-installed",
                &[],
                &HashMap::new(),
                &std::env::temp_dir(),
            )
            .await;

        assert!(result.is_err());
    }
}
