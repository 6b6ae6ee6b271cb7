//! Dependency installer
//!
//! Materializes an isolated environment directory from an ordered list of
//! requirement files. Idempotent within a run: the lock description is
//! fingerprinted by file contents, and a repeat install with an unchanged
//! fingerprint is a no-op returning the already-materialized directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use capstan_core::error::{EngineError, EngineResult};

use crate::context::RunContext;
use crate::process::CommandRunner;

/// Dependency installer for one run
pub struct Installer {
    runner: Arc<dyn CommandRunner>,
    package_tool: String,

    /// Registry of materialized environments: fingerprint -> env dir
    installed: Mutex<HashMap<u64, PathBuf>>,
}

impl Installer {
    pub fn new(runner: Arc<dyn CommandRunner>, package_tool: String) -> Self {
        Self {
            runner,
            package_tool,
            installed: Mutex::new(HashMap::new()),
        }
    }

    /// Installs the given requirement files into an isolated environment
    ///
    /// Returns the environment directory. Repeat calls with byte-identical
    /// requirement files reuse the directory without invoking the package
    /// tool again.
    ///
    /// # Errors
    /// `DependencyResolution` when a requirement file cannot be read or
    /// the package tool exits non-zero.
    pub async fn install(
        &self,
        ctx: &RunContext,
        requirements: &[PathBuf],
    ) -> EngineResult<PathBuf> {
        let fingerprint = self.fingerprint(ctx, requirements)?;

        if let Some(env_dir) = self.installed.lock().unwrap().get(&fingerprint) {
            debug!(
                "Lock description unchanged (fingerprint {:x}), reusing {}",
                fingerprint,
                env_dir.display()
            );
            return Ok(env_dir.clone());
        }

        let env_dir = ctx.workspace.join(format!("env-{:x}", fingerprint));
        std::fs::create_dir_all(&env_dir)?;

        info!(
            "Installing {} requirement file(s) into {}",
            requirements.len(),
            env_dir.display()
        );

        let mut args = vec![
            "install".to_string(),
            "--target".to_string(),
            env_dir.to_string_lossy().to_string(),
        ];
        for file in requirements {
            args.push("-r".to_string());
            args.push(self.resolve(ctx, file).to_string_lossy().to_string());
        }

        let output = self
            .runner
            .run(&self.package_tool, &args, &ctx.step_env(&HashMap::new()), &ctx.source_dir())
            .await
            .map_err(|e| EngineError::DependencyResolution(e.to_string()))?;

        if !output.success() {
            return Err(EngineError::DependencyResolution(format!(
                "{} exited with code {}: {}",
                self.package_tool,
                output.exit_code,
                output.stderr.trim()
            )));
        }

        self.installed
            .lock()
            .unwrap()
            .insert(fingerprint, env_dir.clone());

        Ok(env_dir)
    }

    /// Requirement paths are relative to the checked-out source tree
    fn resolve(&self, ctx: &RunContext, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            ctx.source_dir().join(file)
        }
    }

    /// Fingerprints the ordered requirement files by name and contents
    fn fingerprint(&self, ctx: &RunContext, requirements: &[PathBuf]) -> EngineResult<u64> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        for file in requirements {
            let path = self.resolve(ctx, file);
            let contents = std::fs::read(&path).map_err(|e| {
                EngineError::DependencyResolution(format!(
                    "cannot read requirement file {}: {}",
                    path.display(),
                    e
                ))
            })?;
            file.hash(&mut hasher);
            contents.hash(&mut hasher);
        }
        Ok(hasher.finish())
    }
}
