//! Execution context for pipeline runs
//!
//! Contains all state scoped to one run:
//! - Log buffer for collecting run logs
//! - Workspace path for run files
//! - Environment bindings steps are allowed to see
//!
//! Constructed at run start, torn down after the final step. Steps never
//! see the ambient process environment; only what the context carries.

use capstan_core::domain::log::{LogEntry, LogLevel};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Execution context shared across one pipeline run
pub struct RunContext {
    pub run_id: Uuid,

    /// Per-run workspace directory
    pub workspace: PathBuf,

    /// Pipeline-level environment bindings
    base_env: HashMap<String, String>,

    /// Log buffer with entries
    log_buffer: Mutex<Vec<LogEntry>>,
}

impl RunContext {
    /// Creates a new run context under the given workspace base
    pub fn new(
        run_id: Uuid,
        workspace_base: PathBuf,
        base_env: HashMap<String, String>,
    ) -> Arc<Self> {
        let workspace = workspace_base.join(run_id.to_string());

        Arc::new(Self {
            run_id,
            workspace,
            base_env,
            log_buffer: Mutex::new(Vec::new()),
        })
    }

    /// Directory the checkout step populates and later steps run in
    pub fn source_dir(&self) -> PathBuf {
        self.workspace.join("src")
    }

    /// Environment visible to a step: pipeline env overlaid with the
    /// step's own bindings. Nothing else leaks in.
    pub fn step_env(&self, step_env: &HashMap<String, String>) -> HashMap<String, String> {
        let mut env = self.base_env.clone();
        env.extend(step_env.iter().map(|(k, v)| (k.clone(), v.clone())));
        env
    }

    /// Adds a log entry to the buffer
    pub fn add_log(&self, entry: LogEntry) {
        let mut buffer = self.log_buffer.lock().unwrap();
        buffer.push(entry);
    }

    /// Logs a debug message
    pub fn log_debug(&self, message: impl Into<String>) {
        self.add_log(LogEntry::now(LogLevel::Debug, message));
    }

    /// Logs an info message
    pub fn log_info(&self, message: impl Into<String>) {
        self.add_log(LogEntry::now(LogLevel::Info, message));
    }

    /// Logs a warning message
    pub fn log_warning(&self, message: impl Into<String>) {
        self.add_log(LogEntry::now(LogLevel::Warning, message));
    }

    /// Logs an error message
    pub fn log_error(&self, message: impl Into<String>) {
        self.add_log(LogEntry::now(LogLevel::Error, message));
    }

    /// Drains all log entries from the buffer
    pub fn drain_logs(&self) -> Vec<LogEntry> {
        let mut buffer = self.log_buffer.lock().unwrap();
        buffer.drain(..).collect()
    }
}
