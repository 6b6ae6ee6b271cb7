//! Run outcome types
//!
//! One `RunResult` is accumulated per executed step, in execution order,
//! and is read-only after step completion. The `RunReport` collects them
//! together with the run's final status.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::report::{CoverageReport, PublishAck};

/// Outcome of a single executed step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub step: String,
    pub status: StepStatus,
    pub exit_code: i32,
    pub duration_ms: u64,
    pub stdout: String,
    pub stderr: String,
    /// Error description when the step did not succeed cleanly
    pub error: Option<String>,
}

/// Per-step completion status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Succeeded,
    Failed,
    /// The step was never executed because an earlier step halted the run
    Skipped,
    /// The step failed but its configuration declared tolerance, so the
    /// failure was logged and the run continued
    Tolerated,
}

/// Final status of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Succeeded,
    Failed,
}

/// Report for one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub pipeline: String,
    pub status: RunStatus,
    pub results: Vec<RunResult>,
    /// First fatal error encountered, if any
    pub error: Option<String>,
    /// Failing-test count when the harness reported failures
    pub tests_failed: Option<u32>,
    pub coverage: Option<CoverageReport>,
    pub publish_ack: Option<PublishAck>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl RunReport {
    /// Creates an empty report for a run that is about to start
    pub fn begin(run_id: Uuid, pipeline: impl Into<String>) -> Self {
        Self {
            run_id,
            pipeline: pipeline.into(),
            status: RunStatus::Succeeded,
            results: Vec::new(),
            error: None,
            tests_failed: None,
            coverage: None,
            publish_ack: None,
            started_at: chrono::Utc::now(),
            finished_at: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// Marks the run failed with the first fatal error, keeping an earlier
    /// error if one was already recorded
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = RunStatus::Failed;
        if self.error.is_none() {
            self.error = Some(error.into());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_begin_is_success() {
        let report = RunReport::begin(Uuid::new_v4(), "ci");
        assert!(report.is_success());
        assert!(report.results.is_empty());
        assert!(report.error.is_none());
    }

    #[test]
    fn test_fail_keeps_first_error() {
        let mut report = RunReport::begin(Uuid::new_v4(), "ci");
        report.fail("auth denied");
        report.fail("later failure");
        assert!(!report.is_success());
        assert_eq!(report.error.as_deref(), Some("auth denied"));
    }
}
