//! Error types for the Capstan engine
//!
//! Two layers mirror the two phases of a run: `LoadError` covers everything
//! that can go wrong while turning a definition into a `PipelineSpec`, and
//! `EngineError` covers execution. Test failures are part of the taxonomy
//! because they are reported, not fatal mid-run.

use thiserror::Error;

/// Result type alias for definition loading
pub type LoadResult<T> = std::result::Result<T, LoadError>;

/// Result type alias for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Errors raised while loading a pipeline definition
#[derive(Debug, Error)]
pub enum LoadError {
    /// The definition is missing required fields or is structurally invalid
    #[error("malformed pipeline definition: {0}")]
    MalformedSpec(String),

    /// A step names an action kind the engine does not recognize
    #[error("unknown step type '{0}'")]
    UnknownStepType(String),
}

/// Errors raised while executing a pipeline
#[derive(Debug, Error)]
pub enum EngineError {
    /// The identity provider rejected the token exchange
    #[error("identity provider denied the token exchange: {0}")]
    AuthDenied(String),

    /// The identity provider did not answer within the configured wait
    #[error("identity provider did not respond within {timeout_secs}s")]
    AuthTimeout {
        /// Bounded wait that elapsed
        timeout_secs: u64,
    },

    /// Package source unreachable, version conflict, or unreadable lock file
    #[error("dependency resolution failed: {0}")]
    DependencyResolution(String),

    /// A step's command exited non-zero (fail-fast)
    #[error("step '{name}' failed with exit code {exit_code}")]
    StepFailed {
        /// Name of the failing step
        name: String,
        /// Exit code reported by the step command
        exit_code: i32,
    },

    /// The test harness reported failing tests (recorded, run continues)
    #[error("{failing} test(s) failed")]
    TestsFailed {
        /// Number of failing tests reported by the harness
        failing: u32,
    },

    /// Report upload failed on the network or was rejected by the collector
    #[error("failed to publish report: {0}")]
    Publish(String),

    /// Ambient I/O failure while driving a step
    #[error("i/o error: {0}")]
    Io(String),
}

impl EngineError {
    /// Check if this error came from the credential broker
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthDenied(_) | Self::AuthTimeout { .. })
    }

    /// Check if this error is a reported (non-fatal mid-run) test failure
    pub fn is_tests_failed(&self) -> bool {
        matches!(self, Self::TestsFailed { .. })
    }

    /// Check if this error is a publish failure
    pub fn is_publish(&self) -> bool {
        matches!(self, Self::Publish(_))
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
