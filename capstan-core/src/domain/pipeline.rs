//! Pipeline definition types
//!
//! A `PipelineSpec` is the validated, immutable output of the definition
//! loader. Steps are already in topological order; the `needs` edges that
//! produced that order are kept so the executor contract stays order-agnostic.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::domain::credential::Scope;
use crate::domain::report::CoverageFormat;

/// Validated pipeline definition
///
/// Immutable once loaded. Steps appear in execution (topological) order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub name: String,
    pub trigger: Trigger,
    /// Pipeline-level environment bindings visible to every step
    pub env: HashMap<String, String>,
    /// Permission scopes the pipeline declares up front
    pub permissions: Vec<Scope>,
    pub steps: Vec<Step>,
}

/// Event that invokes the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Invoked as a callable entry point by another workflow
    WorkflowCall,
    Push,
    Manual,
}

impl Trigger {
    /// Parse a trigger name as written in a definition
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "workflow_call" | "call" => Some(Self::WorkflowCall),
            "push" => Some(Self::Push),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// A single unit of work in a pipeline
///
/// Created at load time, never mutated. Ordering dependencies are explicit;
/// definitions that declare no edges at all get a sequential chain from the
/// loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub action: StepAction,
    /// Names of steps that must complete before this one
    pub needs: Vec<String>,
    /// Credential scopes this step requires before it may execute
    pub scopes: Vec<Scope>,
    /// Step-level environment bindings, merged over the pipeline env
    pub env: HashMap<String, String>,
}

impl Step {
    /// The action kind, used as the handler registry key
    pub fn kind(&self) -> StepKind {
        self.action.kind()
    }
}

/// Typed action payload for each supported step kind
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepAction {
    /// Fetch the repository into the run workspace
    Checkout {
        repository: String,
        reference: String,
    },
    /// Ensure the requested runtime is available
    Setup { runtime: String, version: String },
    /// Bind the run to an identity provider and warm the credential cache
    Authenticate {
        provider_url: String,
        service_account: String,
        scope: Scope,
    },
    /// Materialize dependencies from an ordered list of requirement files
    Install { requirements: Vec<PathBuf> },
    /// Run the test harness with coverage
    Test {
        targets: Vec<String>,
        parallelism: Parallelism,
        coverage_target: Option<String>,
        coverage_formats: Vec<CoverageFormat>,
    },
    /// Upload the coverage report to an external collector
    Publish {
        report_file: PathBuf,
        destination: String,
        verbose: bool,
        /// The one explicit error-policy switch: escalate upload failures
        /// to pipeline failure (true) or log and continue (false)
        fail_on_error: bool,
    },
    /// Generic command escape hatch
    Run { command: String, args: Vec<String> },
}

impl StepAction {
    pub fn kind(&self) -> StepKind {
        match self {
            Self::Checkout { .. } => StepKind::Checkout,
            Self::Setup { .. } => StepKind::Setup,
            Self::Authenticate { .. } => StepKind::Authenticate,
            Self::Install { .. } => StepKind::Install,
            Self::Test { .. } => StepKind::Test,
            Self::Publish { .. } => StepKind::Publish,
            Self::Run { .. } => StepKind::Run,
        }
    }
}

/// Step kind discriminant, used for handler registry lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Checkout,
    Setup,
    Authenticate,
    Install,
    Test,
    Publish,
    Run,
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Checkout => "checkout",
            Self::Setup => "setup",
            Self::Authenticate => "authenticate",
            Self::Install => "install",
            Self::Test => "test",
            Self::Publish => "publish",
            Self::Run => "run",
        };
        write!(f, "{}", name)
    }
}

/// Worker-count request for the test harness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parallelism {
    /// Let the harness detect the available worker count
    Auto,
    Fixed(u32),
}

impl Parallelism {
    /// Render the value the harness expects on its worker flag
    pub fn as_flag_value(&self) -> String {
        match self {
            Self::Auto => "auto".to_string(),
            Self::Fixed(n) => n.to_string(),
        }
    }
}

impl Default for Parallelism {
    fn default() -> Self {
        Self::Auto
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_parse() {
        assert_eq!(Trigger::parse("workflow_call"), Some(Trigger::WorkflowCall));
        assert_eq!(Trigger::parse("call"), Some(Trigger::WorkflowCall));
        assert_eq!(Trigger::parse("push"), Some(Trigger::Push));
        assert_eq!(Trigger::parse("manual"), Some(Trigger::Manual));
        assert_eq!(Trigger::parse("cron"), None);
    }

    #[test]
    fn test_step_kind_from_action() {
        let action = StepAction::Install {
            requirements: vec![PathBuf::from("requirements.txt")],
        };
        assert_eq!(action.kind(), StepKind::Install);
        assert_eq!(action.kind().to_string(), "install");
    }

    #[test]
    fn test_parallelism_flag_value() {
        assert_eq!(Parallelism::Auto.as_flag_value(), "auto");
        assert_eq!(Parallelism::Fixed(4).as_flag_value(), "4");
        assert_eq!(Parallelism::default(), Parallelism::Auto);
    }
}
