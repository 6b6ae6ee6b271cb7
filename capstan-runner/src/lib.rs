//! Capstan Runner
//!
//! The pipeline engine: drives a validated `PipelineSpec` step by step.
//!
//! Architecture:
//! - Configuration: engine settings from environment or defaults
//! - Context: per-run state (workspace, env bindings, log buffer)
//! - Broker: workload-identity token exchange with per-scope caching
//! - Installer: idempotent dependency materialization
//! - Steps: one handler per step kind behind the `StepHandler` trait
//! - Executor: sequential fail-fast drive loop
//!
//! External collaborators (identity provider, test harness, coverage
//! collector) sit behind the `TokenExchange`, `CommandRunner`, and
//! `ReportSink` traits so the engine can be exercised without them.

pub mod broker;
pub mod config;
pub mod context;
pub mod executor;
pub mod installer;
pub mod process;
pub mod steps;

pub use broker::{CredentialBroker, HttpTokenExchange, TokenExchange};
pub use config::EngineConfig;
pub use context::RunContext;
pub use executor::Executor;
pub use installer::Installer;
pub use process::{CommandOutput, CommandRunner, ShellRunner};
pub use steps::{HandlerRegistry, StepHandler, StepOutput};
