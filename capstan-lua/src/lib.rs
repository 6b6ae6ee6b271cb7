//! Capstan definition language
//!
//! Pipeline definitions are Lua tables evaluated in a restricted sandbox.
//! This crate provides:
//! - The sandbox (no io, no os, no require)
//! - The parser that turns a definition into a validated `PipelineSpec`
//! - Step-graph validation and topological ordering

pub mod graph;
pub mod parser;
pub mod sandbox;

pub use parser::parse_pipeline_spec;
pub use sandbox::create_sandbox;

pub use capstan_core::domain::pipeline::{PipelineSpec, Step, StepAction, StepKind, Trigger};
