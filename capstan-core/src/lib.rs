//! Capstan Core
//!
//! Core types and abstractions for the Capstan pipeline engine.
//!
//! This crate contains:
//! - Domain types: Core business entities (PipelineSpec, Step, Credential, etc.)
//! - Error taxonomy: typed load-time and run-time errors

pub mod domain;
pub mod error;

pub use error::{EngineError, EngineResult, LoadError, LoadResult};
