//! Core domain types
//!
//! This module contains the core domain structures used across Capstan crates.
//! The loader produces them, the executor consumes them, and the CLI renders
//! them. All types here are plain data; execution logic lives in the runner.

pub mod credential;
pub mod log;
pub mod pipeline;
pub mod report;
pub mod run;
