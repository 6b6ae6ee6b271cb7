//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod pipeline;

use anyhow::Result;
use clap::Subcommand;
use std::path::PathBuf;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Validate a pipeline definition without running it
    Validate {
        /// Path to the Lua definition file
        file: PathBuf,
    },
    /// Show the execution plan for a pipeline definition
    Plan {
        /// Path to the Lua definition file
        file: PathBuf,
    },
    /// Run a pipeline definition to completion
    Run {
        /// Path to the Lua definition file
        file: PathBuf,

        /// Extra environment bindings as key=value pairs
        #[arg(short, long, value_parser = parse_key_val)]
        env: Vec<(String, String)>,
    },
}

/// Parse a single key=value pair
fn parse_key_val(s: &str) -> Result<(String, String)> {
    let pos = s
        .find('=')
        .ok_or_else(|| anyhow::anyhow!("invalid KEY=value: no `=` found in `{}`", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler.
///
/// # Arguments
/// * `command` - The command to execute
/// * `workspace` - Workspace root override, when given on the command line
///
/// # Returns
/// Result indicating success or failure
pub async fn handle_command(command: Commands, workspace: Option<PathBuf>) -> Result<()> {
    match command {
        Commands::Validate { file } => pipeline::validate(&file),
        Commands::Plan { file } => pipeline::plan(&file),
        Commands::Run { file, env } => pipeline::run(&file, env, workspace).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("BRANCH=main").unwrap(),
            ("BRANCH".to_string(), "main".to_string())
        );
        assert_eq!(
            parse_key_val("URL=https://x?a=b").unwrap(),
            ("URL".to_string(), "https://x?a=b".to_string())
        );
        assert!(parse_key_val("no-equals").is_err());
    }
}
