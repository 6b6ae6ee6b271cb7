//! Pipeline command handlers
//!
//! Handles validating a definition, printing its execution plan, and
//! driving a full run through the engine.

use anyhow::{Context, Result};
use colored::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use capstan_core::domain::pipeline::PipelineSpec;
use capstan_core::domain::run::{RunReport, StepStatus};
use capstan_lua::parse_pipeline_spec;
use capstan_runner::{EngineConfig, Executor};

/// Load a definition file and return the validated, ordered spec
fn load_spec(path: &Path) -> Result<PipelineSpec> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read definition file: {}", path.display()))?;

    let spec = parse_pipeline_spec(&source)
        .with_context(|| format!("Failed to parse definition: {}", path.display()))?;

    Ok(spec)
}

/// Validate a pipeline definition
pub fn validate(file: &Path) -> Result<()> {
    let spec = load_spec(file)?;

    println!("{}", "✓ Definition is valid!".green().bold());
    println!("  Name:    {}", spec.name.bold());
    println!("  Trigger: {}", format!("{:?}", spec.trigger).dimmed());
    println!("  Steps:   {}", spec.steps.len());

    Ok(())
}

/// Print the execution plan for a pipeline definition
pub fn plan(file: &Path) -> Result<()> {
    let spec = load_spec(file)?;

    println!("{}", format!("Execution plan for '{}':", spec.name).bold());
    println!();
    for (idx, step) in spec.steps.iter().enumerate() {
        println!(
            "  {} {} {}",
            format!("{}.", idx + 1).dimmed(),
            step.name.bold(),
            format!("[{}]", step.kind()).cyan()
        );
        if !step.needs.is_empty() {
            println!("     needs:  {}", step.needs.join(", ").dimmed());
        }
        if !step.scopes.is_empty() {
            let scopes: Vec<&str> = step.scopes.iter().map(|s| s.as_str()).collect();
            println!("     scopes: {}", scopes.join(", ").yellow());
        }
    }

    Ok(())
}

/// Run a pipeline definition to completion
pub async fn run(
    file: &Path,
    env: Vec<(String, String)>,
    workspace: Option<PathBuf>,
) -> Result<()> {
    let spec = load_spec(file)?;

    let mut config = EngineConfig::from_env();
    if let Some(workspace) = workspace {
        config.workspace_root = workspace;
    }
    config.validate().context("Invalid engine configuration")?;

    let extra_env: HashMap<String, String> = env.into_iter().collect();

    let executor = Executor::new(config);
    let report = executor.run(&spec, extra_env).await;

    print_report(&report);

    if !report.is_success() {
        anyhow::bail!(
            "pipeline '{}' failed: {}",
            report.pipeline,
            report.error.as_deref().unwrap_or("unknown error")
        );
    }

    Ok(())
}

/// Print the run report
fn print_report(report: &RunReport) {
    println!();
    for result in &report.results {
        let marker = match result.status {
            StepStatus::Succeeded => "✓".green(),
            StepStatus::Tolerated => "⚠".yellow(),
            StepStatus::Skipped => "-".dimmed(),
            StepStatus::Failed => "✗".red(),
        };
        println!(
            "  {} {} {}",
            marker,
            result.step.bold(),
            format!("({} ms)", result.duration_ms).dimmed()
        );
        if let Some(error) = &result.error {
            println!("      {}", error.red());
        }
    }

    println!();
    if let Some(failing) = report.tests_failed {
        println!("  {}", format!("{} test(s) failed", failing).red());
    }
    if let Some(coverage) = &report.coverage {
        println!("  Coverage report: {}", coverage.path.display().to_string().dimmed());
    }
    if let Some(ack) = &report.publish_ack {
        let id = if ack.report_id.is_empty() {
            "unacknowledged".to_string()
        } else {
            ack.report_id.clone()
        };
        println!("  Published to {} ({})", ack.destination.cyan(), id.dimmed());
    }

    println!();
    if report.is_success() {
        println!("{}", "✓ Pipeline completed successfully!".green().bold());
    } else {
        println!(
            "{}",
            format!(
                "✗ Pipeline failed: {}",
                report.error.as_deref().unwrap_or("unknown error")
            )
            .red()
            .bold()
        );
    }
}
