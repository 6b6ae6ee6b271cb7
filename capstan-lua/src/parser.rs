//! Pipeline definition parser
//!
//! Evaluates a Lua pipeline definition in the restricted sandbox and turns
//! it into a validated `PipelineSpec` without executing anything. Field
//! extraction is strict: missing required fields are `MalformedSpec`, and
//! an unrecognized `uses` value is `UnknownStepType`.

use mlua::{Table, Value};
use std::collections::HashMap;
use std::path::PathBuf;

use capstan_core::domain::credential::Scope;
use capstan_core::domain::pipeline::{Parallelism, PipelineSpec, Step, StepAction, Trigger};
use capstan_core::domain::report::CoverageFormat;
use capstan_core::error::{LoadError, LoadResult};

use crate::graph::order_steps;
use crate::sandbox::create_sandbox;

/// Parse a pipeline definition from Lua source code
///
/// # Example
/// ```no_run
/// use capstan_lua::parser::parse_pipeline_spec;
///
/// let source = r#"
///     return {
///         name = "coverage",
///         on = "workflow_call",
///         steps = {
///             { name = "checkout", uses = "checkout",
///               with = { repository = "git@example.com:app.git" } },
///             { name = "test", uses = "test",
///               with = { targets = { "./tests" }, parallelism = "auto" } },
///         }
///     }
/// "#;
///
/// let spec = parse_pipeline_spec(source)?;
/// assert_eq!(spec.name, "coverage");
/// assert_eq!(spec.steps.len(), 2);
/// # Ok::<(), capstan_core::error::LoadError>(())
/// ```
///
/// # Errors
/// Returns `MalformedSpec` when the source is not valid Lua, required
/// fields (name, trigger, steps) are absent, a `needs` edge dangles, or
/// the graph has a cycle. Returns `UnknownStepType` for an unrecognized
/// `uses` value.
pub fn parse_pipeline_spec(source: &str) -> LoadResult<PipelineSpec> {
    let lua = create_sandbox()
        .map_err(|e| LoadError::MalformedSpec(format!("failed to create sandbox: {}", e)))?;

    let definition: Table = lua
        .load(source)
        .eval()
        .map_err(|e| LoadError::MalformedSpec(format!("failed to evaluate definition: {}", e)))?;

    let name: String = definition
        .get("name")
        .map_err(|_| malformed("pipeline must have a 'name' field"))?;

    let trigger_name: String = definition
        .get("on")
        .map_err(|_| malformed("pipeline must have an 'on' trigger field"))?;
    let trigger = Trigger::parse(&trigger_name)
        .ok_or_else(|| malformed(format!("unknown trigger '{}'", trigger_name)))?;

    let env = parse_string_map(&definition, "env")?;
    let permissions = parse_string_list(&definition, "permissions")?
        .into_iter()
        .map(Scope)
        .collect();

    let steps_table: Table = definition
        .get("steps")
        .map_err(|_| malformed("pipeline must have a 'steps' field"))?;

    let mut steps = Vec::new();
    for pair in steps_table.sequence_values::<Table>() {
        let step_table = pair.map_err(|e| malformed(format!("failed to read step entry: {}", e)))?;
        steps.push(parse_step(&step_table)?);
    }

    let steps = order_steps(steps)?;

    Ok(PipelineSpec {
        name,
        trigger,
        env,
        permissions,
        steps,
    })
}

fn malformed(reason: impl Into<String>) -> LoadError {
    LoadError::MalformedSpec(reason.into())
}

/// Parse one step table into a typed `Step`
fn parse_step(step_table: &Table) -> LoadResult<Step> {
    let name: String = step_table
        .get("name")
        .map_err(|_| malformed("step must have a 'name' field"))?;

    let with: Option<Table> = step_table.get("with").ok();
    let action = parse_action(&name, step_table, with.as_ref())?;

    let needs = parse_string_list(step_table, "needs")?;
    let scopes = parse_string_list(step_table, "scopes")?
        .into_iter()
        .map(Scope)
        .collect();
    let env = parse_string_map(step_table, "env")?;

    Ok(Step {
        name,
        action,
        needs,
        scopes,
        env,
    })
}

/// Resolve the step kind from `uses` (or a bare `run` command) and parse
/// the kind-specific `with` payload
fn parse_action(step_name: &str, step_table: &Table, with: Option<&Table>) -> LoadResult<StepAction> {
    // A bare `run = "cmd arg..."` string is shorthand for the run kind
    if let Ok(command_line) = step_table.get::<String>("run") {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let command = parts
            .next()
            .ok_or_else(|| malformed(format!("step '{}' has an empty 'run' command", step_name)))?;
        return Ok(StepAction::Run {
            command,
            args: parts.collect(),
        });
    }

    let uses: String = step_table.get("uses").map_err(|_| {
        malformed(format!(
            "step '{}' must have a 'uses' or 'run' field",
            step_name
        ))
    })?;

    match uses.as_str() {
        "checkout" => {
            let with = require_with(step_name, &uses, with)?;
            Ok(StepAction::Checkout {
                repository: require_str(step_name, with, "repository")?,
                reference: with
                    .get("ref")
                    .unwrap_or_else(|_| "main".to_string()),
            })
        }
        "setup" => {
            let with = require_with(step_name, &uses, with)?;
            Ok(StepAction::Setup {
                runtime: require_str(step_name, with, "runtime")?,
                version: require_str(step_name, with, "version")?,
            })
        }
        "authenticate" => {
            let with = require_with(step_name, &uses, with)?;
            Ok(StepAction::Authenticate {
                provider_url: require_str(step_name, with, "provider_url")?,
                service_account: require_str(step_name, with, "service_account")?,
                scope: Scope(
                    with.get("scope")
                        .unwrap_or_else(|_| "default".to_string()),
                ),
            })
        }
        "install" => {
            let with = require_with(step_name, &uses, with)?;
            let requirements: Vec<PathBuf> = parse_string_list(with, "requirements")?
                .into_iter()
                .map(PathBuf::from)
                .collect();
            if requirements.is_empty() {
                return Err(malformed(format!(
                    "step '{}' must list at least one requirements file",
                    step_name
                )));
            }
            Ok(StepAction::Install { requirements })
        }
        "test" => {
            let with = require_with(step_name, &uses, with)?;
            let mut targets = parse_string_list(with, "targets")?;
            if targets.is_empty() {
                targets.push("./tests".to_string());
            }
            Ok(StepAction::Test {
                targets,
                parallelism: parse_parallelism(step_name, with)?,
                coverage_target: with.get("coverage_target").ok(),
                coverage_formats: parse_coverage_formats(step_name, with)?,
            })
        }
        "publish" => {
            let with = require_with(step_name, &uses, with)?;
            Ok(StepAction::Publish {
                report_file: PathBuf::from(require_str(step_name, with, "file")?),
                destination: require_str(step_name, with, "destination")?,
                verbose: with.get("verbose").unwrap_or(false),
                fail_on_error: with.get("fail_on_error").unwrap_or(true),
            })
        }
        "run" => {
            let with = require_with(step_name, &uses, with)?;
            Ok(StepAction::Run {
                command: require_str(step_name, with, "command")?,
                args: parse_string_list(with, "args")?,
            })
        }
        other => Err(LoadError::UnknownStepType(other.to_string())),
    }
}

fn require_with<'a>(
    step_name: &str,
    uses: &str,
    with: Option<&'a Table>,
) -> LoadResult<&'a Table> {
    with.ok_or_else(|| {
        malformed(format!(
            "step '{}' ('{}') requires a 'with' table",
            step_name, uses
        ))
    })
}

fn require_str(step_name: &str, with: &Table, key: &str) -> LoadResult<String> {
    with.get(key)
        .map_err(|_| malformed(format!("step '{}' is missing 'with.{}'", step_name, key)))
}

/// Parse a `parallelism` value: "auto" or a positive worker count
fn parse_parallelism(step_name: &str, with: &Table) -> LoadResult<Parallelism> {
    let value: Value = with.get("parallelism").unwrap_or(Value::Nil);
    match value {
        Value::Nil => Ok(Parallelism::Auto),
        Value::String(s) => {
            let s = s.to_str().map_err(|e| malformed(e.to_string()))?;
            if &*s == "auto" {
                Ok(Parallelism::Auto)
            } else {
                s.parse::<u32>().map(Parallelism::Fixed).map_err(|_| {
                    malformed(format!(
                        "step '{}' has invalid parallelism '{}'",
                        step_name, &*s
                    ))
                })
            }
        }
        Value::Integer(n) if n > 0 => u32::try_from(n).map(Parallelism::Fixed).map_err(|_| {
            malformed(format!(
                "step '{}' has invalid parallelism '{}' (worker count too large)",
                step_name, n
            ))
        }),
        _ => Err(malformed(format!(
            "step '{}' has invalid 'parallelism' (expected \"auto\" or a positive count)",
            step_name
        ))),
    }
}

/// Parse the coverage format list, defaulting to xml
fn parse_coverage_formats(step_name: &str, with: &Table) -> LoadResult<Vec<CoverageFormat>> {
    let names = parse_string_list(with, "coverage")?;
    if names.is_empty() {
        return Ok(vec![CoverageFormat::Xml]);
    }
    names
        .iter()
        .map(|name| {
            CoverageFormat::parse(name).ok_or_else(|| {
                malformed(format!(
                    "step '{}' has unknown coverage format '{}'",
                    step_name, name
                ))
            })
        })
        .collect()
}

/// Parse an optional array-of-strings field
fn parse_string_list(table: &Table, key: &str) -> LoadResult<Vec<String>> {
    let value: Value = table.get(key).unwrap_or(Value::Nil);
    match value {
        Value::Nil => Ok(Vec::new()),
        Value::Table(list) => {
            let mut out = Vec::new();
            for pair in list.sequence_values::<String>() {
                let entry =
                    pair.map_err(|e| malformed(format!("failed to read '{}' entry: {}", key, e)))?;
                out.push(entry);
            }
            Ok(out)
        }
        _ => Err(malformed(format!(
            "field '{}' must be an array of strings",
            key
        ))),
    }
}

/// Parse an optional string-to-string map field
fn parse_string_map(table: &Table, key: &str) -> LoadResult<HashMap<String, String>> {
    let value: Value = table.get(key).unwrap_or(Value::Nil);
    match value {
        Value::Nil => Ok(HashMap::new()),
        Value::Table(map) => {
            let mut out = HashMap::new();
            for pair in map.pairs::<String, String>() {
                let (k, v) =
                    pair.map_err(|e| malformed(format!("failed to read '{}' entry: {}", key, e)))?;
                out.insert(k, v);
            }
            Ok(out)
        }
        _ => Err(malformed(format!("field '{}' must be a table", key))),
    }
}
