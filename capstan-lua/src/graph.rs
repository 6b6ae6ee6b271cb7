//! Step dependency graph validation and ordering
//!
//! Ordering dependencies are explicit `needs` edges. A definition that
//! declares no edges gets the implicit sequential chain (each step depends
//! on its predecessor in document order), so a plain sequential definition
//! and a future parallel graph go through the same validation and produce
//! the same executor contract.

use capstan_core::domain::pipeline::Step;
use capstan_core::error::{LoadError, LoadResult};
use std::collections::{HashMap, HashSet};

/// Validate the step graph and return the steps in execution order
///
/// Synthesizes the implicit sequential chain for edge-free definitions,
/// then runs a Kahn topological sort. Document order is used as the
/// tie-breaker so the result is deterministic.
///
/// # Errors
/// `MalformedSpec` on duplicate step names, a `needs` reference to an
/// unknown step, or a dependency cycle.
pub fn order_steps(mut steps: Vec<Step>) -> LoadResult<Vec<Step>> {
    if steps.is_empty() {
        return Err(LoadError::MalformedSpec(
            "pipeline must have at least one step".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for step in &steps {
        if !seen.insert(step.name.clone()) {
            return Err(LoadError::MalformedSpec(format!(
                "duplicate step name '{}'",
                step.name
            )));
        }
    }

    // Implicit sequential coupling: when the definition declares no edges
    // at all, each step depends on its predecessor in document order.
    // Definitions that declare any explicit edge own the whole graph.
    if steps.iter().all(|s| s.needs.is_empty()) {
        for idx in 1..steps.len() {
            let previous = steps[idx - 1].name.clone();
            steps[idx].needs.push(previous);
        }
    }

    let index_of: HashMap<String, usize> = steps
        .iter()
        .enumerate()
        .map(|(idx, step)| (step.name.clone(), idx))
        .collect();

    let mut in_degree = vec![0usize; steps.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); steps.len()];

    for (idx, step) in steps.iter().enumerate() {
        for need in &step.needs {
            let dep_idx = *index_of.get(need).ok_or_else(|| {
                LoadError::MalformedSpec(format!(
                    "step '{}' needs unknown step '{}'",
                    step.name, need
                ))
            })?;
            if dep_idx == idx {
                return Err(LoadError::MalformedSpec(format!(
                    "step '{}' depends on itself",
                    step.name
                )));
            }
            in_degree[idx] += 1;
            dependents[dep_idx].push(idx);
        }
    }

    // Kahn's algorithm; the ready set is scanned in document order
    let mut ordered_indices = Vec::with_capacity(steps.len());
    let mut ready: Vec<usize> = (0..steps.len()).filter(|&i| in_degree[i] == 0).collect();

    while let Some(&idx) = ready.first() {
        ready.remove(0);
        ordered_indices.push(idx);
        for &dependent in &dependents[idx] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                let pos = ready.partition_point(|&r| r < dependent);
                ready.insert(pos, dependent);
            }
        }
    }

    if ordered_indices.len() != steps.len() {
        let stuck: Vec<&str> = steps
            .iter()
            .enumerate()
            .filter(|(idx, _)| !ordered_indices.contains(idx))
            .map(|(_, step)| step.name.as_str())
            .collect();
        return Err(LoadError::MalformedSpec(format!(
            "dependency cycle involving step(s): {}",
            stuck.join(", ")
        )));
    }

    let mut slots: Vec<Option<Step>> = steps.into_iter().map(Some).collect();
    let ordered = ordered_indices
        .into_iter()
        .map(|idx| slots[idx].take().expect("index visited once"))
        .collect();

    Ok(ordered)
}
