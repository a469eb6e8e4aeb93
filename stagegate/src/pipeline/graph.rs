//! Validated stage dependency graph.

use super::StageDefinition;
use crate::errors::GraphError;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A directed acyclic graph of stage definitions.
///
/// Construction validates the whole graph: names are unique, every
/// dependency resolves, and there are no cycles.
#[derive(Debug, Clone)]
pub struct StageGraph {
    /// Stage definitions by name.
    stages: HashMap<String, Arc<StageDefinition>>,
    /// Declaration order.
    stage_order: Vec<String>,
    /// Execution order (topologically sorted, declaration order as tiebreak).
    execution_order: Vec<String>,
}

impl StageGraph {
    /// Builds and validates a stage graph.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline is empty, a name is duplicated, a
    /// stage depends on itself or on an unknown stage, or the dependencies
    /// form a cycle.
    pub fn build(
        definitions: impl IntoIterator<Item = StageDefinition>,
    ) -> Result<Self, GraphError> {
        let mut stages = HashMap::new();
        let mut stage_order = Vec::new();

        for def in definitions {
            if stages.contains_key(&def.name) {
                return Err(GraphError::DuplicateStage { stage: def.name });
            }
            if def.dependencies.contains(&def.name) {
                return Err(GraphError::SelfDependency { stage: def.name });
            }
            stage_order.push(def.name.clone());
            stages.insert(def.name.clone(), Arc::new(def));
        }

        if stages.is_empty() {
            return Err(GraphError::Empty);
        }

        // Dependencies may be declared in any order, so resolve them only
        // once every stage is known.
        for name in &stage_order {
            let def = &stages[name];
            if let Some(missing) = def.dependencies.iter().find(|d| !stages.contains_key(*d)) {
                return Err(GraphError::UnknownDependency {
                    stage: name.clone(),
                    dependency: missing.clone(),
                });
            }
        }

        detect_cycles(&stages, &stage_order)?;
        let execution_order = topological_sort(&stages, &stage_order);

        Ok(Self {
            stages,
            stage_order,
            execution_order,
        })
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Returns a stage definition by name.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&Arc<StageDefinition>> {
        self.stages.get(name)
    }

    /// Returns the dependencies of a stage, empty for unknown names.
    #[must_use]
    pub fn dependencies_of(&self, name: &str) -> &[String] {
        self.stages
            .get(name)
            .map_or(&[][..], |def| def.dependencies.as_slice())
    }

    /// Returns all stages in declaration order.
    pub fn all_stages(&self) -> impl Iterator<Item = &Arc<StageDefinition>> + '_ {
        self.stage_order.iter().filter_map(|name| self.stages.get(name))
    }

    /// Returns stage names in declaration order.
    #[must_use]
    pub fn declaration_order(&self) -> &[String] {
        &self.stage_order
    }

    /// Returns the execution order.
    #[must_use]
    pub fn execution_order(&self) -> &[String] {
        &self.execution_order
    }

    /// Returns the names of stages that directly depend on `name`.
    #[must_use]
    pub fn dependents_of(&self, name: &str) -> Vec<&str> {
        self.all_stages()
            .filter(|def| def.dependencies.iter().any(|d| d == name))
            .map(|def| def.name.as_str())
            .collect()
    }
}

/// Detects cycles with a depth-first search, reporting the first cycle found.
fn detect_cycles(
    stages: &HashMap<String, Arc<StageDefinition>>,
    stage_order: &[String],
) -> Result<(), GraphError> {
    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut path = Vec::new();

    for name in stage_order {
        if !visited.contains(name.as_str()) {
            if let Some(cycle) = dfs_cycle(name, stages, &mut visited, &mut rec_stack, &mut path) {
                return Err(GraphError::CyclicDependency { cycle_path: cycle });
            }
        }
    }

    Ok(())
}

fn dfs_cycle<'a>(
    node: &'a str,
    stages: &'a HashMap<String, Arc<StageDefinition>>,
    visited: &mut HashSet<&'a str>,
    rec_stack: &mut HashSet<&'a str>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    if let Some(def) = stages.get(node) {
        for dep in &def.dependencies {
            if !visited.contains(dep.as_str()) {
                if let Some(cycle) = dfs_cycle(dep, stages, visited, rec_stack, path) {
                    return Some(cycle);
                }
            } else if rec_stack.contains(dep.as_str()) {
                let start = path.iter().position(|n| *n == dep.as_str()).unwrap_or(0);
                let mut cycle: Vec<String> =
                    path[start..].iter().map(|s| (*s).to_string()).collect();
                cycle.push(dep.clone());
                return Some(cycle);
            }
        }
    }

    path.pop();
    rec_stack.remove(node);
    None
}

/// Performs a topological sort, visiting stages in declaration order.
fn topological_sort(
    stages: &HashMap<String, Arc<StageDefinition>>,
    stage_order: &[String],
) -> Vec<String> {
    fn visit(
        node: &str,
        stages: &HashMap<String, Arc<StageDefinition>>,
        visited: &mut HashSet<String>,
        result: &mut Vec<String>,
    ) {
        if !visited.insert(node.to_string()) {
            return;
        }
        if let Some(def) = stages.get(node) {
            for dep in &def.dependencies {
                visit(dep, stages, visited, result);
            }
        }
        result.push(node.to_string());
    }

    let mut result = Vec::with_capacity(stage_order.len());
    let mut visited = HashSet::new();
    for name in stage_order {
        visit(name, stages, &mut visited, &mut result);
    }
    result
}
