//! Dependency graph validation.
//!
//! Pure checks over declared manifests, run once at load time: dependency
//! names must resolve, and the graph must be acyclic. Unknown names leave the
//! dependent loadable (its gate is permanently unsatisfiable and surfaced at
//! dispatch); cycle members are excluded from registration entirely.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::domain::manifest::ModuleManifest;
use crate::domain::module::ModuleName;

/// Configuration problem found in the declared graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphIssue {
    UnknownDependency {
        module: ModuleName,
        dependency: ModuleName,
    },
    Cycle {
        /// Members in the order the walk discovered them, closing back on the
        /// first entry.
        path: Vec<ModuleName>,
    },
}

impl fmt::Display for GraphIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphIssue::UnknownDependency { module, dependency } => write!(
                f,
                "module `{module}` depends on unknown module `{dependency}`"
            ),
            GraphIssue::Cycle { path } => {
                let rendered: Vec<&str> = path.iter().map(ModuleName::as_str).collect();
                write!(f, "dependency cycle: {}", rendered.join(" -> "))
            }
        }
    }
}

/// Validate the declared graph, returning every issue found.
pub fn validate(manifests: &[ModuleManifest]) -> Vec<GraphIssue> {
    let known: BTreeSet<&ModuleName> = manifests.iter().map(|manifest| &manifest.name).collect();
    let mut issues = Vec::new();

    for manifest in manifests {
        for dependency in &manifest.depends_on {
            if !known.contains(dependency) {
                issues.push(GraphIssue::UnknownDependency {
                    module: manifest.name.clone(),
                    dependency: dependency.clone(),
                });
            }
        }
    }

    issues.extend(find_cycles(manifests));
    issues
}

/// Every module that sits on a dependency cycle.
pub fn cycle_members(issues: &[GraphIssue]) -> BTreeSet<ModuleName> {
    let mut members = BTreeSet::new();
    for issue in issues {
        if let GraphIssue::Cycle { path } = issue {
            members.extend(path.iter().cloned());
        }
    }
    members
}

fn find_cycles(manifests: &[ModuleManifest]) -> Vec<GraphIssue> {
    let edges: BTreeMap<&ModuleName, &BTreeSet<ModuleName>> = manifests
        .iter()
        .map(|manifest| (&manifest.name, &manifest.depends_on))
        .collect();

    let mut issues = Vec::new();
    let mut done: BTreeSet<&ModuleName> = BTreeSet::new();

    for manifest in manifests {
        if done.contains(&manifest.name) {
            continue;
        }
        let mut stack: Vec<&ModuleName> = Vec::new();
        let mut on_stack: BTreeSet<&ModuleName> = BTreeSet::new();
        visit(
            &manifest.name,
            &edges,
            &mut stack,
            &mut on_stack,
            &mut done,
            &mut issues,
        );
    }

    issues
}

fn visit<'a>(
    node: &'a ModuleName,
    edges: &BTreeMap<&'a ModuleName, &'a BTreeSet<ModuleName>>,
    stack: &mut Vec<&'a ModuleName>,
    on_stack: &mut BTreeSet<&'a ModuleName>,
    done: &mut BTreeSet<&'a ModuleName>,
    issues: &mut Vec<GraphIssue>,
) {
    if done.contains(node) {
        return;
    }
    if on_stack.contains(node) {
        let start = stack
            .iter()
            .position(|entry| *entry == node)
            .unwrap_or_default();
        let path: Vec<ModuleName> = stack[start..].iter().map(|entry| (*entry).clone()).collect();
        issues.push(GraphIssue::Cycle { path });
        return;
    }

    stack.push(node);
    on_stack.insert(node);

    if let Some(dependencies) = edges.get(node) {
        for dependency in dependencies.iter() {
            // Unknown names are reported separately; skip them here.
            if let Some((known, _)) = edges.get_key_value(dependency) {
                visit(*known, edges, stack, on_stack, done, issues);
            }
        }
    }

    stack.pop();
    on_stack.remove(node);
    done.insert(node);
}
