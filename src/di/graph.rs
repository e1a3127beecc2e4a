//! DOT-language rendering of the dependency graph.

use super::container::Container;
use crate::error::ArmatureError;
use std::fmt::Write;

/// A DOT-language visualization of the dependency graph.
///
/// Provided in the container by default, so any constructor or invocation
/// can take `Arc<DotGraph>` and feed diagnostic tooling. On graph errors a
/// rendering with the failing path highlighted is attached to the error (see
/// [`crate::visualize_error`]).
pub struct DotGraph(pub String);

impl std::fmt::Display for DotGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Render the full graph.
pub(crate) fn render(container: &Container) -> String {
    render_highlighted(container, &[])
}

/// Render the graph with the nodes involved in `err` highlighted.
pub(crate) fn render_error(container: &Container, err: &ArmatureError) -> String {
    render_highlighted(container, &failing_types(err))
}

/// Whether `err` is a graph-shaped error worth rendering.
pub(crate) fn can_visualize(err: &ArmatureError) -> bool {
    match err {
        ArmatureError::MissingDependency { .. } | ArmatureError::DependencyCycle { .. } => true,
        ArmatureError::Aggregate(errs) => errs.iter().any(can_visualize),
        ArmatureError::WithGraph { inner, .. } => can_visualize(inner),
        _ => false,
    }
}

fn render_highlighted(container: &Container, failing: &[String]) -> String {
    let mut out = String::from("digraph {\n\trankdir=LR;\n");
    let snapshots = container.snapshot();
    let highlight = |name: &str| {
        if failing.iter().any(|f| f == name) {
            ", color=red"
        } else {
            ""
        }
    };

    for provider in &snapshots {
        let label = if provider.is_supply {
            format!("{} (supplied)", provider.type_name)
        } else {
            format!("{}\\n{}", provider.type_name, provider.constructor)
        };
        let _ = writeln!(
            out,
            "\t\"{}\" [label=\"{}\"{}];",
            provider.type_name,
            label,
            highlight(provider.type_name)
        );
    }

    // Types nobody provides — unsatisfied dependencies of providers, or of
    // whichever invocation failed — still get a node, drawn dashed.
    let mut dashed: Vec<&str> = Vec::new();
    let provided = |name: &str| snapshots.iter().any(|p| p.type_name == name);
    for dep_name in snapshots
        .iter()
        .flat_map(|p| p.deps.iter().map(|d| d.type_name))
        .chain(failing.iter().map(String::as_str))
    {
        if !provided(dep_name) && !dashed.contains(&dep_name) {
            dashed.push(dep_name);
            let _ = writeln!(
                out,
                "\t\"{}\" [style=dashed{}];",
                dep_name,
                highlight(dep_name)
            );
        }
    }

    for provider in &snapshots {
        for dep in &provider.deps {
            let _ = writeln!(out, "\t\"{}\" -> \"{}\";", provider.type_name, dep.type_name);
        }
    }

    out.push_str("}\n");
    out
}

/// Type names implicated by a graph error.
fn failing_types(err: &ArmatureError) -> Vec<String> {
    match err {
        ArmatureError::MissingDependency { type_name, .. } => vec![(*type_name).to_string()],
        ArmatureError::DependencyCycle { path } => {
            path.split(" -> ").map(str::to_string).collect()
        }
        ArmatureError::Aggregate(errs) => errs.iter().flat_map(failing_types).collect(),
        ArmatureError::WithGraph { inner, .. } => failing_types(inner),
        _ => Vec::new(),
    }
}
