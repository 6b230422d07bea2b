use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use nodeflow_core::error::NodeflowError;
use nodeflow_core::graph::Graph;
use nodeflow_core::types::NodeKind;
use nodeflow_nodes::NodeRegistry;

use crate::scheduler;

/// Result of a dry-run check of a graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Planned order, empty when the graph cannot be scheduled.
    pub execution_order: Vec<String>,
}

/// Check `graph` against `registry` without executing any node.
pub fn validate(graph: &Graph, registry: &NodeRegistry) -> ValidationReport {
    let mut report = ValidationReport::default();

    if graph.nodes.is_empty() {
        report.errors.push("Workflow must contain at least one node".into());
        return report;
    }

    let mut seen = HashSet::new();
    let duplicates: Vec<&str> = graph
        .nodes
        .iter()
        .filter(|n| !seen.insert(n.id.as_str()))
        .map(|n| n.id.as_str())
        .collect();
    if duplicates.is_empty() {
        match scheduler::topological_order(graph, true) {
            Ok(order) => report.execution_order = order,
            Err(e) => report.errors.push(e.to_string()),
        }
    } else {
        for id in duplicates {
            report.errors.push(format!("Duplicate node id: {}", id));
        }
    }

    check_edges(graph, registry, &mut report);
    check_nodes(graph, registry, &mut report);
    check_sinks(graph, &mut report);

    report.valid = report.errors.is_empty();
    debug!(
        workflow = %graph.name,
        valid = report.valid,
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        "Validated graph"
    );
    report
}

fn check_edges(graph: &Graph, registry: &NodeRegistry, report: &mut ValidationReport) {
    for edge in &graph.edges {
        let (Some(source), Some(target)) = (graph.node(&edge.source), graph.node(&edge.target)) else {
            report.errors.push(format!("Invalid edge: {}", edge.id));
            continue;
        };
        // Unregistered types are reported once per node
        let (Some(source_type), Some(target_type)) = (
            registry.descriptor(&source.node_type),
            registry.descriptor(&target.node_type),
        ) else {
            continue;
        };

        let output = source_type.output(&edge.source_output);
        let input = target_type.input(&edge.target_input);
        if output.is_none() {
            report.errors.push(format!(
                "Source output '{}' not found in {}",
                edge.source_output, source.node_type
            ));
        }
        if input.is_none() {
            report.errors.push(format!(
                "Target input '{}' not found in {}",
                edge.target_input, target.node_type
            ));
        }
        if let (Some(output), Some(input)) = (output, input) {
            if !output.provides(&input.param_type) {
                report.errors.push(
                    NodeflowError::TypeMismatch {
                        edge: edge.id.clone(),
                        provided: output.base_classes.clone(),
                        expected: input.param_type.clone(),
                    }
                    .to_string(),
                );
            }
        }
    }
}

fn check_nodes(graph: &Graph, registry: &NodeRegistry, report: &mut ValidationReport) {
    for node in &graph.nodes {
        let Some(descriptor) = registry.descriptor(&node.node_type) else {
            report
                .errors
                .push(NodeflowError::UnknownNodeType(node.node_type.clone()).to_string());
            continue;
        };

        // Only edges whose source exists can ever deliver a value; several
        // edges into one input still deliver a single value
        let connected: BTreeSet<&str> = graph
            .incoming(&node.id)
            .filter(|e| graph.node(&e.source).is_some())
            .map(|e| e.target_input.as_str())
            .collect();
        let is_terminator = descriptor.kind == NodeKind::Terminator;

        for param in descriptor.inputs.iter().filter(|p| p.must_be_supplied()) {
            // A terminator's upstream value can only come from an edge
            let has_static = !(is_terminator && param.is_connection)
                && node
                    .static_inputs()
                    .get(&param.name)
                    .is_some_and(|v| !v.is_null());
            if !has_static && !connected.contains(param.name.as_str()) {
                report.errors.push(
                    NodeflowError::MissingRequiredInput {
                        node: node.id.clone(),
                        input: param.name.clone(),
                    }
                    .to_string(),
                );
            }
        }

        if is_terminator {
            match connected.len() {
                0 => {
                    // Required connection inputs were reported above
                    let upstream = descriptor.inputs.iter().find(|p| p.is_connection);
                    if !upstream.is_some_and(|p| p.must_be_supplied()) {
                        report.errors.push(
                            NodeflowError::MissingRequiredInput {
                                node: node.id.clone(),
                                input: upstream.map_or("input", |p| p.name.as_str()).to_string(),
                            }
                            .to_string(),
                        );
                    }
                }
                1 => {}
                n => report.errors.push(format!(
                    "Terminator node {} accepts exactly one upstream connection, found {}",
                    node.id, n
                )),
            }
        }

        if descriptor.kind == NodeKind::Provider && !connected.is_empty() {
            report.warnings.push(format!(
                "Provider node {} has incoming connections; they are treated as static inputs",
                node.id
            ));
        }

        for (name, value) in node.static_inputs() {
            if descriptor.input(name).is_none() {
                report.warnings.push(format!(
                    "Node {} has input '{}' that {} does not declare",
                    node.id, name, node.node_type
                ));
            } else if !value.is_null() && connected.contains(name.as_str()) {
                report.warnings.push(format!(
                    "Static value of '{}' in node {} is overridden by a connection",
                    name, node.id
                ));
            }
        }
    }
}

fn check_sinks(graph: &Graph, report: &mut ValidationReport) {
    let sinks: Vec<&str> = graph
        .nodes
        .iter()
        .filter(|n| graph.outgoing(&n.id).all(|e| graph.node(&e.target).is_none()))
        .map(|n| n.id.as_str())
        .collect();
    if sinks.len() > 1 {
        let last = report
            .execution_order
            .iter()
            .rev()
            .find(|id| sinks.contains(&id.as_str()))
            .map(String::as_str)
            .unwrap_or(sinks[sinks.len() - 1]);
        report.warnings.push(format!(
            "Multiple terminal nodes ({}); the result comes from the last executed one ({})",
            sinks.join(", "),
            last
        ));
    }
}
