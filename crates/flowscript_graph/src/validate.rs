// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pre-run graph validation.
//!
//! Configuration errors are detected here when possible so they surface
//! before the first flow runs; anything only discoverable at execution
//! time is raised by the runtime as a descriptive [`crate::RuntimeError`].

use crate::analysis;
use crate::graph::{FunctionKind, Graph};
use crate::node::NodeId;
use crate::port::ValueSource;
use crate::value::ValueType;
use std::collections::HashSet;

/// A finding from [`validate_graph`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationIssue {
    /// A required value input has neither a connection nor a literal
    #[error("node {node:?}: required input `{port}` is unbound")]
    MissingRequiredInput {
        /// Owning node
        node: NodeId,
        /// Unbound port key
        port: String,
    },

    /// A value connection whose (possibly dynamic) types no longer agree
    #[error(
        "node {node:?}: input `{port}` of type {to:?} is fed by an output of type {from:?}"
    )]
    IncompatibleValueLink {
        /// Consuming node
        node: NodeId,
        /// Consuming port key
        port: String,
        /// Source type
        from: ValueType,
        /// Destination type
        to: ValueType,
    },

    /// A function was declared without an entry node
    #[error("function `{function}` has no entry node")]
    FunctionWithoutEntry {
        /// Function name
        function: String,
    },

    /// A coroutine-requiring node is reachable from an entry that runs
    /// regular flows
    #[error(
        "node {node:?} (`{type_name}`) requires suspension but is reachable from \
         entry node {entry:?}, which runs regular flows"
    )]
    CoroutineInRegularFlow {
        /// Entry node the regular flow starts from
        entry: NodeId,
        /// Offending coroutine node
        node: NodeId,
        /// Its type
        type_name: &'static str,
    },
}

/// Validate a graph before running it.
///
/// Checks required inputs, value-link type agreement (dynamic type hints
/// are re-resolved here), function entries, and coroutine reachability
/// from regular entry points. Event-style roots (top-level nodes with
/// flow outputs but no flow inputs) run regular flows unless they are
/// the entry of a coroutine function; contained nodes are structural
/// (state machine children point at states through flow links) and are
/// not roots.
pub fn validate_graph(graph: &Graph) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    for node in graph.nodes() {
        for input in &node.value_inputs {
            match &input.source {
                ValueSource::Unbound if input.required => {
                    issues.push(ValidationIssue::MissingRequiredInput {
                        node: node.id,
                        port: input.key.clone(),
                    });
                }
                ValueSource::Connected { node: src, output } => {
                    let Some(src_node) = graph.node(*src) else {
                        continue;
                    };
                    let Some(out) = src_node.value_output(output) else {
                        continue;
                    };
                    let from = out.ty.resolve();
                    let to = input.ty.resolve();
                    if !from.can_connect_to(&to) {
                        issues.push(ValidationIssue::IncompatibleValueLink {
                            node: node.id,
                            port: input.key.clone(),
                            from,
                            to,
                        });
                    }
                }
                _ => {}
            }
        }
    }

    let mut coroutine_entries = HashSet::new();
    for function in graph.functions() {
        match function.entry {
            None => issues.push(ValidationIssue::FunctionWithoutEntry {
                function: function.name.clone(),
            }),
            Some(entry) => {
                if analysis::function_kind(graph, function) == FunctionKind::Coroutine {
                    coroutine_entries.insert(entry);
                }
            }
        }
    }

    for root in regular_roots(graph, &coroutine_entries) {
        if let Some((node, type_name)) = first_coroutine_node(graph, root) {
            issues.push(ValidationIssue::CoroutineInRegularFlow {
                entry: root,
                node,
                type_name,
            });
        }
    }

    issues
}

/// Log every issue through `tracing::warn!` and return them.
pub fn log_issues(graph: &Graph, issues: Vec<ValidationIssue>) -> Vec<ValidationIssue> {
    for issue in &issues {
        tracing::warn!(graph = %graph.name, %issue, "graph validation");
    }
    issues
}

fn regular_roots(graph: &Graph, coroutine_entries: &HashSet<NodeId>) -> Vec<NodeId> {
    // Nodes that are flow targets are not roots.
    let mut targeted: HashSet<NodeId> = HashSet::new();
    for node in graph.nodes() {
        for output in &node.flow_outputs {
            if let Some(link) = &output.target {
                targeted.insert(link.node);
            }
        }
    }
    graph
        .nodes()
        .filter(|n| {
            n.parent.is_none()
                && !n.flow_outputs.is_empty()
                && n.flow_inputs.is_empty()
                && !targeted.contains(&n.id)
                && !coroutine_entries.contains(&n.id)
        })
        .map(|n| n.id)
        .collect()
}

fn first_coroutine_node(graph: &Graph, entry: NodeId) -> Option<(NodeId, &'static str)> {
    let mut visited = HashSet::new();
    let mut stack = vec![entry];
    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        let Some(node) = graph.node(id) else {
            continue;
        };
        if node.behavior().is_coroutine() {
            return Some((id, node.type_name()));
        }
        for output in node.flow_outputs.iter().rev() {
            if let Some(link) = &output.target {
                stack.push(link.node);
            }
        }
    }
    None
}
