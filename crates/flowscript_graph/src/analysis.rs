// SPDX-License-Identifier: MIT OR Apache-2.0
//! Static analysis over flow connectivity.

use crate::graph::{Function, FunctionKind, Graph};
use crate::node::NodeId;
use std::collections::HashSet;

/// Whether any node reachable over flow connections from `entry`
/// (inclusive) declares itself coroutine-requiring.
pub fn requires_coroutine(graph: &Graph, entry: NodeId) -> bool {
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
            return true;
        }
        for output in &node.flow_outputs {
            if let Some(link) = &output.target {
                stack.push(link.node);
            }
        }
    }
    false
}

/// Decide, once, which runner a function uses.
pub fn function_kind(graph: &Graph, function: &Function) -> FunctionKind {
    match function.entry {
        Some(entry) if requires_coroutine(graph, entry) => FunctionKind::Coroutine,
        _ => FunctionKind::Regular,
    }
}
