// SPDX-License-Identifier: MIT OR Apache-2.0
//! Code generator interface.
//!
//! The same node definition drives either live interpretation or
//! ahead-of-time source emission. During `on_generator_initialize` a
//! behavior registers one source-text provider per value port; the
//! provider must render the same computation `get_value` performs, so
//! interpreter and generator agree on port semantics. The emission
//! backend itself is out of scope; this is the interface boundary.

use crate::graph::Graph;
use crate::node::NodeId;
use std::collections::HashMap;

type SourceProvider = Box<dyn Fn(&CodeGen) -> String + Send>;

/// Per-port source-text provider registry.
#[derive(Default)]
pub struct CodeGen {
    providers: HashMap<(NodeId, String), SourceProvider>,
}

impl CodeGen {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every node's generator hook over a graph
    pub fn initialize(&mut self, graph: &Graph) {
        for node in graph.nodes() {
            let behavior = std::sync::Arc::clone(node.behavior());
            behavior.on_generator_initialize(node, self);
        }
    }

    /// Register the source-text provider for a node's value port
    pub fn register_port_source(
        &mut self,
        node: NodeId,
        port: impl Into<String>,
        provider: impl Fn(&CodeGen) -> String + Send + 'static,
    ) {
        self.providers.insert((node, port.into()), Box::new(provider));
    }

    /// Render the source text for a node's value port, if registered
    pub fn port_source(&self, node: NodeId, port: &str) -> Option<String> {
        self.providers.get(&(node, port.to_string())).map(|p| p(self))
    }

    /// Whether any provider is registered for a node
    pub fn has_node(&self, node: NodeId) -> bool {
        self.providers.keys().any(|(n, _)| *n == node)
    }
}
