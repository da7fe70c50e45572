// SPDX-License-Identifier: MIT OR Apache-2.0
//! Persisted graph representation.
//!
//! Graphs are stored as RON documents describing nodes by type id plus
//! the connections between them; behaviors are reattached from a
//! [`NodeRegistry`] at load time. The runtime takes the loaded graph as
//! an immutable input per session.

use crate::graph::{ConnectError, Function, Graph, Parameter, Variable};
use crate::node::{NodeId, NodeRegistry};
use crate::value::{Value, ValueType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Current graph asset format version
pub const GRAPH_FORMAT_VERSION: u32 = 1;

/// A node as persisted: type id plus optional overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeAsset {
    /// Asset-local node id, remapped to arena ids at load
    pub id: u32,
    /// Registry type id
    pub type_id: String,
    /// Display-name override
    pub name: Option<String>,
    /// Containing element, if any
    pub parent: Option<u32>,
}

/// A persisted flow connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowLinkAsset {
    /// Source node
    pub from: u32,
    /// Source flow output key
    pub output: String,
    /// Target node
    pub to: u32,
    /// Target flow input key
    pub input: String,
}

/// A persisted value connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueLinkAsset {
    /// Consuming node
    pub dst: u32,
    /// Consuming value input key
    pub input: String,
    /// Producing node
    pub src: u32,
    /// Producing value output key
    pub output: String,
}

/// A persisted inline literal on a value input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiteralAsset {
    /// Owning node
    pub node: u32,
    /// Value input key
    pub input: String,
    /// Literal value
    pub value: Value,
}

/// A persisted function declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionAsset {
    /// Function name
    pub name: String,
    /// Entry node
    pub entry: Option<u32>,
    /// Ordered parameters
    pub parameters: Vec<Parameter>,
    /// Declared return type
    pub return_type: ValueType,
}

/// A complete persisted graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphAsset {
    /// Format version
    pub version: u32,
    /// Graph name
    pub name: String,
    /// Nodes
    pub nodes: Vec<NodeAsset>,
    /// Flow connections
    pub flow_links: Vec<FlowLinkAsset>,
    /// Value connections
    pub value_links: Vec<ValueLinkAsset>,
    /// Inline literals
    pub literals: Vec<LiteralAsset>,
    /// Functions
    pub functions: Vec<FunctionAsset>,
    /// Variables
    pub variables: Vec<Variable>,
}

impl GraphAsset {
    /// Create an empty asset for a named graph
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            version: GRAPH_FORMAT_VERSION,
            name: name.into(),
            nodes: Vec::new(),
            flow_links: Vec::new(),
            value_links: Vec::new(),
            literals: Vec::new(),
            functions: Vec::new(),
            variables: Vec::new(),
        }
    }

    /// Serialize to RON text
    pub fn to_ron(&self) -> Result<String, AssetError> {
        let config = ron::ser::PrettyConfig::default();
        Ok(ron::ser::to_string_pretty(self, config)?)
    }

    /// Deserialize from RON text
    pub fn from_ron(text: &str) -> Result<Self, AssetError> {
        Ok(ron::from_str(text)?)
    }

    /// Build a runtime graph, reattaching behaviors from the registry.
    pub fn instantiate(&self, registry: &NodeRegistry) -> Result<Graph, AssetError> {
        if self.version != GRAPH_FORMAT_VERSION {
            return Err(AssetError::UnsupportedVersion(self.version));
        }
        let mut graph = Graph::new(self.name.clone());
        let mut ids: HashMap<u32, NodeId> = HashMap::new();

        for node in &self.nodes {
            let behavior = registry
                .create(&node.type_id)
                .ok_or_else(|| AssetError::UnknownNodeType(node.type_id.clone()))?;
            let id = graph.add_node(behavior);
            if let Some(name) = &node.name {
                if let Some(n) = graph.node_mut(id) {
                    n.name = name.clone();
                }
            }
            ids.insert(node.id, id);
        }
        for node in &self.nodes {
            if let Some(parent) = node.parent {
                let child = ids[&node.id];
                let parent = *ids.get(&parent).ok_or(AssetError::UnknownNode(parent))?;
                graph.reparent(child, parent)?;
            }
        }

        for link in &self.flow_links {
            let from = *ids.get(&link.from).ok_or(AssetError::UnknownNode(link.from))?;
            let to = *ids.get(&link.to).ok_or(AssetError::UnknownNode(link.to))?;
            graph.connect_flow(from, &link.output, to, &link.input)?;
        }
        for link in &self.value_links {
            let dst = *ids.get(&link.dst).ok_or(AssetError::UnknownNode(link.dst))?;
            let src = *ids.get(&link.src).ok_or(AssetError::UnknownNode(link.src))?;
            graph.connect_value(dst, &link.input, src, &link.output)?;
        }
        for literal in &self.literals {
            let node = *ids
                .get(&literal.node)
                .ok_or(AssetError::UnknownNode(literal.node))?;
            graph.set_literal(node, &literal.input, literal.value.clone())?;
        }

        for func in &self.functions {
            let entry = match func.entry {
                None => None,
                Some(id) => Some(*ids.get(&id).ok_or(AssetError::UnknownNode(id))?),
            };
            let mut function = Function::new(func.name.clone())
                .with_return_type(func.return_type.clone());
            function.entry = entry;
            function.parameters = func.parameters.clone();
            graph.add_function(function);
        }
        for variable in &self.variables {
            graph.add_variable(variable.clone());
        }

        tracing::debug!(
            graph = %graph.name,
            nodes = graph.node_count(),
            "graph instantiated from asset"
        );
        Ok(graph)
    }
}

/// Error when loading or saving a graph asset
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    /// Format version this build cannot read
    #[error("unsupported graph asset version: {0}")]
    UnsupportedVersion(u32),

    /// Type id not present in the registry
    #[error("unknown node type: `{0}`")]
    UnknownNodeType(String),

    /// Link referencing an asset node id that does not exist
    #[error("unknown node id in asset: {0}")]
    UnknownNode(u32),

    /// Link rejected by graph validation
    #[error("invalid link: {0}")]
    BadLink(#[from] ConnectError),

    /// RON parse failure
    #[error("parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// RON serialize failure
    #[error("serialize error: {0}")]
    Serialize(#[from] ron::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeBehavior, NodeCategory, NodeSpec, NodeTypeInfo};
    use std::sync::Arc;

    struct Relay;

    impl NodeBehavior for Relay {
        fn type_name(&self) -> &'static str {
            "relay"
        }

        fn register(&self, spec: &mut NodeSpec) {
            spec.flow_input("in");
            spec.flow_output("exit");
        }
    }

    fn registry() -> NodeRegistry {
        let mut registry = NodeRegistry::new();
        registry.register(
            NodeTypeInfo {
                id: "relay".to_string(),
                name: "Relay".to_string(),
                category: NodeCategory::Utility,
                description: "Pass-through".to_string(),
            },
            || Arc::new(Relay),
        );
        registry
    }

    fn two_relays() -> GraphAsset {
        let mut asset = GraphAsset::new("persisted");
        asset.nodes.push(NodeAsset {
            id: 10,
            type_id: "relay".to_string(),
            name: Some("first".to_string()),
            parent: None,
        });
        asset.nodes.push(NodeAsset {
            id: 20,
            type_id: "relay".to_string(),
            name: None,
            parent: None,
        });
        asset.flow_links.push(FlowLinkAsset {
            from: 10,
            output: "exit".to_string(),
            to: 20,
            input: "in".to_string(),
        });
        asset
    }

    #[test]
    fn test_ron_round_trip_preserves_topology() {
        let asset = two_relays();
        let text = asset.to_ron().unwrap();
        let loaded = GraphAsset::from_ron(&text).unwrap();

        let graph = loaded.instantiate(&registry()).unwrap();
        assert_eq!(graph.node_count(), 2);
        let first = graph.nodes().find(|n| n.name == "first").unwrap();
        assert!(first.flow_output("exit").unwrap().target.is_some());
    }

    #[test]
    fn test_unknown_node_type_fails() {
        let mut asset = GraphAsset::new("broken");
        asset.nodes.push(NodeAsset {
            id: 0,
            type_id: "missing".to_string(),
            name: None,
            parent: None,
        });
        let err = asset.instantiate(&registry()).unwrap_err();
        assert!(matches!(err, AssetError::UnknownNodeType(_)));
    }

    #[test]
    fn test_unsupported_version_fails() {
        let mut asset = two_relays();
        asset.version = GRAPH_FORMAT_VERSION + 1;
        let err = asset.instantiate(&registry()).unwrap_err();
        assert!(matches!(err, AssetError::UnsupportedVersion(_)));
    }

    #[test]
    fn test_bad_link_fails() {
        let mut asset = two_relays();
        asset.flow_links.push(FlowLinkAsset {
            from: 10,
            output: "ghost".to_string(),
            to: 20,
            input: "in".to_string(),
        });
        let err = asset.instantiate(&registry()).unwrap_err();
        assert!(matches!(err, AssetError::BadLink(_)));
    }
}
