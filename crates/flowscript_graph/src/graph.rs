// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph container: node arena, connections, functions and variables.
//!
//! Nodes live in an arena addressed by stable integer ids; parent/child
//! containment is stored as indices, so graph elements form a tree
//! without reference cycles. Connections are validated when they are
//! made, never at run time.

use crate::error::RuntimeError;
use crate::node::{Node, NodeBehavior, NodeId, NodeSpec};
use crate::port::{FlowLink, ValueSource};
use crate::value::{Value, ValueType};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier for a graph definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphId(pub Uuid);

impl GraphId {
    /// Create a new random graph ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GraphId {
    fn default() -> Self {
        Self::new()
    }
}

/// A function parameter declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name
    pub name: String,
    /// Declared type
    pub ty: ValueType,
}

/// How a function is invoked, decided once per function by static
/// analysis over its reachable flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionKind {
    /// Runs to completion inside one call
    Regular,
    /// Runs as a resumable coroutine
    Coroutine,
}

/// A graph function: an entry node plus signature.
#[derive(Debug, Clone)]
pub struct Function {
    /// Function name, unique within the graph
    pub name: String,
    /// Entry node; execution starts from its `exit` flow output
    pub entry: Option<NodeId>,
    /// Ordered parameter list
    pub parameters: Vec<Parameter>,
    /// Declared return type
    pub return_type: ValueType,
}

impl Function {
    /// Create a function with no entry node yet
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry: None,
            parameters: Vec::new(),
            return_type: ValueType::Null,
        }
    }

    /// Set the entry node
    pub fn with_entry(mut self, entry: NodeId) -> Self {
        self.entry = Some(entry);
        self
    }

    /// Append a parameter
    pub fn with_parameter(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.parameters.push(Parameter {
            name: name.into(),
            ty,
        });
        self
    }

    /// Set the declared return type
    pub fn with_return_type(mut self, ty: ValueType) -> Self {
        self.return_type = ty;
        self
    }
}

/// A graph variable declaration. Current values are instance-scoped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    /// Variable name, unique within the graph
    pub name: String,
    /// Declared type
    pub ty: ValueType,
    /// Default seeded into each fresh instance
    pub default: Value,
}

impl Variable {
    /// Create a variable with a default value
    pub fn new(name: impl Into<String>, ty: ValueType, default: Value) -> Self {
        Self {
            name: name.into(),
            ty,
            default,
        }
    }
}

/// A node graph definition.
///
/// Immutable per session once instances run against it; editing-time
/// mutation goes through the connect/refresh APIs below.
#[derive(Debug)]
pub struct Graph {
    /// Graph id
    pub id: GraphId,
    /// Graph name
    pub name: String,
    nodes: IndexMap<NodeId, Node>,
    functions: IndexMap<String, Function>,
    variables: IndexMap<String, Variable>,
    next_node: u32,
}

impl Graph {
    /// Create a new empty graph
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: GraphId::new(),
            name: name.into(),
            nodes: IndexMap::new(),
            functions: IndexMap::new(),
            variables: IndexMap::new(),
            next_node: 0,
        }
    }

    /// Add a root-level node; its behavior's `register` runs here
    pub fn add_node(&mut self, behavior: Arc<dyn NodeBehavior>) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        self.nodes.insert(id, Node::new(id, behavior));
        id
    }

    /// Add a node contained in `parent`
    pub fn add_child_node(
        &mut self,
        parent: NodeId,
        behavior: Arc<dyn NodeBehavior>,
    ) -> Result<NodeId, ConnectError> {
        if !self.nodes.contains_key(&parent) {
            return Err(ConnectError::NodeNotFound(parent));
        }
        let id = self.add_node(behavior);
        self.nodes[&id].parent = Some(parent);
        self.nodes[&parent].children.push(id);
        Ok(id)
    }

    /// Get a node by ID
    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Get a node by ID, raising a descriptive error when absent
    pub fn try_node(&self, node_id: NodeId) -> Result<&Node, RuntimeError> {
        self.nodes.get(&node_id).ok_or(RuntimeError::NodeNotFound {
            node: node_id,
            graph: self.name.clone(),
        })
    }

    /// Get a mutable node by ID
    pub fn node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    /// Get all nodes
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Get all node IDs
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Move a node under a parent container
    pub fn reparent(&mut self, child: NodeId, parent: NodeId) -> Result<(), ConnectError> {
        if child == parent {
            return Err(ConnectError::SelfLoop);
        }
        if !self.nodes.contains_key(&child) {
            return Err(ConnectError::NodeNotFound(child));
        }
        if !self.nodes.contains_key(&parent) {
            return Err(ConnectError::NodeNotFound(parent));
        }
        if let Some(old) = self.nodes[&child].parent {
            if let Some(p) = self.nodes.get_mut(&old) {
                p.children.retain(|c| *c != child);
            }
        }
        self.nodes[&child].parent = Some(parent);
        self.nodes[&parent].children.push(child);
        Ok(())
    }

    /// Remove a node, its children and every connection touching them
    pub fn remove_node(&mut self, node_id: NodeId) -> bool {
        let Some(node) = self.nodes.get(&node_id) else {
            return false;
        };
        for child in node.children.clone() {
            self.remove_node(child);
        }
        if let Some(parent) = self.nodes[&node_id].parent {
            if let Some(p) = self.nodes.get_mut(&parent) {
                p.children.retain(|c| *c != node_id);
            }
        }
        self.nodes.shift_remove(&node_id);
        self.prune_links_to(node_id);
        true
    }

    fn prune_links_to(&mut self, removed: NodeId) {
        for node in self.nodes.values_mut() {
            for out in &mut node.flow_outputs {
                if out.target.as_ref().is_some_and(|t| t.node == removed) {
                    out.target = None;
                }
            }
            for input in &mut node.value_inputs {
                if matches!(&input.source, ValueSource::Connected { node, .. } if *node == removed)
                {
                    input.source = ValueSource::Unbound;
                }
            }
        }
    }

    /// Connect a flow output to a flow input.
    ///
    /// A flow output holds at most one target; reconnecting replaces the
    /// previous link.
    pub fn connect_flow(
        &mut self,
        from: NodeId,
        output: &str,
        to: NodeId,
        input: &str,
    ) -> Result<(), ConnectError> {
        if from == to {
            return Err(ConnectError::SelfLoop);
        }
        let source = self.nodes.get(&from).ok_or(ConnectError::NodeNotFound(from))?;
        source
            .flow_output(output)
            .ok_or_else(|| ConnectError::PortNotFound {
                node: from,
                port: output.to_string(),
            })?;
        let target = self.nodes.get(&to).ok_or(ConnectError::NodeNotFound(to))?;
        target
            .flow_input(input)
            .ok_or_else(|| ConnectError::PortNotFound {
                node: to,
                port: input.to_string(),
            })?;

        let out = self.nodes[&from]
            .flow_output_mut(output)
            .expect("checked above");
        out.target = Some(FlowLink {
            node: to,
            input: input.to_string(),
        });
        Ok(())
    }

    /// Connect a value input to a value output.
    ///
    /// Declared types must be compatible; violations fail here, at
    /// registration time, never at run time.
    pub fn connect_value(
        &mut self,
        dst: NodeId,
        input: &str,
        src: NodeId,
        output: &str,
    ) -> Result<(), ConnectError> {
        if dst == src {
            return Err(ConnectError::SelfLoop);
        }
        let src_node = self.nodes.get(&src).ok_or(ConnectError::NodeNotFound(src))?;
        let out_ty = src_node
            .value_output(output)
            .ok_or_else(|| ConnectError::PortNotFound {
                node: src,
                port: output.to_string(),
            })?
            .ty
            .resolve();
        let dst_node = self.nodes.get(&dst).ok_or(ConnectError::NodeNotFound(dst))?;
        let in_ty = dst_node
            .value_input(input)
            .ok_or_else(|| ConnectError::PortNotFound {
                node: dst,
                port: input.to_string(),
            })?
            .ty
            .resolve();

        if !out_ty.can_connect_to(&in_ty) {
            return Err(ConnectError::IncompatibleTypes {
                from: out_ty,
                to: in_ty,
            });
        }

        let port = self.nodes[&dst].value_input_mut(input).expect("checked above");
        port.source = ValueSource::Connected {
            node: src,
            output: output.to_string(),
        };
        Ok(())
    }

    /// Disconnect a flow output
    pub fn disconnect_flow(&mut self, from: NodeId, output: &str) -> Result<(), ConnectError> {
        let node = self
            .nodes
            .get_mut(&from)
            .ok_or(ConnectError::NodeNotFound(from))?;
        let out = node
            .flow_output_mut(output)
            .ok_or_else(|| ConnectError::PortNotFound {
                node: from,
                port: output.to_string(),
            })?;
        out.target = None;
        Ok(())
    }

    /// Set an inline literal on a value input
    pub fn set_literal(
        &mut self,
        node_id: NodeId,
        input: &str,
        value: Value,
    ) -> Result<(), ConnectError> {
        let node = self
            .nodes
            .get_mut(&node_id)
            .ok_or(ConnectError::NodeNotFound(node_id))?;
        let port = node
            .value_input_mut(input)
            .ok_or_else(|| ConnectError::PortNotFound {
                node: node_id,
                port: input.to_string(),
            })?;
        let declared = port.ty.resolve();
        if !value.conforms_to(&declared) {
            return Err(ConnectError::IncompatibleTypes {
                from: value.type_of(),
                to: declared,
            });
        }
        port.source = ValueSource::Literal(value);
        Ok(())
    }

    /// Re-run a node's port registration, preserving still-valid links.
    ///
    /// Connections whose keys survive the rebuild (with compatible types)
    /// are kept; links into keys that disappeared are pruned on both
    /// sides.
    pub fn refresh_node(&mut self, node_id: NodeId) -> Result<(), ConnectError> {
        let node = self
            .nodes
            .get(&node_id)
            .ok_or(ConnectError::NodeNotFound(node_id))?;
        let behavior = Arc::clone(node.behavior());
        let mut spec = NodeSpec::default();
        behavior.register(&mut spec);

        let node = self.nodes.get_mut(&node_id).expect("checked above");
        for out in &mut spec.flow_outputs {
            if let Some(old) = node.flow_output(&out.key) {
                out.target = old.target.clone();
            }
        }
        for input in &mut spec.value_inputs {
            if let Some(old) = node.value_input(&input.key) {
                let declared = input.ty.resolve();
                let keep = match &old.source {
                    ValueSource::Literal(v) => v.conforms_to(&declared),
                    ValueSource::Connected { .. } => true,
                    ValueSource::Unbound => false,
                };
                if keep {
                    input.source = old.source.clone();
                }
            }
        }
        node.flow_inputs = spec.flow_inputs;
        node.flow_outputs = spec.flow_outputs;
        node.value_inputs = spec.value_inputs;
        node.value_outputs = spec.value_outputs;

        // Incoming links from other nodes may now point at missing keys.
        let inputs: Vec<String> = self.nodes[&node_id]
            .flow_inputs
            .iter()
            .map(|p| p.key.clone())
            .collect();
        let outputs: Vec<String> = self.nodes[&node_id]
            .value_outputs
            .iter()
            .map(|p| p.key.clone())
            .collect();
        for node in self.nodes.values_mut() {
            for out in &mut node.flow_outputs {
                if out
                    .target
                    .as_ref()
                    .is_some_and(|t| t.node == node_id && !inputs.contains(&t.input))
                {
                    out.target = None;
                }
            }
            for input in &mut node.value_inputs {
                if matches!(
                    &input.source,
                    ValueSource::Connected { node, output }
                        if *node == node_id && !outputs.contains(output)
                ) {
                    input.source = ValueSource::Unbound;
                }
            }
        }
        Ok(())
    }

    /// Declare a function
    pub fn add_function(&mut self, function: Function) {
        self.functions.insert(function.name.clone(), function);
    }

    /// Get a function by name
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    /// Get a function by name, raising a descriptive error when absent
    pub fn try_function(&self, name: &str) -> Result<&Function, RuntimeError> {
        self.functions
            .get(name)
            .ok_or_else(|| RuntimeError::UnknownFunction {
                name: name.to_string(),
                graph: self.name.clone(),
            })
    }

    /// Get all functions in declaration order
    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.values()
    }

    /// Declare a variable
    pub fn add_variable(&mut self, variable: Variable) {
        self.variables.insert(variable.name.clone(), variable);
    }

    /// Get a variable declaration by name
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    /// Get all variable declarations in declaration order
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables.values()
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new("Untitled")
    }
}

/// Error when editing graph structure
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConnectError {
    /// Node not found
    #[error("node not found: {0:?}")]
    NodeNotFound(NodeId),

    /// Port not found
    #[error("port `{port}` not found on node {node:?}")]
    PortNotFound {
        /// Owning node
        node: NodeId,
        /// Requested key
        port: String,
    },

    /// Incompatible declared types
    #[error("incompatible value types: {from:?} cannot feed {to:?}")]
    IncompatibleTypes {
        /// Source type
        from: ValueType,
        /// Destination type
        to: ValueType,
    },

    /// Self-loop not allowed
    #[error("self-loop not allowed")]
    SelfLoop,
}
