// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node definitions: arena entries, behaviors, and the type registry.

use crate::codegen::CodeGen;
use crate::coroutine::YieldInstruction;
use crate::error::RuntimeError;
use crate::flow::ExecCtx;
use crate::port::{FlowInput, FlowOutput, ValueInput, ValueOutput};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Unique identifier for a node, stable within its owning graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Node type category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeCategory {
    /// Event entry points
    Event,
    /// Control flow routing
    FlowControl,
    /// Value producers and operators
    Value,
    /// Variable access
    Variable,
    /// Suspension points (coroutine flows only)
    Coroutine,
    /// State machine constructs
    StateMachine,
    /// Utility nodes
    Utility,
    /// Custom/user-defined
    Custom,
}

/// Result of executing a node synchronously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Execution {
    /// Continue through the named flow output (tail continuation)
    Continue(String),
    /// This branch ends here
    End,
}

impl Execution {
    /// Tail continuation through `key`
    pub fn next(key: impl Into<String>) -> Self {
        Self::Continue(key.into())
    }
}

/// Result of executing one resume step of a node in a coroutine flow.
///
/// Coroutine-capable behaviors are written as explicit resume-point
/// machines: each step either calls into a sub-flow, suspends, or
/// finishes with an optional tail continuation.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// Run the sub-flow behind the named output, then re-enter this node
    /// at `resume_step`
    Call {
        /// Flow output to follow
        output: String,
        /// Step to re-enter at once the sub-flow unwinds
        resume_step: u32,
    },
    /// Suspend the flow; re-enter this node at `resume_step` when the
    /// host resumes it
    Yield {
        /// Instruction handed to the host scheduler
        instruction: YieldInstruction,
        /// Step to re-enter at on resume
        resume_step: u32,
    },
    /// Node finished; optionally continue through a flow output
    Finished {
        /// Tail continuation, if any
        output: Option<String>,
    },
}

impl StepOutcome {
    /// Finish with a tail continuation
    pub fn finish_into(key: impl Into<String>) -> Self {
        Self::Finished {
            output: Some(key.into()),
        }
    }

    /// Finish and end the branch
    pub fn end() -> Self {
        Self::Finished { output: None }
    }
}

/// Port set declared by a behavior during registration.
///
/// `NodeBehavior::register` must rebuild the exact same port set for the
/// same node configuration; the graph re-invokes it on `refresh_node`.
#[derive(Debug, Default)]
pub struct NodeSpec {
    pub(crate) flow_inputs: Vec<FlowInput>,
    pub(crate) flow_outputs: Vec<FlowOutput>,
    pub(crate) value_inputs: Vec<ValueInput>,
    pub(crate) value_outputs: Vec<ValueOutput>,
}

impl NodeSpec {
    /// Declare a flow input
    pub fn flow_input(&mut self, key: impl Into<String>) -> &mut Self {
        self.flow_inputs.push(FlowInput::new(key));
        self
    }

    /// Declare a flow output
    pub fn flow_output(&mut self, key: impl Into<String>) -> &mut Self {
        self.flow_outputs.push(FlowOutput::new(key));
        self
    }

    /// Declare a value input
    pub fn value_input(&mut self, input: ValueInput) -> &mut Self {
        self.value_inputs.push(input);
        self
    }

    /// Declare a value output
    pub fn value_output(&mut self, output: ValueOutput) -> &mut Self {
        self.value_outputs.push(output);
        self
    }
}

/// Executable behavior of a node type.
///
/// One implementation drives both live interpretation (`execute`,
/// `get_value`) and source emission (`on_generator_initialize`); the two
/// must agree on port semantics.
pub trait NodeBehavior: Send + Sync {
    /// Stable type name, used for registry ids, display and diagnostics
    fn type_name(&self) -> &'static str;

    /// Declare the port set (`OnRegister`). Runs once per node lifetime
    /// and again on explicit refresh; must be idempotent for a fixed
    /// configuration.
    fn register(&self, spec: &mut NodeSpec);

    /// Execute synchronously, entered through `input`.
    fn execute(&self, ctx: &mut ExecCtx<'_>, input: &str) -> Result<Execution, RuntimeError> {
        let _ = input;
        Err(ctx.unsupported("has no flow behavior"))
    }

    /// Execute one resume step in a coroutine flow.
    ///
    /// The default adapts `execute`: suitable for leaf nodes that do
    /// local work and at most a tail continuation. Nodes that route
    /// control through sub-flows must override this so suspension can
    /// cross them.
    fn execute_step(
        &self,
        ctx: &mut ExecCtx<'_>,
        input: &str,
        step: u32,
    ) -> Result<StepOutcome, RuntimeError> {
        debug_assert_eq!(step, 0);
        match self.execute(ctx, input)? {
            Execution::Continue(key) => Ok(StepOutcome::Finished { output: Some(key) }),
            Execution::End => Ok(StepOutcome::end()),
        }
    }

    /// Compute the value of one of this node's value outputs.
    fn get_value(&self, ctx: &mut ExecCtx<'_>, output: &str) -> Result<Value, RuntimeError> {
        Err(ctx.port_not_found(output))
    }

    /// Write through one of this node's `ReadWrite` value outputs.
    fn set_value(
        &self,
        ctx: &mut ExecCtx<'_>,
        output: &str,
        value: Value,
    ) -> Result<(), RuntimeError> {
        let _ = value;
        Err(ctx.read_only_port(output))
    }

    /// Whether executing this node requires a coroutine flow
    fn is_coroutine(&self) -> bool {
        false
    }

    /// Step to re-enter at when an error unwinds out of a sub-flow this
    /// node called, or `None` if this node does not intercept errors.
    ///
    /// Only consulted by the coroutine machine; synchronous constructs
    /// intercept through `Flow::trigger`'s `Result` instead. The
    /// intercepted error is delivered through
    /// [`ExecCtx::take_caught_error`](crate::flow::ExecCtx::take_caught_error).
    fn error_step(&self) -> Option<u32> {
        None
    }

    /// Register per-port source-text providers with the code generator.
    ///
    /// Interface boundary only; the emission backend is out of scope.
    fn on_generator_initialize(&self, node: &Node, cg: &mut CodeGen) {
        let _ = (node, cg);
    }
}

/// A node instance in a graph arena.
///
/// Parent/child containment is stored as indices into the same arena;
/// nodes are destroyed when their owning container is.
pub struct Node {
    /// Arena id, unique within the owning graph
    pub id: NodeId,
    /// Display name
    pub name: String,
    /// Containing graph element, if any
    pub parent: Option<NodeId>,
    /// Contained child elements
    pub children: Vec<NodeId>,
    /// Flow inputs declared at registration
    pub flow_inputs: Vec<FlowInput>,
    /// Flow outputs declared at registration
    pub flow_outputs: Vec<FlowOutput>,
    /// Value inputs declared at registration
    pub value_inputs: Vec<ValueInput>,
    /// Value outputs declared at registration
    pub value_outputs: Vec<ValueOutput>,
    behavior: Arc<dyn NodeBehavior>,
}

impl Node {
    pub(crate) fn new(id: NodeId, behavior: Arc<dyn NodeBehavior>) -> Self {
        let mut spec = NodeSpec::default();
        behavior.register(&mut spec);
        Self {
            id,
            name: behavior.type_name().to_string(),
            parent: None,
            children: Vec::new(),
            flow_inputs: spec.flow_inputs,
            flow_outputs: spec.flow_outputs,
            value_inputs: spec.value_inputs,
            value_outputs: spec.value_outputs,
            behavior,
        }
    }

    /// The behavior backing this node
    pub fn behavior(&self) -> &Arc<dyn NodeBehavior> {
        &self.behavior
    }

    /// Stable type name of the backing behavior
    pub fn type_name(&self) -> &'static str {
        self.behavior.type_name()
    }

    /// Look up a flow input by key
    pub fn flow_input(&self, key: &str) -> Option<&FlowInput> {
        self.flow_inputs.iter().find(|p| p.key == key)
    }

    /// Look up a flow output by key
    pub fn flow_output(&self, key: &str) -> Option<&FlowOutput> {
        self.flow_outputs.iter().find(|p| p.key == key)
    }

    pub(crate) fn flow_output_mut(&mut self, key: &str) -> Option<&mut FlowOutput> {
        self.flow_outputs.iter_mut().find(|p| p.key == key)
    }

    /// Look up a value input by key
    pub fn value_input(&self, key: &str) -> Option<&ValueInput> {
        self.value_inputs.iter().find(|p| p.key == key)
    }

    pub(crate) fn value_input_mut(&mut self, key: &str) -> Option<&mut ValueInput> {
        self.value_inputs.iter_mut().find(|p| p.key == key)
    }

    /// Look up a value output by key
    pub fn value_output(&self, key: &str) -> Option<&ValueOutput> {
        self.value_outputs.iter().find(|p| p.key == key)
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("type", &self.type_name())
            .field("name", &self.name)
            .field("parent", &self.parent)
            .finish_non_exhaustive()
    }
}

/// Metadata describing a registered node type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeTypeInfo {
    /// Unique type identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Category
    pub category: NodeCategory,
    /// Description
    pub description: String,
}

struct RegisteredType {
    info: NodeTypeInfo,
    factory: Box<dyn Fn() -> Arc<dyn NodeBehavior> + Send + Sync>,
}

/// Registry of available node types.
///
/// Session-scoped and constructor-injected; there is no process-wide
/// registry.
#[derive(Default)]
pub struct NodeRegistry {
    types: indexmap::IndexMap<String, RegisteredType>,
}

impl NodeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            types: indexmap::IndexMap::new(),
        }
    }

    /// Register a node type with its behavior factory
    pub fn register<F>(&mut self, info: NodeTypeInfo, factory: F)
    where
        F: Fn() -> Arc<dyn NodeBehavior> + Send + Sync + 'static,
    {
        self.types.insert(
            info.id.clone(),
            RegisteredType {
                info,
                factory: Box::new(factory),
            },
        );
    }

    /// Get type metadata by id
    pub fn info(&self, id: &str) -> Option<&NodeTypeInfo> {
        self.types.get(id).map(|t| &t.info)
    }

    /// Instantiate a behavior by type id
    pub fn create(&self, id: &str) -> Option<Arc<dyn NodeBehavior>> {
        self.types.get(id).map(|t| (t.factory)())
    }

    /// Get all registered types
    pub fn types(&self) -> impl Iterator<Item = &NodeTypeInfo> {
        self.types.values().map(|t| &t.info)
    }

    /// Get types by category
    pub fn types_in_category(&self, category: NodeCategory) -> impl Iterator<Item = &NodeTypeInfo> {
        self.types
            .values()
            .map(|t| &t.info)
            .filter(move |i| i.category == category)
    }
}
