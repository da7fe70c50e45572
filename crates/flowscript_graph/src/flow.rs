// SPDX-License-Identifier: MIT OR Apache-2.0
//! Flow: the execution cursor threaded through node invocations.
//!
//! `Flow::next` is the sole primitive for advancing control. Once a node
//! sets a jump statement, every subsequent hop short-circuits without
//! executing further node bodies until a construct built to intercept it
//! (loops for break/continue, function boundaries for return) consumes
//! it. Value resolution is pull-based and uncached: every read is a
//! fresh evaluation.

use crate::error::RuntimeError;
use crate::graph::Graph;
use crate::instance::GraphInstance;
use crate::node::NodeId;
use crate::port::ValueSource;
use crate::value::{Value, ValueType};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// A reified return/break/continue signal propagated through nested flow
/// constructs.
#[derive(Debug, Clone, PartialEq)]
pub enum JumpStatement {
    /// Unwind to the enclosing function invocation, optionally carrying
    /// a return value
    Return(Option<Value>),
    /// Unwind to the enclosing loop and stop it
    Break,
    /// Unwind to the enclosing loop and start its next iteration
    Continue,
}

impl JumpStatement {
    /// Short name for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Return(_) => "return",
            Self::Break => "break",
            Self::Continue => "continue",
        }
    }
}

/// Which runner drives this flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    /// Synchronous, runs to completion; suspension is an error
    Regular,
    /// Resumable; may suspend at coroutine nodes
    Coroutine,
}

/// The execution context for one run: graph, instance, jump statement
/// and the current function invocation's parameter locals.
///
/// A `Flow` is created by a runner, mutated node-by-node as execution
/// proceeds, and discarded when the run finishes (regular) or retained
/// across suspension points (coroutine).
pub struct Flow {
    graph: Arc<Graph>,
    instance: Arc<GraphInstance>,
    kind: FlowKind,
    jump: Option<JumpStatement>,
    locals: HashMap<String, Value>,
    caught: Option<RuntimeError>,
}

impl Flow {
    pub(crate) fn new(graph: Arc<Graph>, instance: Arc<GraphInstance>, kind: FlowKind) -> Self {
        Self {
            graph,
            instance,
            kind,
            jump: None,
            locals: HashMap::new(),
            caught: None,
        }
    }

    pub(crate) fn set_caught(&mut self, error: RuntimeError) {
        self.caught = Some(error);
    }

    /// The graph being executed
    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    /// The instance this flow mutates
    pub fn instance(&self) -> &Arc<GraphInstance> {
        &self.instance
    }

    /// Which runner drives this flow
    pub fn kind(&self) -> FlowKind {
        self.kind
    }

    /// Current jump statement, if any
    pub fn jump(&self) -> Option<&JumpStatement> {
        self.jump.as_ref()
    }

    /// Set the jump statement; subsequent hops short-circuit until a
    /// construct consumes it
    pub fn set_jump(&mut self, jump: JumpStatement) {
        self.jump = Some(jump);
    }

    /// Take and clear the jump statement
    pub fn take_jump(&mut self) -> Option<JumpStatement> {
        self.jump.take()
    }

    /// Read a parameter local of the current function invocation
    pub fn local(&self, name: &str) -> Option<Value> {
        self.locals.get(name).cloned()
    }

    pub(crate) fn set_local(&mut self, name: impl Into<String>, value: Value) {
        self.locals.insert(name.into(), value);
    }

    /// Advance control through a node's flow output.
    ///
    /// No connection is a no-op: dangling outputs are legal and simply
    /// terminate the branch. A pending jump statement short-circuits the
    /// call entirely.
    pub fn next(&mut self, node: NodeId, output: &str) -> Result<(), RuntimeError> {
        if self.jump.is_some() {
            return Ok(());
        }
        let graph = Arc::clone(&self.graph);
        let n = graph.try_node(node)?;
        let port = n
            .flow_output(output)
            .ok_or_else(|| self.port_not_found(node, output))?;
        match &port.target {
            None => Ok(()),
            Some(link) => {
                let (target, input) = (link.node, link.input.clone());
                self.run_into(target, input)
            }
        }
    }

    /// Run the sub-flow behind an output and reify any resulting jump
    /// statement instead of letting it propagate, restoring the caller's
    /// control.
    pub fn trigger(
        &mut self,
        node: NodeId,
        output: &str,
    ) -> Result<Option<JumpStatement>, RuntimeError> {
        let saved = self.jump.take();
        self.next(node, output)?;
        let reified = self.jump.take();
        self.jump = saved;
        Ok(reified)
    }

    /// Run the sub-flow behind an output without letting its jump
    /// statement affect the caller.
    ///
    /// "Parallel" means jump isolation, not concurrency: the branch runs
    /// to completion here and now, and whatever jump it produced is
    /// discarded.
    pub fn trigger_parallel(&mut self, node: NodeId, output: &str) -> Result<(), RuntimeError> {
        let saved = self.jump.take();
        self.next(node, output)?;
        self.jump = saved;
        Ok(())
    }

    fn run_into(&mut self, mut node: NodeId, mut input: String) -> Result<(), RuntimeError> {
        loop {
            let graph = Arc::clone(&self.graph);
            let n = graph.try_node(node)?;
            n.flow_input(&input)
                .ok_or_else(|| self.port_not_found(node, &input))?;
            let behavior = Arc::clone(n.behavior());
            if self.kind == FlowKind::Regular && behavior.is_coroutine() {
                return Err(RuntimeError::CoroutineRequired {
                    node,
                    type_name: behavior.type_name(),
                    graph: graph.name.clone(),
                });
            }
            tracing::trace!(node = node.0, ty = behavior.type_name(), input = %input, "execute");
            let exec = behavior.execute(&mut ExecCtx::new(self, node), &input)?;
            match exec {
                crate::node::Execution::End => return Ok(()),
                crate::node::Execution::Continue(out) => {
                    if self.jump.is_some() {
                        return Ok(());
                    }
                    let n = graph.try_node(node)?;
                    let port = n
                        .flow_output(&out)
                        .ok_or_else(|| self.port_not_found(node, &out))?;
                    match &port.target {
                        None => return Ok(()),
                        Some(link) => {
                            node = link.node;
                            input = link.input.clone();
                        }
                    }
                }
            }
        }
    }

    /// Pull the value of a node's value input.
    ///
    /// Literal sources clone; connected sources recursively invoke the
    /// source behavior's getter. There is no caching across calls: the
    /// model embraces re-evaluation over memoization.
    pub fn value(&mut self, node: NodeId, input: &str) -> Result<Value, RuntimeError> {
        let graph = Arc::clone(&self.graph);
        let n = graph.try_node(node)?;
        let port = n
            .value_input(input)
            .ok_or_else(|| self.port_not_found(node, input))?;
        let declared = port.ty.resolve();
        let required = port.required;
        match port.source.clone() {
            ValueSource::Unbound => {
                if required {
                    Err(RuntimeError::MissingInput {
                        node,
                        port: input.to_string(),
                        graph: graph.name.clone(),
                    })
                } else {
                    Ok(Value::Null)
                }
            }
            ValueSource::Literal(value) => Ok(value),
            ValueSource::Connected { node: src, output } => {
                let src_node = graph.try_node(src)?;
                let behavior = Arc::clone(src_node.behavior());
                let value = behavior.get_value(&mut ExecCtx::new(self, src), &output)?;
                self.coerce(value, &declared, node, input)
            }
        }
    }

    /// Write through a node's value input into the connected `ReadWrite`
    /// value output.
    pub fn assign(
        &mut self,
        node: NodeId,
        input: &str,
        value: Value,
    ) -> Result<(), RuntimeError> {
        let graph = Arc::clone(&self.graph);
        let n = graph.try_node(node)?;
        let port = n
            .value_input(input)
            .ok_or_else(|| self.port_not_found(node, input))?;
        match port.source.clone() {
            ValueSource::Connected { node: src, output } => {
                self.set_output_value(src, &output, value)
            }
            _ => Err(RuntimeError::MissingInput {
                node,
                port: input.to_string(),
                graph: graph.name.clone(),
            }),
        }
    }

    /// Invoke the setter of a `ReadWrite` value output directly.
    ///
    /// Calling this on a `ReadOnly` port is an error.
    pub fn set_output_value(
        &mut self,
        node: NodeId,
        output: &str,
        value: Value,
    ) -> Result<(), RuntimeError> {
        let graph = Arc::clone(&self.graph);
        let n = graph.try_node(node)?;
        let port = n
            .value_output(output)
            .ok_or_else(|| self.port_not_found(node, output))?;
        if port.accessibility != crate::port::Accessibility::ReadWrite {
            return Err(RuntimeError::ReadOnlyPort {
                node,
                port: output.to_string(),
                graph: graph.name.clone(),
            });
        }
        let behavior = Arc::clone(n.behavior());
        behavior.set_value(&mut ExecCtx::new(self, node), output, value)
    }

    fn coerce(
        &self,
        value: Value,
        declared: &ValueType,
        node: NodeId,
        port: &str,
    ) -> Result<Value, RuntimeError> {
        match declared {
            ValueType::Any => Ok(value),
            ValueType::Int => value
                .as_int()
                .map(Value::Int)
                .ok_or_else(|| self.type_error(node, port, declared, &value)),
            ValueType::Float => value
                .as_float()
                .map(Value::Float)
                .ok_or_else(|| self.type_error(node, port, declared, &value)),
            _ if value.type_of() == *declared => Ok(value),
            _ => Err(self.type_error(node, port, declared, &value)),
        }
    }

    fn type_error(
        &self,
        node: NodeId,
        port: &str,
        expected: &ValueType,
        found: &Value,
    ) -> RuntimeError {
        RuntimeError::TypeMismatch {
            node,
            port: port.to_string(),
            expected: expected.clone(),
            found: found.type_of(),
            graph: self.graph.name.clone(),
        }
    }

    fn port_not_found(&self, node: NodeId, port: &str) -> RuntimeError {
        RuntimeError::PortNotFound {
            node,
            type_name: self
                .graph
                .node(node)
                .map(|n| n.type_name())
                .unwrap_or("unknown"),
            port: port.to_string(),
            graph: self.graph.name.clone(),
        }
    }
}

/// Per-node view of a [`Flow`] handed to behaviors.
///
/// All port references are resolved against the node being executed, so
/// behaviors address their own ports by local key.
pub struct ExecCtx<'f> {
    flow: &'f mut Flow,
    node: NodeId,
}

impl<'f> ExecCtx<'f> {
    pub(crate) fn new(flow: &'f mut Flow, node: NodeId) -> Self {
        Self { flow, node }
    }

    /// The node being executed
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The graph being executed
    pub fn graph(&self) -> &Graph {
        &self.flow.graph
    }

    /// The instance this flow mutates
    pub fn instance(&self) -> &GraphInstance {
        &self.flow.instance
    }

    /// Shared handle to the graph, for code that outlives this call
    pub fn graph_handle(&self) -> Arc<Graph> {
        Arc::clone(&self.flow.graph)
    }

    /// Shared handle to the instance, for code that outlives this call
    pub fn instance_handle(&self) -> Arc<GraphInstance> {
        Arc::clone(&self.flow.instance)
    }

    /// Whether this flow may suspend
    pub fn is_coroutine_flow(&self) -> bool {
        self.flow.kind == FlowKind::Coroutine
    }

    /// Advance control through one of this node's flow outputs
    pub fn next(&mut self, output: &str) -> Result<(), RuntimeError> {
        let node = self.node;
        self.flow.next(node, output)
    }

    /// Run a sub-flow and reify its jump statement
    pub fn trigger(&mut self, output: &str) -> Result<Option<JumpStatement>, RuntimeError> {
        let node = self.node;
        self.flow.trigger(node, output)
    }

    /// Run a sub-flow with jump isolation
    pub fn trigger_parallel(&mut self, output: &str) -> Result<(), RuntimeError> {
        let node = self.node;
        self.flow.trigger_parallel(node, output)
    }

    /// Pull one of this node's value inputs
    pub fn input(&mut self, key: &str) -> Result<Value, RuntimeError> {
        let node = self.node;
        self.flow.value(node, key)
    }

    /// Pull a boolean input
    pub fn input_bool(&mut self, key: &str) -> Result<bool, RuntimeError> {
        let value = self.input(key)?;
        value
            .as_bool()
            .ok_or_else(|| self.mismatch(key, ValueType::Bool, &value))
    }

    /// Pull an integer input
    pub fn input_int(&mut self, key: &str) -> Result<i64, RuntimeError> {
        let value = self.input(key)?;
        value
            .as_int()
            .ok_or_else(|| self.mismatch(key, ValueType::Int, &value))
    }

    /// Pull a float input
    pub fn input_float(&mut self, key: &str) -> Result<f64, RuntimeError> {
        let value = self.input(key)?;
        value
            .as_float()
            .ok_or_else(|| self.mismatch(key, ValueType::Float, &value))
    }

    /// Pull a string input
    pub fn input_string(&mut self, key: &str) -> Result<String, RuntimeError> {
        let value = self.input(key)?;
        match value {
            Value::String(s) => Ok(s),
            other => Err(self.mismatch(key, ValueType::String, &other)),
        }
    }

    /// Write through one of this node's value inputs
    pub fn assign(&mut self, key: &str, value: Value) -> Result<(), RuntimeError> {
        let node = self.node;
        self.flow.assign(node, key, value)
    }

    /// Current jump statement, if any
    pub fn jump(&self) -> Option<&JumpStatement> {
        self.flow.jump()
    }

    /// Set the jump statement
    pub fn set_jump(&mut self, jump: JumpStatement) {
        self.flow.set_jump(jump);
    }

    /// Take and clear the jump statement
    pub fn take_jump(&mut self) -> Option<JumpStatement> {
        self.flow.take_jump()
    }

    /// Take the error the coroutine machine delivered to this node's
    /// error step (see [`crate::node::NodeBehavior::error_step`])
    pub fn take_caught_error(&mut self) -> Option<RuntimeError> {
        self.flow.caught.take()
    }

    /// Read a parameter local of the current function invocation
    pub fn local(&self, name: &str) -> Option<Value> {
        self.flow.local(name)
    }

    /// Access this node's element-data slot, creating it on first use
    pub fn with_data<T, R>(
        &mut self,
        key: &'static str,
        init: impl FnOnce() -> T,
        f: impl FnOnce(&mut T) -> R,
    ) -> R
    where
        T: Any + Send,
    {
        self.flow.instance.with_data(self.node, key, init, f)
    }

    /// Read a copy of this node's element-data slot
    pub fn get_data<T>(&self, key: &'static str) -> Option<T>
    where
        T: Any + Send + Clone,
    {
        self.flow.instance.get_data(self.node, key)
    }

    /// Overwrite this node's element-data slot
    pub fn set_data<T>(&self, key: &'static str, value: T)
    where
        T: Any + Send,
    {
        self.flow.instance.set_data(self.node, key, value);
    }

    /// Read a graph variable from the instance
    pub fn variable(&self, name: &str) -> Result<Value, RuntimeError> {
        self.flow.instance.variable(&self.flow.graph, name)
    }

    /// Write a graph variable on the instance
    pub fn set_variable(&self, name: &str, value: Value) -> Result<(), RuntimeError> {
        self.flow.instance.set_variable(&self.flow.graph, name, value)
    }

    /// Error: a port key that was never registered
    pub fn port_not_found(&self, port: &str) -> RuntimeError {
        self.flow.port_not_found(self.node, port)
    }

    /// Error: write attempted on a read-only port
    pub fn read_only_port(&self, port: &str) -> RuntimeError {
        RuntimeError::ReadOnlyPort {
            node: self.node,
            port: port.to_string(),
            graph: self.flow.graph.name.clone(),
        }
    }

    /// Error: this behavior does not support the attempted operation
    pub fn unsupported(&self, detail: &str) -> RuntimeError {
        RuntimeError::Unsupported {
            node: self.node,
            type_name: self.type_name(),
            detail: detail.to_string(),
            graph: self.flow.graph.name.clone(),
        }
    }

    /// Error: this node requires a coroutine flow
    pub fn coroutine_required(&self) -> RuntimeError {
        RuntimeError::CoroutineRequired {
            node: self.node,
            type_name: self.type_name(),
            graph: self.flow.graph.name.clone(),
        }
    }

    /// Error: a graph-authored exception
    pub fn thrown(&self, value: Value) -> RuntimeError {
        RuntimeError::Thrown {
            node: self.node,
            value,
            graph: self.flow.graph.name.clone(),
        }
    }

    fn mismatch(&self, port: &str, expected: ValueType, found: &Value) -> RuntimeError {
        RuntimeError::TypeMismatch {
            node: self.node,
            port: port.to_string(),
            expected,
            found: found.type_of(),
            graph: self.flow.graph.name.clone(),
        }
    }

    fn type_name(&self) -> &'static str {
        self.flow
            .graph
            .node(self.node)
            .map(|n| n.type_name())
            .unwrap_or("unknown")
    }
}
