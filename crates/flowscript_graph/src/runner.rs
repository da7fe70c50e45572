// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph runners: the strategy objects that drive a flow.
//!
//! `RegularGraphRunner` executes fully to completion inside one call;
//! any node requiring suspension is a fatal configuration error there.
//! `CoroutineGraphRunner` wraps execution as a resumable
//! [`CoroutineFlow`]. Which runner a function uses is decided once per
//! function by static analysis over its reachable flow (see
//! [`crate::analysis`]).

use crate::analysis;
use crate::coroutine::CoroutineFlow;
use crate::error::RuntimeError;
use crate::flow::{Flow, FlowKind, JumpStatement};
use crate::graph::{Function, FunctionKind, Graph};
use crate::instance::GraphInstance;
use crate::node::NodeId;
use crate::value::Value;
use std::sync::Arc;

/// Drives a flow to completion synchronously.
pub struct RegularGraphRunner;

impl RegularGraphRunner {
    /// Create a fresh regular flow
    pub fn new_flow(graph: &Arc<Graph>, instance: &Arc<GraphInstance>) -> Flow {
        Flow::new(Arc::clone(graph), Arc::clone(instance), FlowKind::Regular)
    }

    /// Run the flow behind a node's output to completion and reify the
    /// resulting jump statement.
    pub fn run(
        graph: &Arc<Graph>,
        instance: &Arc<GraphInstance>,
        node: NodeId,
        output: &str,
    ) -> Result<Option<JumpStatement>, RuntimeError> {
        let mut flow = Self::new_flow(graph, instance);
        flow.next(node, output)?;
        Ok(flow.take_jump())
    }

    /// Invoke a function synchronously and surface its return value.
    ///
    /// An escaping `break`/`continue` indicates a malformed graph and is
    /// raised as [`RuntimeError::JumpEscaped`].
    pub fn call(
        graph: &Arc<Graph>,
        instance: &Arc<GraphInstance>,
        function: &str,
        args: &[Value],
    ) -> Result<Option<Value>, RuntimeError> {
        let mut flow = Self::new_flow(graph, instance);
        let (entry, output) = bind_invocation(graph, &mut flow, function, args)?;
        tracing::debug!(graph = %graph.name, function, "regular function call");
        flow.next(entry, &output)?;
        match flow.take_jump() {
            None => Ok(None),
            Some(JumpStatement::Return(value)) => Ok(value),
            Some(other) => Err(RuntimeError::JumpEscaped {
                jump: other.kind(),
                graph: graph.name.clone(),
            }),
        }
    }
}

/// Produces resumable coroutine flows.
pub struct CoroutineGraphRunner;

impl CoroutineGraphRunner {
    /// Start a coroutine flow from a node's output.
    ///
    /// The flow does not execute until the first
    /// [`resume`](CoroutineFlow::resume).
    pub fn new_coroutine(
        graph: &Arc<Graph>,
        instance: &Arc<GraphInstance>,
        node: NodeId,
        output: &str,
    ) -> Result<CoroutineFlow, RuntimeError> {
        let flow = Flow::new(Arc::clone(graph), Arc::clone(instance), FlowKind::Coroutine);
        CoroutineFlow::new(flow, node, output)
    }

    /// Invoke a function as a coroutine.
    pub fn call(
        graph: &Arc<Graph>,
        instance: &Arc<GraphInstance>,
        function: &str,
        args: &[Value],
    ) -> Result<CoroutineFlow, RuntimeError> {
        let mut flow = Flow::new(Arc::clone(graph), Arc::clone(instance), FlowKind::Coroutine);
        let (entry, output) = bind_invocation(graph, &mut flow, function, args)?;
        tracing::debug!(graph = %graph.name, function, "coroutine function call");
        CoroutineFlow::new(flow, entry, &output)
    }
}

/// Result of invoking a function through [`invoke_function`].
pub enum FunctionInvocation {
    /// The function ran to completion synchronously
    Completed(Option<Value>),
    /// The function suspended; drive the returned flow to completion
    Coroutine(CoroutineFlow),
}

/// Invoke a function, picking the runner from static analysis.
///
/// A function whose reachable flow contains no coroutine-requiring node
/// runs through the regular runner for efficiency; otherwise it runs as
/// a coroutine. The decision is made once per invocation target, not
/// per node.
pub fn invoke_function(
    graph: &Arc<Graph>,
    instance: &Arc<GraphInstance>,
    function: &str,
    args: &[Value],
) -> Result<FunctionInvocation, RuntimeError> {
    let func = graph.try_function(function)?;
    match analysis::function_kind(graph, func) {
        FunctionKind::Regular => {
            RegularGraphRunner::call(graph, instance, function, args).map(FunctionInvocation::Completed)
        }
        FunctionKind::Coroutine => {
            CoroutineGraphRunner::call(graph, instance, function, args).map(FunctionInvocation::Coroutine)
        }
    }
}

/// Resolve a function's entry point and bind arguments as flow locals.
fn bind_invocation(
    graph: &Arc<Graph>,
    flow: &mut Flow,
    function: &str,
    args: &[Value],
) -> Result<(NodeId, String), RuntimeError> {
    let func = graph.try_function(function)?;
    if args.len() != func.parameters.len() {
        return Err(RuntimeError::ArgumentMismatch {
            function: function.to_string(),
            detail: format!(
                "expected {} arguments, got {}",
                func.parameters.len(),
                args.len()
            ),
            graph: graph.name.clone(),
        });
    }
    for (param, arg) in func.parameters.iter().zip(args) {
        if !arg.conforms_to(&param.ty) {
            return Err(RuntimeError::ArgumentMismatch {
                function: function.to_string(),
                detail: format!(
                    "parameter `{}` expects {:?}, got {:?}",
                    param.name,
                    param.ty,
                    arg.type_of()
                ),
                graph: graph.name.clone(),
            });
        }
        flow.set_local(param.name.clone(), arg.clone());
    }
    entry_output(graph, func)
}

pub(crate) fn entry_output(
    graph: &Arc<Graph>,
    func: &Function,
) -> Result<(NodeId, String), RuntimeError> {
    let entry = func.entry.ok_or_else(|| RuntimeError::FunctionEntryMissing {
        name: func.name.clone(),
        graph: graph.name.clone(),
    })?;
    let node = graph.try_node(entry)?;
    let output = node
        .flow_outputs
        .first()
        .ok_or_else(|| RuntimeError::FunctionEntryMissing {
            name: func.name.clone(),
            graph: graph.name.clone(),
        })?;
    Ok((entry, output.key.clone()))
}
