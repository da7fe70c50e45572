// SPDX-License-Identifier: MIT OR Apache-2.0
//! Runtime error taxonomy.
//!
//! Errors carry the originating node and graph identity so a host-side
//! diagnostic layer can pinpoint the faulty node without a debugger.
//! Configuration errors on malformed graphs are never silently swallowed;
//! only graph-authored try/catch constructs intercept thrown graph
//! exceptions.

use crate::node::NodeId;
use crate::value::{Value, ValueType};

/// Error raised during flow or value execution.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    /// Node not found in the graph arena
    #[error("node {node:?} not found in graph `{graph}`")]
    NodeNotFound {
        /// Missing node
        node: NodeId,
        /// Owning graph
        graph: String,
    },

    /// A port key that was never registered was requested
    #[error("port `{port}` not found on node {node:?} (`{type_name}`) in graph `{graph}`")]
    PortNotFound {
        /// Owning node
        node: NodeId,
        /// Node type
        type_name: &'static str,
        /// Requested port key
        port: String,
        /// Owning graph
        graph: String,
    },

    /// A required value input has neither a connection nor a literal
    #[error("input `{port}` on node {node:?} in graph `{graph}` has no connection or literal")]
    MissingInput {
        /// Owning node
        node: NodeId,
        /// Unbound port key
        port: String,
        /// Owning graph
        graph: String,
    },

    /// A value did not conform to the declared port type
    #[error(
        "type mismatch at port `{port}` on node {node:?} in graph `{graph}`: \
         expected {expected:?}, found {found:?}"
    )]
    TypeMismatch {
        /// Owning node
        node: NodeId,
        /// Port key
        port: String,
        /// Declared type
        expected: ValueType,
        /// Actual value type
        found: ValueType,
        /// Owning graph
        graph: String,
    },

    /// `set_value` was invoked on a read-only value output
    #[error("value port `{port}` on node {node:?} in graph `{graph}` is read-only")]
    ReadOnlyPort {
        /// Owning node
        node: NodeId,
        /// Port key
        port: String,
        /// Owning graph
        graph: String,
    },

    /// A coroutine-only node was executed by a regular flow
    #[error(
        "node {node:?} (`{type_name}`) in graph `{graph}` requires suspension and \
         cannot run in a regular flow; invoke it through the coroutine runner"
    )]
    CoroutineRequired {
        /// Offending node
        node: NodeId,
        /// Node type
        type_name: &'static str,
        /// Owning graph
        graph: String,
    },

    /// A jump statement reached a boundary with no consuming construct
    #[error("`{jump}` escaped with no enclosing construct to consume it in graph `{graph}`")]
    JumpEscaped {
        /// Kind of the escaping jump
        jump: &'static str,
        /// Owning graph
        graph: String,
    },

    /// A graph-authored exception (`throw` node)
    #[error("graph exception thrown by node {node:?} in graph `{graph}`: {value:?}")]
    Thrown {
        /// Throwing node
        node: NodeId,
        /// Thrown payload
        value: Value,
        /// Owning graph
        graph: String,
    },

    /// A variable write did not conform to the declared type
    #[error(
        "type mismatch writing variable `{name}` in graph `{graph}`: \
         expected {expected:?}, found {found:?}"
    )]
    VariableTypeMismatch {
        /// Variable name
        name: String,
        /// Declared type
        expected: ValueType,
        /// Actual value type
        found: ValueType,
        /// Owning graph
        graph: String,
    },

    /// Variable reference that is not declared on the graph
    #[error("variable `{name}` is not declared in graph `{graph}`")]
    UnknownVariable {
        /// Variable name
        name: String,
        /// Owning graph
        graph: String,
    },

    /// Function reference that is not declared on the graph
    #[error("function `{name}` is not declared in graph `{graph}`")]
    UnknownFunction {
        /// Function name
        name: String,
        /// Owning graph
        graph: String,
    },

    /// Function invoked with arguments that do not fit its signature
    #[error("bad arguments for function `{function}` in graph `{graph}`: {detail}")]
    ArgumentMismatch {
        /// Function name
        function: String,
        /// What did not fit
        detail: String,
        /// Owning graph
        graph: String,
    },

    /// Function invoked without an entry node
    #[error("function `{name}` in graph `{graph}` has no entry node")]
    FunctionEntryMissing {
        /// Function name
        name: String,
        /// Owning graph
        graph: String,
    },

    /// A behavior was asked for an operation it does not implement
    #[error("node {node:?} (`{type_name}`) in graph `{graph}` {detail}")]
    Unsupported {
        /// Owning node
        node: NodeId,
        /// Node type
        type_name: &'static str,
        /// What was attempted
        detail: String,
        /// Owning graph
        graph: String,
    },

    /// Node-defined error
    #[error("{0}")]
    Custom(String),
}
