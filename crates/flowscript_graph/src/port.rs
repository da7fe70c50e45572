// SPDX-License-Identifier: MIT OR Apache-2.0
//! Port definitions: flow and value endpoints on a node.
//!
//! Port identity is (owning node id, local key, direction). Connection
//! arity is fixed by construction: a `FlowOutput` targets at most one
//! `FlowInput`, a `ValueInput` reads from at most one `ValueOutput`.
//! Fan-out of control flow is modeled by the `flow_control` node, not by
//! the port.

use crate::node::NodeId;
use crate::value::{Value, ValueType};
use std::fmt;
use std::sync::Arc;

/// How a port's declared type is resolved.
///
/// Most ports declare a fixed type. Ports whose type depends on sibling
/// configuration (generic macro-style ports) defer resolution to a
/// callback evaluated at registration and validation time.
#[derive(Clone)]
pub enum TypeHint {
    /// Eagerly declared type
    Fixed(ValueType),
    /// Type resolved on demand
    Dynamic(Arc<dyn Fn() -> ValueType + Send + Sync>),
}

impl TypeHint {
    /// Resolve the declared type
    pub fn resolve(&self) -> ValueType {
        match self {
            Self::Fixed(ty) => ty.clone(),
            Self::Dynamic(f) => f(),
        }
    }
}

impl fmt::Debug for TypeHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(ty) => write!(f, "Fixed({ty:?})"),
            Self::Dynamic(_) => write!(f, "Dynamic(..)"),
        }
    }
}

impl From<ValueType> for TypeHint {
    fn from(ty: ValueType) -> Self {
        Self::Fixed(ty)
    }
}

/// An entry point for control flow on a node.
#[derive(Debug, Clone)]
pub struct FlowInput {
    /// Local port key
    pub key: String,
}

impl FlowInput {
    /// Create a flow input with the given key
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// An exit point for control flow on a node.
#[derive(Debug, Clone)]
pub struct FlowOutput {
    /// Local port key
    pub key: String,
    /// Connected flow input, if any. Dangling outputs are legal and
    /// simply terminate the branch.
    pub target: Option<FlowLink>,
}

/// A resolved flow connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowLink {
    /// Target node
    pub node: NodeId,
    /// Key of the target's flow input
    pub input: String,
}

impl FlowOutput {
    /// Create an unconnected flow output
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            target: None,
        }
    }
}

/// Where a value input gets its value from.
///
/// The tag makes the resolution strategy explicit: a literal owned by the
/// port, a connection to another node's computed output, or nothing.
#[derive(Debug, Clone)]
pub enum ValueSource {
    /// No literal and no connection
    Unbound,
    /// Inline literal owned by the port
    Literal(Value),
    /// Connected to a value output on another node
    Connected {
        /// Source node
        node: NodeId,
        /// Key of the source's value output
        output: String,
    },
}

impl ValueSource {
    /// Whether this source can produce a value
    pub fn is_bound(&self) -> bool {
        !matches!(self, Self::Unbound)
    }
}

/// A typed, pull-based input on a node.
#[derive(Debug, Clone)]
pub struct ValueInput {
    /// Local port key
    pub key: String,
    /// Declared type
    pub ty: TypeHint,
    /// Resolution strategy
    pub source: ValueSource,
    /// Whether validation requires this input to be bound
    pub required: bool,
}

impl ValueInput {
    /// Create an unbound value input
    pub fn new(key: impl Into<String>, ty: impl Into<TypeHint>) -> Self {
        Self {
            key: key.into(),
            ty: ty.into(),
            source: ValueSource::Unbound,
            required: false,
        }
    }

    /// Set a literal default
    pub fn with_literal(mut self, value: Value) -> Self {
        self.source = ValueSource::Literal(value);
        self
    }

    /// Mark as required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Whether a value output supports writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Accessibility {
    /// Get only
    #[default]
    ReadOnly,
    /// Get and set
    ReadWrite,
}

/// A typed, computed output on a node.
///
/// The value is produced by the owning node's behavior callback on every
/// pull; a value output may feed any number of consumers.
#[derive(Debug, Clone)]
pub struct ValueOutput {
    /// Local port key
    pub key: String,
    /// Declared type
    pub ty: TypeHint,
    /// Whether `set_value` is supported
    pub accessibility: Accessibility,
}

impl ValueOutput {
    /// Create a read-only value output
    pub fn new(key: impl Into<String>, ty: impl Into<TypeHint>) -> Self {
        Self {
            key: key.into(),
            ty: ty.into(),
            accessibility: Accessibility::ReadOnly,
        }
    }

    /// Mark as read-write
    pub fn read_write(mut self) -> Self {
        self.accessibility = Accessibility::ReadWrite;
        self
    }
}
