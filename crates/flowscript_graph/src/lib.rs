// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph execution runtime for FlowScript.
//!
//! This crate turns a declarative node graph (nodes, typed ports,
//! connections) into deterministic, replayable control and data flow:
//! - Typed flow/value ports with registration-time validation
//! - Pull-based, uncached value resolution
//! - Jump-statement semantics (return/break/continue) through nested
//!   flow constructs
//! - Per-instance storage so one graph definition can run many times
//!   concurrently without cross-talk
//! - Regular (synchronous) and coroutine (suspendable) runners sharing
//!   one port/connection model
//!
//! ## Architecture
//!
//! A [`Graph`] owns an arena of [`Node`]s built from
//! [`NodeBehavior`] implementations. Each run creates a [`Flow`]
//! against a [`GraphInstance`]; a [`RegularGraphRunner`] drives it to
//! completion while a [`CoroutineGraphRunner`] wraps it as a resumable
//! [`CoroutineFlow`].

pub mod analysis;
pub mod asset;
pub mod codegen;
pub mod coroutine;
pub mod error;
pub mod events;
pub mod flow;
pub mod graph;
pub mod instance;
pub mod node;
pub mod port;
pub mod runner;
pub mod runtime;
pub mod validate;
pub mod value;

pub use asset::{AssetError, GraphAsset, GRAPH_FORMAT_VERSION};
pub use codegen::CodeGen;
pub use coroutine::{
    CoroutineFlow, CoroutineScheduler, CoroutineState, TypedCoroutine, TypedState,
    YieldInstruction,
};
pub use error::RuntimeError;
pub use events::{EventHub, EventKey};
pub use flow::{ExecCtx, Flow, FlowKind, JumpStatement};
pub use graph::{ConnectError, Function, FunctionKind, Graph, GraphId, Parameter, Variable};
pub use instance::{GraphInstance, InstanceId};
pub use node::{
    Execution, Node, NodeBehavior, NodeCategory, NodeId, NodeRegistry, NodeSpec, NodeTypeInfo,
    StepOutcome,
};
pub use port::{
    Accessibility, FlowInput, FlowLink, FlowOutput, TypeHint, ValueInput, ValueOutput, ValueSource,
};
pub use runner::{
    invoke_function, CoroutineGraphRunner, FunctionInvocation, RegularGraphRunner,
};
pub use runtime::Runtime;
pub use validate::{log_issues, validate_graph, ValidationIssue};
pub use value::{Value, ValueType};
