// SPDX-License-Identifier: MIT OR Apache-2.0
//! Hierarchical state machine for FlowScript.
//!
//! Built atop the graph runtime's flow and port model:
//! - States own ordered transition lists (first-match-wins)
//! - Any-state transitions are checked before the active state each tick
//! - Nested states are simultaneously a state and a machine
//! - Graph-backed states run `enter`/`tick`/`exit` flow branches,
//!   including suspendable enter branches stopped on exit
//!
//! ## Architecture
//!
//! [`StateMachine`] arena-owns [`State`]s; behaviors implement
//! [`StateBehavior`]/[`TransitionBehavior`]. The `graph_state` module
//! binds machines to `state`/`transition` nodes and stashes each live
//! machine in its instance's user-data slot.

pub mod graph_state;
pub mod machine;
pub mod nested;
pub mod state;
pub mod transition;

pub use graph_state::{
    build_machine, register_fsm_nodes, AnyStateNode, GraphState, GraphTransition,
    StateMachineNode, StateNode, TransitionNode,
};
pub use machine::{FsmError, StateCtx, StateMachine};
pub use nested::NestedState;
pub use state::{EmptyState, State, StateBehavior, StateId};
pub use transition::{Always, Never, Transition, TransitionBehavior};
