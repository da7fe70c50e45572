// SPDX-License-Identifier: MIT OR Apache-2.0
//! Nested states: a state that is itself a state machine.

use crate::machine::{StateCtx, StateMachine};
use crate::state::StateBehavior;
use flowscript_graph::RuntimeError;

/// A composite state wrapping an inner machine, enabling arbitrary
/// nesting depth.
///
/// Entering initializes and enters the inner start state; exiting exits
/// the inner active state exactly once before the nested state itself;
/// ticking delegates to the inner machine (so inner any-state and
/// per-state transitions keep their ordering guarantees).
pub struct NestedState {
    /// The inner machine
    pub machine: StateMachine,
}

impl NestedState {
    /// Wrap an inner machine
    pub fn new(machine: StateMachine) -> Self {
        Self { machine }
    }
}

impl StateBehavior for NestedState {
    fn on_enter(&mut self, ctx: &mut StateCtx) -> Result<(), RuntimeError> {
        self.machine.restart(ctx)
    }

    fn on_tick(&mut self, ctx: &mut StateCtx) -> Result<(), RuntimeError> {
        self.machine.tick(ctx)
    }

    fn on_exit(&mut self, ctx: &mut StateCtx) -> Result<(), RuntimeError> {
        // `stop` exits the inner active state and idles the machine, so
        // a later re-entry starts fresh and nothing is exited twice.
        self.machine.stop(ctx)
    }
}
