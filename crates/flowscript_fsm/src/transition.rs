// SPDX-License-Identifier: MIT OR Apache-2.0
//! Transition definitions.

use crate::machine::StateCtx;
use crate::state::StateId;
use flowscript_graph::RuntimeError;

/// Behavior of a transition: its condition plus enter/exit callbacks.
///
/// `on_enter` runs when the owning state is entered (or, for any-state
/// transitions, once on the machine's first tick); `on_exit` runs when
/// the owning state is exited, before the state's own exit body.
pub trait TransitionBehavior: Send {
    /// Whether the transition should fire this tick
    fn should_transition(&mut self, ctx: &mut StateCtx) -> Result<bool, RuntimeError>;

    /// Called when the owning state is entered
    fn on_enter(&mut self, ctx: &mut StateCtx) -> Result<(), RuntimeError> {
        let _ = ctx;
        Ok(())
    }

    /// Called when the owning state is exited
    fn on_exit(&mut self, ctx: &mut StateCtx) -> Result<(), RuntimeError> {
        let _ = ctx;
        Ok(())
    }
}

/// A transition to a target state.
pub struct Transition {
    /// Display name
    pub name: String,
    /// State this transition leads to
    pub target: StateId,
    pub(crate) behavior: Box<dyn TransitionBehavior>,
}

impl std::fmt::Debug for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transition")
            .field("name", &self.name)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl Transition {
    /// Create a transition
    pub fn new(
        name: impl Into<String>,
        target: StateId,
        behavior: Box<dyn TransitionBehavior>,
    ) -> Self {
        Self {
            name: name.into(),
            target,
            behavior,
        }
    }
}

/// A transition that always fires.
pub struct Always;

impl TransitionBehavior for Always {
    fn should_transition(&mut self, _ctx: &mut StateCtx) -> Result<bool, RuntimeError> {
        Ok(true)
    }
}

/// A transition that never fires on its own.
pub struct Never;

impl TransitionBehavior for Never {
    fn should_transition(&mut self, _ctx: &mut StateCtx) -> Result<bool, RuntimeError> {
        Ok(false)
    }
}
