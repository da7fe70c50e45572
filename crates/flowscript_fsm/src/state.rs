// SPDX-License-Identifier: MIT OR Apache-2.0
//! State definitions.

use crate::machine::StateCtx;
use crate::transition::Transition;
use flowscript_graph::RuntimeError;

/// Unique identifier for a state within its owning machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateId(pub u32);

/// Behavior of a state: enter/tick/exit callbacks.
///
/// A state is active iff it is the current active state of its owning
/// machine; that fact is derived from the machine, never cached here.
pub trait StateBehavior: Send {
    /// Called when the state becomes active
    fn on_enter(&mut self, ctx: &mut StateCtx) -> Result<(), RuntimeError> {
        let _ = ctx;
        Ok(())
    }

    /// Called every tick while active, after transition evaluation
    fn on_tick(&mut self, ctx: &mut StateCtx) -> Result<(), RuntimeError> {
        let _ = ctx;
        Ok(())
    }

    /// Called when the state stops being active
    fn on_exit(&mut self, ctx: &mut StateCtx) -> Result<(), RuntimeError> {
        let _ = ctx;
        Ok(())
    }
}

/// A state: a behavior plus its ordered transition list.
pub struct State {
    /// Display name
    pub name: String,
    pub(crate) behavior: Box<dyn StateBehavior>,
    pub(crate) transitions: Vec<Transition>,
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("name", &self.name)
            .field("transitions", &self.transitions)
            .finish_non_exhaustive()
    }
}

impl State {
    pub(crate) fn new(name: impl Into<String>, behavior: Box<dyn StateBehavior>) -> Self {
        Self {
            name: name.into(),
            behavior,
            transitions: Vec::new(),
        }
    }

    /// Ordered transition list
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }
}

/// A state with no behavior of its own.
pub struct EmptyState;

impl StateBehavior for EmptyState {}
