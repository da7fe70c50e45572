// SPDX-License-Identifier: MIT OR Apache-2.0
//! The state machine: tick and transition algorithm.
//!
//! Ordering guarantees, per tick:
//! - any-state transitions are evaluated before the active state's own
//!   transitions or body
//! - a state's transitions are evaluated in declaration order with
//!   first-match-wins semantics
//! - `change_state` exits the outgoing state strictly before the active
//!   state is reassigned, then enters the new state as its documented
//!   final step; entering re-checks the new state's transitions and
//!   cascades through pass-through states.

use crate::state::{State, StateBehavior, StateId};
use crate::transition::Transition;
use flowscript_graph::{Graph, GraphInstance, RuntimeError};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Arc;

/// Context handed to state and transition behaviors.
///
/// Graph-backed behaviors run flows against the graph and instance;
/// `delta` carries the host frame time for coroutine pumping.
pub struct StateCtx {
    /// Graph the behaviors execute against
    pub graph: Arc<Graph>,
    /// Instance storage for this machine's run
    pub instance: Arc<GraphInstance>,
    /// Seconds since the previous tick
    pub delta: f64,
}

impl StateCtx {
    /// Create a context for one tick
    pub fn new(graph: Arc<Graph>, instance: Arc<GraphInstance>, delta: f64) -> Self {
        Self {
            graph,
            instance,
            delta,
        }
    }

    /// Context with an empty graph and fresh instance, for machines
    /// whose behaviors never touch a graph
    pub fn detached() -> Self {
        Self {
            graph: Arc::new(Graph::new("detached")),
            instance: Arc::new(GraphInstance::new()),
            delta: 0.0,
        }
    }
}

/// Error when assembling a machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FsmError {
    /// Referenced state does not exist in this machine
    #[error("unknown state: {0:?}")]
    UnknownState(StateId),
}

/// A hierarchical state machine.
///
/// States are arena-owned and addressed by [`StateId`]; a state belongs
/// to exactly one machine by construction. The any-state transition
/// list is always considered active and is checked before the regular
/// active state each tick.
#[derive(Debug, Default)]
pub struct StateMachine {
    states: IndexMap<StateId, State>,
    any_transitions: Vec<Transition>,
    active: Option<StateId>,
    start: Option<StateId>,
    ticked: bool,
    next_state: u32,
}

impl StateMachine {
    /// Create an empty machine
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a state; the first state added becomes the start state
    /// unless [`set_start`](Self::set_start) overrides it
    pub fn add_state(
        &mut self,
        name: impl Into<String>,
        behavior: Box<dyn StateBehavior>,
    ) -> StateId {
        let id = StateId(self.next_state);
        self.next_state += 1;
        self.states.insert(id, State::new(name, behavior));
        if self.start.is_none() {
            self.start = Some(id);
        }
        id
    }

    /// Append a transition to a state's ordered list
    pub fn add_transition(&mut self, from: StateId, transition: Transition) -> Result<(), FsmError> {
        if !self.states.contains_key(&transition.target) {
            return Err(FsmError::UnknownState(transition.target));
        }
        let state = self.states.get_mut(&from).ok_or(FsmError::UnknownState(from))?;
        state.transitions.push(transition);
        Ok(())
    }

    /// Append an any-state transition, checked every tick regardless of
    /// which state is active
    pub fn add_any_transition(&mut self, transition: Transition) -> Result<(), FsmError> {
        if !self.states.contains_key(&transition.target) {
            return Err(FsmError::UnknownState(transition.target));
        }
        self.any_transitions.push(transition);
        Ok(())
    }

    /// Override the start state
    pub fn set_start(&mut self, id: StateId) -> Result<(), FsmError> {
        if !self.states.contains_key(&id) {
            return Err(FsmError::UnknownState(id));
        }
        self.start = Some(id);
        Ok(())
    }

    /// The currently active state, if any
    pub fn active(&self) -> Option<StateId> {
        self.active
    }

    /// Whether a state is the machine's current active state.
    ///
    /// Always derived from the machine; never cached on the state.
    pub fn is_active(&self, id: StateId) -> bool {
        self.active == Some(id)
    }

    /// Get a state by id
    pub fn state(&self, id: StateId) -> Option<&State> {
        self.states.get(&id)
    }

    /// Number of states
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Enter the start state (with cascade through pass-through states)
    pub fn start(&mut self, ctx: &mut StateCtx) -> Result<(), RuntimeError> {
        self.active = self.start;
        self.enter_active(ctx)
    }

    /// Reset to a fresh, never-ticked machine and enter the start state
    pub fn restart(&mut self, ctx: &mut StateCtx) -> Result<(), RuntimeError> {
        self.active = None;
        self.ticked = false;
        self.start(ctx)
    }

    /// Exit the active state (exactly once) and leave the machine idle
    pub fn stop(&mut self, ctx: &mut StateCtx) -> Result<(), RuntimeError> {
        self.exit_active(ctx)?;
        self.active = None;
        Ok(())
    }

    /// Advance the machine one tick.
    ///
    /// On the first tick only, any-state transitions get their `on_enter`
    /// (lazy one-time initialization). Every tick, any-state transitions
    /// are evaluated first; if one fires, the active state is not ticked
    /// this frame. Otherwise the active state evaluates its own
    /// transitions in declaration order before running its body.
    pub fn tick(&mut self, ctx: &mut StateCtx) -> Result<(), RuntimeError> {
        if !self.ticked {
            self.ticked = true;
            for transition in &mut self.any_transitions {
                transition.behavior.on_enter(ctx)?;
            }
        }

        if let Some(index) = self.first_satisfied_any(ctx)? {
            let target = self.any_transitions[index].target;
            tracing::debug!(
                transition = %self.any_transitions[index].name,
                target = target.0,
                "any-state transition"
            );
            self.change_state(target, ctx)?;
            return Ok(());
        }

        self.tick_active(ctx)
    }

    /// Switch to `next`: exits the outgoing state (its transitions'
    /// `on_exit`, then its own) strictly before the active state is
    /// reassigned, then enters the new state.
    ///
    /// Entering is a documented step of this call: callers never invoke
    /// `enter` separately.
    pub fn change_state(&mut self, next: StateId, ctx: &mut StateCtx) -> Result<(), RuntimeError> {
        if !self.states.contains_key(&next) {
            return Err(RuntimeError::Custom(format!(
                "state machine has no state {next:?}"
            )));
        }
        self.exit_active(ctx)?;
        self.active = Some(next);
        self.enter_active(ctx)
    }

    fn first_satisfied_any(&mut self, ctx: &mut StateCtx) -> Result<Option<usize>, RuntimeError> {
        for (index, transition) in self.any_transitions.iter_mut().enumerate() {
            if transition.behavior.should_transition(ctx)? {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    fn tick_active(&mut self, ctx: &mut StateCtx) -> Result<(), RuntimeError> {
        let Some(active) = self.active else {
            return Ok(());
        };
        let mut fired = None;
        if let Some(state) = self.states.get_mut(&active) {
            // First match wins; later transitions are not evaluated.
            for transition in &mut state.transitions {
                if transition.behavior.should_transition(ctx)? {
                    fired = Some(transition.target);
                    break;
                }
            }
        }
        match fired {
            Some(target) => self.change_state(target, ctx),
            None => match self.states.get_mut(&active) {
                Some(state) => state.behavior.on_tick(ctx),
                None => Ok(()),
            },
        }
    }

    fn exit_active(&mut self, ctx: &mut StateCtx) -> Result<(), RuntimeError> {
        let Some(active) = self.active else {
            return Ok(());
        };
        if let Some(state) = self.states.get_mut(&active) {
            tracing::debug!(state = %state.name, "exit state");
            for transition in &mut state.transitions {
                transition.behavior.on_exit(ctx)?;
            }
            state.behavior.on_exit(ctx)?;
        }
        Ok(())
    }

    fn enter_active(&mut self, ctx: &mut StateCtx) -> Result<(), RuntimeError> {
        let mut visited: HashSet<StateId> = HashSet::new();
        loop {
            let Some(id) = self.active else {
                return Ok(());
            };
            if !visited.insert(id) {
                return Err(RuntimeError::Custom(format!(
                    "state machine pass-through cycle at state {id:?}"
                )));
            }
            let mut fired = None;
            if let Some(state) = self.states.get_mut(&id) {
                tracing::debug!(state = %state.name, "enter state");
                for transition in &mut state.transitions {
                    transition.behavior.on_enter(ctx)?;
                }
                state.behavior.on_enter(ctx)?;
                // A state can transition straight through on entry.
                for transition in &mut state.transitions {
                    if transition.behavior.should_transition(ctx)? {
                        fired = Some(transition.target);
                        break;
                    }
                }
            }
            match fired {
                None => return Ok(()),
                Some(target) => {
                    self.exit_active(ctx)?;
                    self.active = Some(target);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nested::NestedState;
    use crate::state::StateBehavior;
    use crate::transition::{Always, TransitionBehavior};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    type Log = Arc<Mutex<Vec<String>>>;

    struct LogState {
        label: &'static str,
        log: Log,
    }

    impl LogState {
        fn boxed(label: &'static str, log: &Log) -> Box<dyn StateBehavior> {
            Box::new(Self {
                label,
                log: Arc::clone(log),
            })
        }
    }

    impl StateBehavior for LogState {
        fn on_enter(&mut self, _ctx: &mut StateCtx) -> Result<(), RuntimeError> {
            self.log.lock().push(format!("enter:{}", self.label));
            Ok(())
        }

        fn on_tick(&mut self, _ctx: &mut StateCtx) -> Result<(), RuntimeError> {
            self.log.lock().push(format!("tick:{}", self.label));
            Ok(())
        }

        fn on_exit(&mut self, _ctx: &mut StateCtx) -> Result<(), RuntimeError> {
            self.log.lock().push(format!("exit:{}", self.label));
            Ok(())
        }
    }

    struct FlagTransition {
        label: &'static str,
        flag: Arc<AtomicBool>,
        evaluations: Arc<AtomicU32>,
        log: Log,
    }

    impl FlagTransition {
        fn boxed(
            label: &'static str,
            flag: &Arc<AtomicBool>,
            evaluations: &Arc<AtomicU32>,
            log: &Log,
        ) -> Box<dyn TransitionBehavior> {
            Box::new(Self {
                label,
                flag: Arc::clone(flag),
                evaluations: Arc::clone(evaluations),
                log: Arc::clone(log),
            })
        }
    }

    impl TransitionBehavior for FlagTransition {
        fn should_transition(&mut self, _ctx: &mut StateCtx) -> Result<bool, RuntimeError> {
            self.evaluations.fetch_add(1, Ordering::SeqCst);
            Ok(self.flag.load(Ordering::SeqCst))
        }

        fn on_enter(&mut self, _ctx: &mut StateCtx) -> Result<(), RuntimeError> {
            self.log.lock().push(format!("t-enter:{}", self.label));
            Ok(())
        }

        fn on_exit(&mut self, _ctx: &mut StateCtx) -> Result<(), RuntimeError> {
            self.log.lock().push(format!("t-exit:{}", self.label));
            Ok(())
        }
    }

    #[test]
    fn test_two_state_transition_sequencing() {
        let log: Log = Arc::default();
        let flag = Arc::new(AtomicBool::new(false));
        let evals = Arc::new(AtomicU32::new(0));

        let mut machine = StateMachine::new();
        let s0 = machine.add_state("s0", LogState::boxed("s0", &log));
        let s1 = machine.add_state("s1", LogState::boxed("s1", &log));
        machine
            .add_transition(s0, Transition::new("t", s1, FlagTransition::boxed("t", &flag, &evals, &log)))
            .unwrap();

        let mut ctx = StateCtx::detached();
        machine.start(&mut ctx).unwrap();
        assert!(machine.is_active(s0));

        flag.store(true, Ordering::SeqCst);
        machine.tick(&mut ctx).unwrap();

        assert!(machine.is_active(s1));
        assert!(!machine.is_active(s0));
        // Exact sequencing: transition exit, then state exit, strictly
        // before the new state is entered.
        assert_eq!(
            *log.lock(),
            vec![
                "t-enter:t",
                "enter:s0",
                "t-exit:t",
                "exit:s0",
                "enter:s1",
            ]
        );
        // s0 exited exactly once.
        assert_eq!(log.lock().iter().filter(|e| *e == "exit:s0").count(), 1);
    }

    #[test]
    fn test_first_match_wins() {
        let log: Log = Arc::default();
        let flag_a = Arc::new(AtomicBool::new(false));
        let flag_b = Arc::new(AtomicBool::new(false));
        let evals_a = Arc::new(AtomicU32::new(0));
        let evals_b = Arc::new(AtomicU32::new(0));

        let mut machine = StateMachine::new();
        let s0 = machine.add_state("s0", LogState::boxed("s0", &log));
        let s1 = machine.add_state("s1", LogState::boxed("s1", &log));
        let s2 = machine.add_state("s2", LogState::boxed("s2", &log));
        machine
            .add_transition(s0, Transition::new("a", s1, FlagTransition::boxed("a", &flag_a, &evals_a, &log)))
            .unwrap();
        machine
            .add_transition(s0, Transition::new("b", s2, FlagTransition::boxed("b", &flag_b, &evals_b, &log)))
            .unwrap();

        let mut ctx = StateCtx::detached();
        machine.start(&mut ctx).unwrap();
        let evals_b_after_start = evals_b.load(Ordering::SeqCst);

        // Both satisfied in the same tick: only the lowest-index fires.
        flag_a.store(true, Ordering::SeqCst);
        flag_b.store(true, Ordering::SeqCst);
        machine.tick(&mut ctx).unwrap();

        assert!(machine.is_active(s1));
        // `b` was never evaluated once `a` matched.
        assert_eq!(evals_b.load(Ordering::SeqCst), evals_b_after_start);
    }

    #[test]
    fn test_any_state_precedence() {
        let log: Log = Arc::default();
        let any_flag = Arc::new(AtomicBool::new(false));
        let own_flag = Arc::new(AtomicBool::new(false));
        let any_evals = Arc::new(AtomicU32::new(0));
        let own_evals = Arc::new(AtomicU32::new(0));

        let mut machine = StateMachine::new();
        let s0 = machine.add_state("s0", LogState::boxed("s0", &log));
        let s1 = machine.add_state("s1", LogState::boxed("s1", &log));
        let s2 = machine.add_state("s2", LogState::boxed("s2", &log));
        machine
            .add_transition(s0, Transition::new("own", s2, FlagTransition::boxed("own", &own_flag, &own_evals, &log)))
            .unwrap();
        machine
            .add_any_transition(Transition::new("any", s1, FlagTransition::boxed("any", &any_flag, &any_evals, &log)))
            .unwrap();

        let mut ctx = StateCtx::detached();
        machine.start(&mut ctx).unwrap();
        let own_evals_after_start = own_evals.load(Ordering::SeqCst);

        any_flag.store(true, Ordering::SeqCst);
        own_flag.store(true, Ordering::SeqCst);
        machine.tick(&mut ctx).unwrap();

        // The any-state transition won; the active state's own
        // transitions and body were not evaluated this tick.
        assert!(machine.is_active(s1));
        assert_eq!(own_evals.load(Ordering::SeqCst), own_evals_after_start);
        assert!(!log.lock().iter().any(|e| e == "tick:s0"));
    }

    #[test]
    fn test_any_transitions_initialized_on_first_tick_only() {
        let log: Log = Arc::default();
        let flag = Arc::new(AtomicBool::new(false));
        let evals = Arc::new(AtomicU32::new(0));

        let mut machine = StateMachine::new();
        let s0 = machine.add_state("s0", LogState::boxed("s0", &log));
        machine
            .add_any_transition(Transition::new("any", s0, FlagTransition::boxed("any", &flag, &evals, &log)))
            .unwrap();

        let mut ctx = StateCtx::detached();
        machine.start(&mut ctx).unwrap();
        machine.tick(&mut ctx).unwrap();
        machine.tick(&mut ctx).unwrap();

        let initializations = log
            .lock()
            .iter()
            .filter(|e| *e == "t-enter:any")
            .count();
        assert_eq!(initializations, 1);
    }

    #[test]
    fn test_enter_cascades_through_pass_through_states() {
        let log: Log = Arc::default();
        let mut machine = StateMachine::new();
        let s0 = machine.add_state("s0", LogState::boxed("s0", &log));
        let s1 = machine.add_state("s1", LogState::boxed("s1", &log));
        let s2 = machine.add_state("s2", LogState::boxed("s2", &log));
        machine
            .add_transition(s0, Transition::new("t0", s1, Box::new(Always)))
            .unwrap();
        machine
            .add_transition(s1, Transition::new("t1", s2, Box::new(Always)))
            .unwrap();

        let mut ctx = StateCtx::detached();
        machine.start(&mut ctx).unwrap();
        assert!(machine.is_active(s2));
        assert_eq!(
            *log.lock(),
            vec!["enter:s0", "exit:s0", "enter:s1", "exit:s1", "enter:s2"]
        );
    }

    #[test]
    fn test_pass_through_cycle_is_an_error() {
        let mut machine = StateMachine::new();
        let s0 = machine.add_state("s0", Box::new(crate::state::EmptyState));
        let s1 = machine.add_state("s1", Box::new(crate::state::EmptyState));
        machine
            .add_transition(s0, Transition::new("t0", s1, Box::new(Always)))
            .unwrap();
        machine
            .add_transition(s1, Transition::new("t1", s0, Box::new(Always)))
            .unwrap();

        let mut ctx = StateCtx::detached();
        assert!(machine.start(&mut ctx).is_err());
    }

    #[test]
    fn test_nested_state_enter_exit() {
        let log: Log = Arc::default();
        let flag = Arc::new(AtomicBool::new(false));
        let evals = Arc::new(AtomicU32::new(0));

        let mut inner = StateMachine::new();
        inner.add_state("inner-a", LogState::boxed("inner-a", &log));

        let mut outer = StateMachine::new();
        let nested = outer.add_state("nested", Box::new(NestedState::new(inner)));
        let plain = outer.add_state("plain", LogState::boxed("plain", &log));
        outer
            .add_transition(nested, Transition::new("leave", plain, FlagTransition::boxed("leave", &flag, &evals, &log)))
            .unwrap();

        let mut ctx = StateCtx::detached();
        outer.start(&mut ctx).unwrap();
        // Entering the nested state entered its internal start state.
        assert!(log.lock().contains(&"enter:inner-a".to_string()));

        outer.tick(&mut ctx).unwrap();
        assert!(log.lock().contains(&"tick:inner-a".to_string()));

        flag.store(true, Ordering::SeqCst);
        outer.tick(&mut ctx).unwrap();
        assert!(outer.is_active(plain));
        // The internal active state was exited exactly once.
        assert_eq!(log.lock().iter().filter(|e| *e == "exit:inner-a").count(), 1);
    }

    #[test]
    fn test_stop_exits_exactly_once() {
        let log: Log = Arc::default();
        let mut machine = StateMachine::new();
        machine.add_state("s0", LogState::boxed("s0", &log));

        let mut ctx = StateCtx::detached();
        machine.start(&mut ctx).unwrap();
        machine.stop(&mut ctx).unwrap();
        machine.stop(&mut ctx).unwrap();

        assert_eq!(log.lock().iter().filter(|e| *e == "exit:s0").count(), 1);
        assert_eq!(machine.active(), None);
    }

    #[test]
    fn test_tick_without_active_state_is_noop() {
        let mut machine = StateMachine::new();
        let mut ctx = StateCtx::detached();
        machine.tick(&mut ctx).unwrap();
        assert_eq!(machine.active(), None);
    }
}
