// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph-backed states, transitions and the state machine node.
//!
//! A `state` node exposes `enter`/`tick`/`exit` flow outputs; the
//! machine runs them when the state changes or ticks. Enter branches
//! that require suspension run as coroutine flows, pumped on every tick
//! and stopped when the state exits. A `transition` node points at its
//! target state through its `target` flow output and reads a boolean
//! `condition` value input. The live machine built from these nodes is
//! stashed in the instance's user-data slot, so every instance of the
//! graph runs its own machine.

use crate::machine::{FsmError, StateCtx, StateMachine};
use crate::state::{StateBehavior, StateId};
use crate::transition::{Transition, TransitionBehavior};
use flowscript_graph::{
    analysis, CoroutineGraphRunner, CoroutineScheduler, ExecCtx, Execution, Graph, NodeBehavior,
    NodeCategory, NodeId, NodeRegistry, NodeSpec, NodeTypeInfo, RegularGraphRunner, RuntimeError,
    Value, ValueInput, ValueType,
};
use std::collections::HashMap;
use std::sync::Arc;

/// A state driven by a `state` node's flow outputs.
pub struct GraphState {
    node: NodeId,
    coroutines: CoroutineScheduler,
}

impl GraphState {
    /// Create a state backed by the given `state` node
    pub fn new(node: NodeId) -> Self {
        Self {
            node,
            coroutines: CoroutineScheduler::new(),
        }
    }

    fn run_branch(&self, ctx: &mut StateCtx, output: &str) -> Result<(), RuntimeError> {
        // Jump statements never escape a state branch.
        let _ = RegularGraphRunner::run(&ctx.graph, &ctx.instance, self.node, output)?;
        Ok(())
    }

    fn enter_requires_coroutine(&self, graph: &Graph) -> Result<bool, RuntimeError> {
        let node = graph.try_node(self.node)?;
        let Some(out) = node.flow_output("enter") else {
            return Ok(false);
        };
        Ok(out
            .target
            .as_ref()
            .is_some_and(|link| analysis::requires_coroutine(graph, link.node)))
    }
}

impl StateBehavior for GraphState {
    fn on_enter(&mut self, ctx: &mut StateCtx) -> Result<(), RuntimeError> {
        if self.enter_requires_coroutine(&ctx.graph)? {
            let flow =
                CoroutineGraphRunner::new_coroutine(&ctx.graph, &ctx.instance, self.node, "enter")?;
            self.coroutines.spawn(flow);
            // Run up to the first suspension point right away.
            self.coroutines.update(0.0)
        } else {
            self.run_branch(ctx, "enter")
        }
    }

    fn on_tick(&mut self, ctx: &mut StateCtx) -> Result<(), RuntimeError> {
        self.coroutines.update(ctx.delta)?;
        self.run_branch(ctx, "tick")
    }

    fn on_exit(&mut self, ctx: &mut StateCtx) -> Result<(), RuntimeError> {
        // Exiting proactively stops every coroutine flow this state
        // started; there is no implicit cancellation anywhere else.
        self.coroutines.stop_all();
        self.run_branch(ctx, "exit")
    }
}

/// A transition driven by a `transition` node.
pub struct GraphTransition {
    node: NodeId,
}

impl GraphTransition {
    /// Create a transition backed by the given `transition` node
    pub fn new(node: NodeId) -> Self {
        Self { node }
    }

    fn run_branch(&self, ctx: &mut StateCtx, output: &str) -> Result<(), RuntimeError> {
        let node = ctx.graph.try_node(self.node)?;
        if node.flow_output(output).is_none() {
            return Ok(());
        }
        let _ = RegularGraphRunner::run(&ctx.graph, &ctx.instance, self.node, output)?;
        Ok(())
    }
}

impl TransitionBehavior for GraphTransition {
    fn should_transition(&mut self, ctx: &mut StateCtx) -> Result<bool, RuntimeError> {
        let mut flow = RegularGraphRunner::new_flow(&ctx.graph, &ctx.instance);
        match flow.value(self.node, "condition")? {
            Value::Bool(b) => Ok(b),
            Value::Null => Ok(false),
            other => Err(RuntimeError::TypeMismatch {
                node: self.node,
                port: "condition".to_string(),
                expected: ValueType::Bool,
                found: other.type_of(),
                graph: ctx.graph.name.clone(),
            }),
        }
    }

    fn on_enter(&mut self, ctx: &mut StateCtx) -> Result<(), RuntimeError> {
        self.run_branch(ctx, "on_enter")
    }

    fn on_exit(&mut self, ctx: &mut StateCtx) -> Result<(), RuntimeError> {
        self.run_branch(ctx, "on_exit")
    }
}

/// Assemble a [`StateMachine`] from a `state_machine` node's children.
///
/// Child `state` nodes become states (the first one is the start
/// state); their child `transition` nodes become transitions, targeted
/// through each transition's `target` flow link. Children of an
/// `any_state` node become machine-level any-state transitions.
pub fn build_machine(graph: &Graph, machine_node: NodeId) -> Result<StateMachine, RuntimeError> {
    let mut machine = StateMachine::new();
    let mut state_ids: HashMap<NodeId, StateId> = HashMap::new();
    let container = graph.try_node(machine_node)?;

    for &child in &container.children {
        let node = graph.try_node(child)?;
        if node.type_name() == "state" {
            let id = machine.add_state(node.name.clone(), Box::new(GraphState::new(child)));
            state_ids.insert(child, id);
        }
    }

    for &child in &container.children {
        let node = graph.try_node(child)?;
        let is_any = node.type_name() == "any_state";
        if node.type_name() != "state" && !is_any {
            continue;
        }
        for &t in &node.children {
            let transition_node = graph.try_node(t)?;
            if transition_node.type_name() != "transition" {
                continue;
            }
            let target_link = transition_node
                .flow_output("target")
                .and_then(|o| o.target.as_ref())
                .ok_or_else(|| {
                    RuntimeError::Custom(format!(
                        "transition node {t:?} in graph `{}` has no target state",
                        graph.name
                    ))
                })?;
            let target = *state_ids.get(&target_link.node).ok_or_else(|| {
                RuntimeError::Custom(format!(
                    "transition node {t:?} in graph `{}` targets a non-state node",
                    graph.name
                ))
            })?;
            let transition = Transition::new(
                transition_node.name.clone(),
                target,
                Box::new(GraphTransition::new(t)),
            );
            let added = if is_any {
                machine.add_any_transition(transition)
            } else {
                machine.add_transition(state_ids[&child], transition)
            };
            added.map_err(|e: FsmError| RuntimeError::Custom(e.to_string()))?;
        }
    }

    tracing::debug!(
        graph = %graph.name,
        states = machine.state_count(),
        "state machine built"
    );
    Ok(machine)
}

const MACHINE_SLOT: &str = "machine";

/// Node behavior owning a state machine definition.
///
/// `start` builds the machine from the node's children and enters its
/// start state; `tick` advances it (pumping any running coroutine
/// flows); `stop` exits the active state and drops the live machine.
/// The live machine lives in instance storage, keyed by this node.
pub struct StateMachineNode;

impl NodeBehavior for StateMachineNode {
    fn type_name(&self) -> &'static str {
        "state_machine"
    }

    fn register(&self, spec: &mut NodeSpec) {
        spec.flow_input("start");
        spec.flow_input("tick");
        spec.flow_input("stop");
        spec.value_input(ValueInput::new("delta", ValueType::Float).with_literal(Value::Float(0.0)));
    }

    fn execute(&self, ctx: &mut ExecCtx<'_>, input: &str) -> Result<Execution, RuntimeError> {
        let node = ctx.node();
        match input {
            "start" => {
                let mut state_ctx =
                    StateCtx::new(ctx.graph_handle(), ctx.instance_handle(), 0.0);
                // Restarting while running stops the previous machine.
                if let Some(mut old) = ctx.instance().take_data::<StateMachine>(node, MACHINE_SLOT)
                {
                    old.stop(&mut state_ctx)?;
                }
                let mut machine = build_machine(ctx.graph(), node)?;
                machine.restart(&mut state_ctx)?;
                ctx.instance().set_data(node, MACHINE_SLOT, machine);
                Ok(Execution::End)
            }
            "tick" => {
                let delta = ctx.input_float("delta")?;
                let Some(mut machine) =
                    ctx.instance().take_data::<StateMachine>(node, MACHINE_SLOT)
                else {
                    return Ok(Execution::End);
                };
                let mut state_ctx =
                    StateCtx::new(ctx.graph_handle(), ctx.instance_handle(), delta);
                let result = machine.tick(&mut state_ctx);
                ctx.instance().set_data(node, MACHINE_SLOT, machine);
                result?;
                Ok(Execution::End)
            }
            "stop" => {
                if let Some(mut machine) =
                    ctx.instance().take_data::<StateMachine>(node, MACHINE_SLOT)
                {
                    let mut state_ctx =
                        StateCtx::new(ctx.graph_handle(), ctx.instance_handle(), 0.0);
                    machine.stop(&mut state_ctx)?;
                }
                Ok(Execution::End)
            }
            other => Err(ctx.port_not_found(other)),
        }
    }
}

/// Node behavior anchoring one state of a machine.
pub struct StateNode;

impl NodeBehavior for StateNode {
    fn type_name(&self) -> &'static str {
        "state"
    }

    fn register(&self, spec: &mut NodeSpec) {
        spec.flow_input("in");
        spec.flow_output("enter");
        spec.flow_output("tick");
        spec.flow_output("exit");
    }

    fn execute(&self, ctx: &mut ExecCtx<'_>, _input: &str) -> Result<Execution, RuntimeError> {
        Err(ctx.unsupported("is driven by its state machine, not by direct flow"))
    }
}

/// Node behavior grouping transitions that apply from every state.
pub struct AnyStateNode;

impl NodeBehavior for AnyStateNode {
    fn type_name(&self) -> &'static str {
        "any_state"
    }

    fn register(&self, _spec: &mut NodeSpec) {}
}

/// Node behavior describing one transition.
pub struct TransitionNode;

impl NodeBehavior for TransitionNode {
    fn type_name(&self) -> &'static str {
        "transition"
    }

    fn register(&self, spec: &mut NodeSpec) {
        spec.value_input(ValueInput::new("condition", ValueType::Bool));
        spec.flow_output("target");
        spec.flow_output("on_enter");
        spec.flow_output("on_exit");
    }

    fn execute(&self, ctx: &mut ExecCtx<'_>, _input: &str) -> Result<Execution, RuntimeError> {
        Err(ctx.unsupported("is driven by its state machine, not by direct flow"))
    }
}

/// Register the state machine node types.
pub fn register_fsm_nodes(registry: &mut NodeRegistry) {
    registry.register(
        NodeTypeInfo {
            id: "state_machine".to_string(),
            name: "State Machine".to_string(),
            category: NodeCategory::StateMachine,
            description: "Owns states and transitions; start/tick/stop it through flow".to_string(),
        },
        || Arc::new(StateMachineNode),
    );
    registry.register(
        NodeTypeInfo {
            id: "state".to_string(),
            name: "State".to_string(),
            category: NodeCategory::StateMachine,
            description: "One state: enter/tick/exit flow branches".to_string(),
        },
        || Arc::new(StateNode),
    );
    registry.register(
        NodeTypeInfo {
            id: "any_state".to_string(),
            name: "Any State".to_string(),
            category: NodeCategory::StateMachine,
            description: "Transitions that apply from every state".to_string(),
        },
        || Arc::new(AnyStateNode),
    );
    registry.register(
        NodeTypeInfo {
            id: "transition".to_string(),
            name: "Transition".to_string(),
            category: NodeCategory::StateMachine,
            description: "Condition-guarded edge between two states".to_string(),
        },
        || Arc::new(TransitionNode),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowscript_graph::{GraphInstance, StepOutcome, Variable, YieldInstruction};
    use parking_lot::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Entry;

    impl NodeBehavior for Entry {
        fn type_name(&self) -> &'static str {
            "entry"
        }

        fn register(&self, spec: &mut NodeSpec) {
            spec.flow_output("exit");
        }
    }

    struct Probe {
        label: &'static str,
        log: Log,
    }

    impl NodeBehavior for Probe {
        fn type_name(&self) -> &'static str {
            "probe"
        }

        fn register(&self, spec: &mut NodeSpec) {
            spec.flow_input("in");
            spec.flow_output("exit");
        }

        fn execute(&self, _ctx: &mut ExecCtx<'_>, _input: &str) -> Result<Execution, RuntimeError> {
            self.log.lock().push(self.label.to_string());
            Ok(Execution::next("exit"))
        }
    }

    /// Reads the `go` graph variable.
    struct GoFlag;

    impl NodeBehavior for GoFlag {
        fn type_name(&self) -> &'static str {
            "go_flag"
        }

        fn register(&self, spec: &mut NodeSpec) {
            spec.value_output(flowscript_graph::ValueOutput::new("out", ValueType::Bool));
        }

        fn get_value(&self, ctx: &mut ExecCtx<'_>, _output: &str) -> Result<Value, RuntimeError> {
            ctx.variable("go")
        }
    }

    struct TestWait {
        seconds: f64,
    }

    impl NodeBehavior for TestWait {
        fn type_name(&self) -> &'static str {
            "test_wait"
        }

        fn register(&self, spec: &mut NodeSpec) {
            spec.flow_input("in");
            spec.flow_output("exit");
        }

        fn is_coroutine(&self) -> bool {
            true
        }

        fn execute_step(
            &self,
            _ctx: &mut ExecCtx<'_>,
            _input: &str,
            step: u32,
        ) -> Result<StepOutcome, RuntimeError> {
            match step {
                0 => Ok(StepOutcome::Yield {
                    instruction: YieldInstruction::WaitSeconds(self.seconds),
                    resume_step: 1,
                }),
                _ => Ok(StepOutcome::finish_into("exit")),
            }
        }
    }

    struct Fixture {
        graph: Arc<flowscript_graph::Graph>,
        instance: Arc<GraphInstance>,
        start: NodeId,
        tick: NodeId,
        log: Log,
    }

    impl Fixture {
        fn start(&self) {
            RegularGraphRunner::run(&self.graph, &self.instance, self.start, "exit").unwrap();
        }

        fn tick(&self) {
            RegularGraphRunner::run(&self.graph, &self.instance, self.tick, "exit").unwrap();
        }

        fn set_go(&self, value: bool) {
            self.instance
                .set_variable(&self.graph, "go", Value::Bool(value))
                .unwrap();
        }
    }

    /// Two states A and B; A leaves for B once the `go` variable is set.
    /// `delta` is the literal fed to the machine's tick input.
    fn fixture(delta: f64, a_enter_waits: bool) -> Fixture {
        let log: Log = Arc::default();
        let mut graph = flowscript_graph::Graph::new("fsm-test");
        graph.add_variable(Variable::new("go", ValueType::Bool, Value::Bool(false)));

        let machine = graph.add_node(Arc::new(StateMachineNode));
        graph.set_literal(machine, "delta", Value::Float(delta)).unwrap();

        let state_a = graph.add_child_node(machine, Arc::new(StateNode)).unwrap();
        let state_b = graph.add_child_node(machine, Arc::new(StateNode)).unwrap();
        graph.node_mut(state_a).unwrap().name = "A".to_string();
        graph.node_mut(state_b).unwrap().name = "B".to_string();

        let probe = |graph: &mut flowscript_graph::Graph, label: &'static str| {
            graph.add_node(Arc::new(Probe {
                label,
                log: Arc::clone(&log),
            }))
        };

        if a_enter_waits {
            let wait = graph.add_node(Arc::new(TestWait { seconds: 1.0 }));
            let late = probe(&mut graph, "late");
            graph.connect_flow(state_a, "enter", wait, "in").unwrap();
            graph.connect_flow(wait, "exit", late, "in").unwrap();
        } else {
            let a_enter = probe(&mut graph, "A-enter");
            graph.connect_flow(state_a, "enter", a_enter, "in").unwrap();
        }
        let a_tick = probe(&mut graph, "A-tick");
        let a_exit = probe(&mut graph, "A-exit");
        let b_enter = probe(&mut graph, "B-enter");
        graph.connect_flow(state_a, "tick", a_tick, "in").unwrap();
        graph.connect_flow(state_a, "exit", a_exit, "in").unwrap();
        graph.connect_flow(state_b, "enter", b_enter, "in").unwrap();

        let transition = graph.add_child_node(state_a, Arc::new(TransitionNode)).unwrap();
        graph.connect_flow(transition, "target", state_b, "in").unwrap();
        let go = graph.add_node(Arc::new(GoFlag));
        graph.connect_value(transition, "condition", go, "out").unwrap();

        let start = graph.add_node(Arc::new(Entry));
        let tick = graph.add_node(Arc::new(Entry));
        graph.connect_flow(start, "exit", machine, "start").unwrap();
        graph.connect_flow(tick, "exit", machine, "tick").unwrap();

        Fixture {
            graph: Arc::new(graph),
            instance: Arc::new(GraphInstance::new()),
            start,
            tick,
            log,
        }
    }

    #[test]
    fn test_machine_node_runs_state_branches() {
        let fx = fixture(0.0, false);
        fx.start();
        assert_eq!(*fx.log.lock(), vec!["A-enter"]);

        fx.tick();
        assert_eq!(*fx.log.lock(), vec!["A-enter", "A-tick"]);

        fx.set_go(true);
        fx.tick();
        assert_eq!(
            *fx.log.lock(),
            vec!["A-enter", "A-tick", "A-exit", "B-enter"]
        );
    }

    #[test]
    fn test_instances_run_independent_machines() {
        let fx = fixture(0.0, false);
        fx.start();

        let other = Arc::new(GraphInstance::new());
        RegularGraphRunner::run(&fx.graph, &other, fx.start, "exit").unwrap();

        // Advancing one instance leaves the other's machine alone.
        fx.set_go(true);
        fx.tick();
        let log = fx.log.lock().clone();
        assert_eq!(log.iter().filter(|e| *e == "B-enter").count(), 1);

        // The second instance still sits in A.
        RegularGraphRunner::run(&fx.graph, &other, fx.tick, "exit").unwrap();
        let log = fx.log.lock().clone();
        assert_eq!(log.iter().filter(|e| *e == "A-tick").count(), 1);
        assert_eq!(log.iter().filter(|e| *e == "B-enter").count(), 1);
    }

    #[test]
    fn test_coroutine_enter_branch_resumes_on_tick() {
        let fx = fixture(1.5, true);
        fx.start();
        // The enter branch suspended at the wait.
        assert!(fx.log.lock().is_empty());

        // One tick pumps 1.5 seconds: the wait elapses.
        fx.tick();
        assert!(fx.log.lock().contains(&"late".to_string()));
    }

    #[test]
    fn test_exit_stops_coroutine_enter_branch() {
        let fx = fixture(0.1, true);
        fx.start();

        // Leave A before the wait elapses.
        fx.set_go(true);
        fx.tick();

        // The suspended flow was stopped; its tail never ran.
        assert!(!fx.log.lock().contains(&"late".to_string()));
        assert!(fx.log.lock().contains(&"A-exit".to_string()));

        fx.tick();
        assert!(!fx.log.lock().contains(&"late".to_string()));
    }

    #[test]
    fn test_build_machine_rejects_unlinked_transition() {
        let mut graph = flowscript_graph::Graph::new("broken");
        let machine = graph.add_node(Arc::new(StateMachineNode));
        let state = graph.add_child_node(machine, Arc::new(StateNode)).unwrap();
        let _transition = graph.add_child_node(state, Arc::new(TransitionNode)).unwrap();

        let err = build_machine(&graph, machine).unwrap_err();
        assert!(matches!(err, RuntimeError::Custom(_)));
    }
}
