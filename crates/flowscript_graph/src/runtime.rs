// SPDX-License-Identifier: MIT OR Apache-2.0
//! Session object bundling the runtime's shared services.
//!
//! Everything that would be tempting to make a process-wide static
//! (the node type registry, the event hub, the coroutine scheduler)
//! lives here instead, so multiple independent runtimes can coexist
//! (and tests never cross-contaminate).

use crate::coroutine::CoroutineFlow;
use crate::error::RuntimeError;
use crate::events::{EventHub, EventKey};
use crate::instance::GraphInstance;
use crate::node::NodeRegistry;
use crate::value::Value;

/// One runtime session: registry, event hub and coroutine scheduler.
#[derive(Default)]
pub struct Runtime {
    registry: NodeRegistry,
    events: EventHub,
    scheduler: crate::coroutine::CoroutineScheduler,
}

impl Runtime {
    /// Create an empty session
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session around a pre-populated registry
    pub fn with_registry(registry: NodeRegistry) -> Self {
        Self {
            registry,
            events: EventHub::new(),
            scheduler: crate::coroutine::CoroutineScheduler::new(),
        }
    }

    /// The node type registry
    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Mutable access for registering node types
    pub fn registry_mut(&mut self) -> &mut NodeRegistry {
        &mut self.registry
    }

    /// The host event hub
    pub fn events(&self) -> &EventHub {
        &self.events
    }

    /// Hand a coroutine flow to the session scheduler
    pub fn spawn(&mut self, flow: CoroutineFlow) {
        self.scheduler.spawn(flow);
    }

    /// Number of coroutine flows still running
    pub fn running_flows(&self) -> usize {
        self.scheduler.len()
    }

    /// Per-frame tick: raises `Update` with the delta in seconds, then
    /// resumes whatever scheduled coroutine flows are due.
    pub fn update(&mut self, delta_seconds: f64) -> Result<(), RuntimeError> {
        self.events
            .raise(&EventKey::Update, &Value::Float(delta_seconds));
        self.scheduler.update(delta_seconds)
    }

    /// Tear down an instance: unregisters its event handlers and raises
    /// `Destroy` for anything still listening elsewhere.
    pub fn destroy_instance(&mut self, instance: &GraphInstance) {
        self.events.raise(&EventKey::Destroy, &Value::Null);
        self.events.unregister_owner(instance.id());
        instance.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::ExecCtx;
    use crate::graph::Graph;
    use crate::node::{NodeBehavior, NodeSpec, StepOutcome};
    use crate::runner::CoroutineGraphRunner;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("flowscript_graph=debug")
            .try_init();
    }

    struct Entry;

    impl NodeBehavior for Entry {
        fn type_name(&self) -> &'static str {
            "entry"
        }

        fn register(&self, spec: &mut NodeSpec) {
            spec.flow_output("exit");
        }
    }

    struct OneFramePause;

    impl NodeBehavior for OneFramePause {
        fn type_name(&self) -> &'static str {
            "one_frame_pause"
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
        ) -> Result<StepOutcome, crate::error::RuntimeError> {
            match step {
                0 => Ok(StepOutcome::Yield {
                    instruction: crate::coroutine::YieldInstruction::NextPoll,
                    resume_step: 1,
                }),
                _ => Ok(StepOutcome::finish_into("exit")),
            }
        }
    }

    #[test]
    fn test_session_update_raises_event_and_pumps_flows() {
        init_tracing();
        let mut runtime = Runtime::new();

        let updates = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&updates);
        let instance = Arc::new(GraphInstance::new());
        runtime
            .events()
            .register(EventKey::Update, instance.id(), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        let mut graph = Graph::new("session");
        let entry = graph.add_node(Arc::new(Entry));
        let pause = graph.add_node(Arc::new(OneFramePause));
        graph.connect_flow(entry, "exit", pause, "in").unwrap();
        let graph = Arc::new(graph);
        let flow = CoroutineGraphRunner::new_coroutine(&graph, &instance, entry, "exit").unwrap();
        runtime.spawn(flow);

        runtime.update(0.016).unwrap();
        assert_eq!(runtime.running_flows(), 1);
        runtime.update(0.016).unwrap();
        assert_eq!(runtime.running_flows(), 0);
        assert_eq!(updates.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_destroy_instance_unbinds_events() {
        init_tracing();
        let mut runtime = Runtime::new();
        let instance = Arc::new(GraphInstance::new());

        let updates = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&updates);
        runtime
            .events()
            .register(EventKey::Update, instance.id(), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        runtime.destroy_instance(&instance);
        runtime.update(0.016).unwrap();
        assert_eq!(updates.load(Ordering::SeqCst), 0);
    }
}
