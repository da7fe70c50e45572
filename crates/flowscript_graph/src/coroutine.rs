// SPDX-License-Identifier: MIT OR Apache-2.0
//! Suspendable flow execution.
//!
//! A coroutine flow is an explicit frame machine: a stack of
//! (node, input, resume step) frames driven through
//! `NodeBehavior::execute_step`. Suspension points surface as
//! [`YieldInstruction`]s handed to the host; the runtime holds no timer
//! and trusts the host to call [`CoroutineFlow::resume`] at its own
//! cadence. Suspension is only ever visible to callers that opted into
//! the coroutine runner.

use crate::error::RuntimeError;
use crate::flow::{ExecCtx, Flow, JumpStatement};
use crate::node::{NodeId, StepOutcome};
use crate::value::Value;
use std::marker::PhantomData;
use std::sync::Arc;

/// What a suspended flow asks of the host scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum YieldInstruction {
    /// Resume after the given number of seconds
    WaitSeconds(f64),
    /// Resume on the host's next poll; the flow re-checks its own
    /// predicate (wait-until / wait-while)
    NextPoll,
    /// A value produced by a yield-return node
    Value(Value),
}

/// Result of resuming a coroutine flow.
#[derive(Debug, Clone, PartialEq)]
pub enum CoroutineState {
    /// The flow suspended; the host decides when to resume
    Yielded(YieldInstruction),
    /// The flow ran out of nodes, optionally producing a return value
    Finished(Option<Value>),
}

#[derive(Debug, Clone)]
struct Frame {
    node: NodeId,
    input: String,
    step: u32,
}

/// A flow whose execution is wrapped as a step-wise resumable iterator.
///
/// Created by the coroutine runner; retained across suspension points;
/// stopped explicitly (or dropped) to cancel.
pub struct CoroutineFlow {
    flow: Flow,
    frames: Vec<Frame>,
    finished: bool,
    result: Option<Value>,
}

impl CoroutineFlow {
    pub(crate) fn new(mut flow: Flow, entry: NodeId, output: &str) -> Result<Self, RuntimeError> {
        let frames = match resolve_link(&mut flow, entry, output)? {
            Some((node, input)) => vec![Frame {
                node,
                input,
                step: 0,
            }],
            None => Vec::new(),
        };
        Ok(Self {
            flow,
            frames,
            finished: false,
            result: None,
        })
    }

    /// Whether the flow has run to completion (or was stopped)
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The return value surfaced when the flow finished
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// Cancel the flow: drops all pending frames without running them.
    ///
    /// Cancellation is explicit; nothing is resumed or unwound.
    pub fn stop(&mut self) {
        if !self.frames.is_empty() {
            tracing::debug!(
                graph = %self.flow.graph().name,
                frames = self.frames.len(),
                "coroutine flow stopped"
            );
        }
        self.frames.clear();
        self.finished = true;
    }

    /// Drive the flow until its next suspension point or completion.
    pub fn resume(&mut self) -> Result<CoroutineState, RuntimeError> {
        if self.finished {
            return Ok(CoroutineState::Finished(self.result.clone()));
        }
        loop {
            let Some(frame) = self.frames.last().cloned() else {
                return self.finish();
            };
            let graph = Arc::clone(self.flow.graph());
            let node = graph.try_node(frame.node)?;
            let behavior = Arc::clone(node.behavior());
            let outcome = match behavior.execute_step(
                &mut ExecCtx::new(&mut self.flow, frame.node),
                &frame.input,
                frame.step,
            ) {
                Ok(outcome) => outcome,
                Err(e) => {
                    // Unwind towards the nearest error-intercepting
                    // frame (a try/catch construct); without one the
                    // flow dies and the error propagates to the host.
                    self.frames.pop();
                    self.unwind_error(e)?;
                    continue;
                }
            };
            match outcome {
                StepOutcome::Call {
                    output,
                    resume_step,
                } => {
                    self.frames.last_mut().expect("frame exists").step = resume_step;
                    self.push_link(frame.node, &output)?;
                }
                StepOutcome::Yield {
                    instruction,
                    resume_step,
                } => {
                    self.frames.last_mut().expect("frame exists").step = resume_step;
                    return Ok(CoroutineState::Yielded(instruction));
                }
                StepOutcome::Finished { output } => {
                    self.frames.pop();
                    if let Some(out) = output {
                        self.push_link(frame.node, &out)?;
                    }
                }
            }
        }
    }

    fn unwind_error(&mut self, error: RuntimeError) -> Result<(), RuntimeError> {
        loop {
            let Some(frame) = self.frames.last_mut() else {
                self.finished = true;
                return Err(error);
            };
            let graph = Arc::clone(self.flow.graph());
            let step = graph
                .node(frame.node)
                .and_then(|n| n.behavior().error_step());
            match step {
                Some(error_step) => {
                    frame.step = error_step;
                    self.flow.set_caught(error);
                    return Ok(());
                }
                None => {
                    self.frames.pop();
                }
            }
        }
    }

    fn push_link(&mut self, node: NodeId, output: &str) -> Result<(), RuntimeError> {
        // A pending jump statement short-circuits new branches exactly
        // like Flow::next does in synchronous runs.
        if self.flow.jump().is_some() {
            return Ok(());
        }
        if let Some((target, input)) = resolve_link(&mut self.flow, node, output)? {
            self.frames.push(Frame {
                node: target,
                input,
                step: 0,
            });
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<CoroutineState, RuntimeError> {
        self.finished = true;
        match self.flow.take_jump() {
            None => Ok(CoroutineState::Finished(None)),
            Some(JumpStatement::Return(value)) => {
                self.result = value.clone();
                Ok(CoroutineState::Finished(value))
            }
            Some(other) => Err(RuntimeError::JumpEscaped {
                jump: other.kind(),
                graph: self.flow.graph().name.clone(),
            }),
        }
    }
}

impl Iterator for CoroutineFlow {
    type Item = Result<YieldInstruction, RuntimeError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.resume() {
            Ok(CoroutineState::Yielded(instruction)) => Some(Ok(instruction)),
            Ok(CoroutineState::Finished(_)) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

fn resolve_link(
    flow: &mut Flow,
    node: NodeId,
    output: &str,
) -> Result<Option<(NodeId, String)>, RuntimeError> {
    let graph = Arc::clone(flow.graph());
    let n = graph.try_node(node)?;
    let port = n
        .flow_output(output)
        .ok_or_else(|| ExecCtx::new(flow, node).port_not_found(output))?;
    Ok(port.target.as_ref().map(|l| (l.node, l.input.clone())))
}

/// State returned by a [`TypedCoroutine`] resume.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedState<T> {
    /// A yield-return value, converted to the declared type
    Yielded(T),
    /// A non-value suspension (wait) passed through to the host
    Waiting(YieldInstruction),
    /// The flow finished, optionally with a typed return value
    Finished(Option<T>),
}

/// Adapts the untyped coroutine iterator to a statically typed yield
/// stream, which is what callers with a typed signature expect.
pub struct TypedCoroutine<T> {
    inner: CoroutineFlow,
    _marker: PhantomData<T>,
}

impl<T> TypedCoroutine<T>
where
    T: TryFrom<Value, Error = Value>,
{
    /// Wrap an untyped coroutine flow
    pub fn new(inner: CoroutineFlow) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    /// Drive the flow until its next suspension point or completion,
    /// converting yielded and returned values to `T`.
    pub fn resume(&mut self) -> Result<TypedState<T>, RuntimeError> {
        match self.inner.resume()? {
            CoroutineState::Yielded(YieldInstruction::Value(value)) => {
                Ok(TypedState::Yielded(Self::convert(value)?))
            }
            CoroutineState::Yielded(other) => Ok(TypedState::Waiting(other)),
            CoroutineState::Finished(Some(value)) => {
                Ok(TypedState::Finished(Some(Self::convert(value)?)))
            }
            CoroutineState::Finished(None) => Ok(TypedState::Finished(None)),
        }
    }

    /// Cancel the wrapped flow
    pub fn stop(&mut self) {
        self.inner.stop();
    }

    fn convert(value: Value) -> Result<T, RuntimeError> {
        T::try_from(value).map_err(|v| {
            RuntimeError::Custom(format!(
                "coroutine produced {v:?}, which does not convert to the declared yield type"
            ))
        })
    }
}

struct Scheduled {
    flow: CoroutineFlow,
    /// Seconds until the next resume; zero resumes on the next update
    wait: f64,
}

/// Host-side helper that owns running coroutine flows and resumes
/// whatever is due each frame.
///
/// The runtime core never depends on this; hosts with their own
/// schedulers drive [`CoroutineFlow`] directly.
#[derive(Default)]
pub struct CoroutineScheduler {
    running: Vec<Scheduled>,
}

impl CoroutineScheduler {
    /// Create an empty scheduler
    pub fn new() -> Self {
        Self {
            running: Vec::new(),
        }
    }

    /// Take ownership of a flow and resume it on the next update
    pub fn spawn(&mut self, flow: CoroutineFlow) {
        self.running.push(Scheduled { flow, wait: 0.0 });
    }

    /// Number of flows still running
    pub fn len(&self) -> usize {
        self.running.len()
    }

    /// Whether no flows are running
    pub fn is_empty(&self) -> bool {
        self.running.is_empty()
    }

    /// Stop and drop every running flow
    pub fn stop_all(&mut self) {
        for scheduled in &mut self.running {
            scheduled.flow.stop();
        }
        self.running.clear();
    }

    /// Advance time and resume every flow that is due.
    ///
    /// Returns the first error raised by a resumed flow; the failed
    /// flow is dropped, the rest keep running.
    pub fn update(&mut self, delta_seconds: f64) -> Result<(), RuntimeError> {
        let mut error = None;
        let mut index = 0;
        while index < self.running.len() {
            let scheduled = &mut self.running[index];
            scheduled.wait -= delta_seconds;
            if scheduled.wait > 0.0 {
                index += 1;
                continue;
            }
            scheduled.wait = 0.0;
            match scheduled.flow.resume() {
                Ok(CoroutineState::Yielded(YieldInstruction::WaitSeconds(s))) => {
                    scheduled.wait = s;
                    index += 1;
                }
                Ok(CoroutineState::Yielded(_)) => {
                    index += 1;
                }
                Ok(CoroutineState::Finished(_)) => {
                    self.running.swap_remove(index);
                }
                Err(e) => {
                    tracing::error!(error = %e, "coroutine flow failed; dropping it");
                    if error.is_none() {
                        error = Some(e);
                    }
                    self.running.swap_remove(index);
                }
            }
        }
        match error {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RuntimeError;
    use crate::flow::FlowKind;
    use crate::graph::Graph;
    use crate::instance::GraphInstance;
    use crate::node::{Execution, NodeBehavior, NodeSpec};
    use crate::runner::{CoroutineGraphRunner, RegularGraphRunner};
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

        fn execute(
            &self,
            _ctx: &mut crate::flow::ExecCtx<'_>,
            _input: &str,
        ) -> Result<Execution, RuntimeError> {
            self.log.lock().push(self.label.to_string());
            Ok(Execution::next("exit"))
        }
    }

    /// Waits once, then continues.
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

        fn execute(
            &self,
            ctx: &mut crate::flow::ExecCtx<'_>,
            _input: &str,
        ) -> Result<Execution, RuntimeError> {
            Err(ctx.coroutine_required())
        }

        fn execute_step(
            &self,
            _ctx: &mut crate::flow::ExecCtx<'_>,
            _input: &str,
            step: u32,
        ) -> Result<crate::node::StepOutcome, RuntimeError> {
            match step {
                0 => Ok(crate::node::StepOutcome::Yield {
                    instruction: YieldInstruction::WaitSeconds(self.seconds),
                    resume_step: 1,
                }),
                _ => Ok(crate::node::StepOutcome::finish_into("exit")),
            }
        }
    }

    fn probe(log: &Log, label: &'static str) -> Arc<Probe> {
        Arc::new(Probe {
            label,
            log: Arc::clone(log),
        })
    }

    fn single_wait_graph(log: &Log) -> (Arc<Graph>, crate::node::NodeId) {
        let mut graph = Graph::new("waiting");
        let entry = graph.add_node(Arc::new(Entry));
        let before = graph.add_node(probe(log, "before"));
        let wait = graph.add_node(Arc::new(TestWait { seconds: 1.0 }));
        let after = graph.add_node(probe(log, "after"));
        graph.connect_flow(entry, "exit", before, "in").unwrap();
        graph.connect_flow(before, "exit", wait, "in").unwrap();
        graph.connect_flow(wait, "exit", after, "in").unwrap();
        (Arc::new(graph), entry)
    }

    #[test]
    fn test_single_wait_yields_exactly_once() {
        let log: Log = Arc::default();
        let (graph, entry) = single_wait_graph(&log);
        let instance = Arc::new(GraphInstance::new());

        let mut flow =
            CoroutineGraphRunner::new_coroutine(&graph, &instance, entry, "exit").unwrap();

        let state = flow.resume().unwrap();
        assert_eq!(
            state,
            CoroutineState::Yielded(YieldInstruction::WaitSeconds(1.0))
        );
        assert_eq!(*log.lock(), vec!["before"]);

        let state = flow.resume().unwrap();
        assert_eq!(state, CoroutineState::Finished(None));
        assert_eq!(*log.lock(), vec!["before", "after"]);
        assert!(flow.is_finished());
    }

    #[test]
    fn test_regular_flow_rejects_wait_node() {
        let log: Log = Arc::default();
        let (graph, entry) = single_wait_graph(&log);
        let instance = Arc::new(GraphInstance::new());

        let err = RegularGraphRunner::run(&graph, &instance, entry, "exit").unwrap_err();
        match err {
            RuntimeError::CoroutineRequired { type_name, .. } => {
                assert_eq!(type_name, "test_wait");
            }
            other => panic!("expected CoroutineRequired, got {other:?}"),
        }
    }

    #[test]
    fn test_stop_cancels_pending_frames() {
        let log: Log = Arc::default();
        let (graph, entry) = single_wait_graph(&log);
        let instance = Arc::new(GraphInstance::new());

        let mut flow =
            CoroutineGraphRunner::new_coroutine(&graph, &instance, entry, "exit").unwrap();
        flow.resume().unwrap();
        flow.stop();
        assert!(flow.is_finished());
        assert_eq!(flow.resume().unwrap(), CoroutineState::Finished(None));
        // The downstream probe never ran.
        assert_eq!(*log.lock(), vec!["before"]);
    }

    #[test]
    fn test_scheduler_resumes_after_duration() {
        let log: Log = Arc::default();
        let (graph, entry) = single_wait_graph(&log);
        let instance = Arc::new(GraphInstance::new());

        let flow = CoroutineGraphRunner::new_coroutine(&graph, &instance, entry, "exit").unwrap();
        let mut scheduler = CoroutineScheduler::new();
        scheduler.spawn(flow);

        scheduler.update(0.0).unwrap();
        assert_eq!(*log.lock(), vec!["before"]);

        // Not due yet.
        scheduler.update(0.5).unwrap();
        assert_eq!(*log.lock(), vec!["before"]);

        scheduler.update(0.6).unwrap();
        assert_eq!(*log.lock(), vec!["before", "after"]);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_analysis_sees_transitive_coroutine() {
        let log: Log = Arc::default();
        let (graph, entry) = single_wait_graph(&log);
        assert!(crate::analysis::requires_coroutine(&graph, entry));

        let mut plain = Graph::new("plain");
        let e = plain.add_node(Arc::new(Entry));
        let p = plain.add_node(probe(&log, "p"));
        plain.connect_flow(e, "exit", p, "in").unwrap();
        assert!(!crate::analysis::requires_coroutine(&plain, e));
    }

    #[test]
    fn test_dangling_entry_finishes_immediately() {
        let mut graph = Graph::new("empty");
        let entry = graph.add_node(Arc::new(Entry));
        let graph = Arc::new(graph);
        let instance = Arc::new(GraphInstance::new());

        let mut flow =
            CoroutineGraphRunner::new_coroutine(&graph, &instance, entry, "exit").unwrap();
        assert_eq!(flow.resume().unwrap(), CoroutineState::Finished(None));
    }

    #[test]
    fn test_typed_wrapper_converts_yielded_values() {
        struct YieldThree;

        impl NodeBehavior for YieldThree {
            fn type_name(&self) -> &'static str {
                "yield_three"
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
                _ctx: &mut crate::flow::ExecCtx<'_>,
                _input: &str,
                step: u32,
            ) -> Result<crate::node::StepOutcome, RuntimeError> {
                match step {
                    0 => Ok(crate::node::StepOutcome::Yield {
                        instruction: YieldInstruction::Value(Value::Int(3)),
                        resume_step: 1,
                    }),
                    _ => Ok(crate::node::StepOutcome::end()),
                }
            }
        }

        let mut graph = Graph::new("typed");
        let entry = graph.add_node(Arc::new(Entry));
        let y = graph.add_node(Arc::new(YieldThree));
        graph.connect_flow(entry, "exit", y, "in").unwrap();
        let graph = Arc::new(graph);
        let instance = Arc::new(GraphInstance::new());

        let inner =
            CoroutineGraphRunner::new_coroutine(&graph, &instance, entry, "exit").unwrap();
        let mut typed: TypedCoroutine<i64> = TypedCoroutine::new(inner);
        assert_eq!(typed.resume().unwrap(), TypedState::Yielded(3));
        assert_eq!(typed.resume().unwrap(), TypedState::Finished(None));
    }

    #[test]
    fn test_flow_kind_is_coroutine() {
        let mut graph = Graph::new("kind");
        let entry = graph.add_node(Arc::new(Entry));
        let graph = Arc::new(graph);
        let instance = Arc::new(GraphInstance::new());
        let flow = CoroutineGraphRunner::new_coroutine(&graph, &instance, entry, "exit").unwrap();
        assert_eq!(flow.flow.kind(), FlowKind::Coroutine);
    }
}
