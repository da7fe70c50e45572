// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph-authored exception handling.
//!
//! The `throw` node raises a graph exception; `try_catch` reifies it
//! (and type errors raised inside its try branch) into control
//! transfer. Configuration errors on malformed graphs are not caught
//! here and propagate to the host.

use flowscript_graph::{
    ExecCtx, Execution, JumpStatement, NodeBehavior, NodeSpec, RuntimeError, StepOutcome, Value,
    ValueInput, ValueOutput, ValueType,
};

/// Raises a graph exception carrying a payload value.
pub struct Throw;

impl NodeBehavior for Throw {
    fn type_name(&self) -> &'static str {
        "throw"
    }

    fn register(&self, spec: &mut NodeSpec) {
        spec.flow_input("in");
        spec.value_input(ValueInput::new("value", ValueType::Any).required());
    }

    fn execute(&self, ctx: &mut ExecCtx<'_>, _input: &str) -> Result<Execution, RuntimeError> {
        let value = ctx.input("value")?;
        Err(ctx.thrown(value))
    }
}

/// What the catch branch gets to see for an intercepted error.
fn catchable_payload(error: &RuntimeError) -> Option<Value> {
    match error {
        RuntimeError::Thrown { value, .. } => Some(value.clone()),
        RuntimeError::TypeMismatch { .. } => Some(Value::String(error.to_string())),
        _ => None,
    }
}

const STEP_AFTER_TRY: u32 = 1;
const STEP_AFTER_CATCH: u32 = 2;
const STEP_AFTER_FINALLY: u32 = 3;
const STEP_RETHROW: u32 = 4;
const STEP_ON_ERROR: u32 = 10;

/// Try/catch/finally over flow branches.
///
/// The try branch runs first; a graph exception (or type error) raised
/// inside it stores its payload on the `exception` output and routes to
/// the catch branch. The finally branch always runs, before any pending
/// jump statement (including a `return` set inside try) is surfaced to
/// the caller.
pub struct TryCatch;

impl NodeBehavior for TryCatch {
    fn type_name(&self) -> &'static str {
        "try_catch"
    }

    fn register(&self, spec: &mut NodeSpec) {
        spec.flow_input("in");
        spec.flow_output("try");
        spec.flow_output("catch");
        spec.flow_output("finally");
        spec.flow_output("exit");
        spec.value_output(ValueOutput::new("exception", ValueType::Any));
    }

    fn execute(&self, ctx: &mut ExecCtx<'_>, _input: &str) -> Result<Execution, RuntimeError> {
        let pending = match ctx.trigger("try") {
            Ok(jump) => jump,
            Err(error) => match catchable_payload(&error) {
                Some(payload) => {
                    ctx.set_data("exception", payload);
                    ctx.trigger("catch")?
                }
                None => {
                    // Finally still runs, then the error propagates.
                    let _ = ctx.trigger("finally")?;
                    return Err(error);
                }
            },
        };

        let escaped = ctx.trigger("finally")?;
        if let Some(jump) = escaped {
            return Err(RuntimeError::Custom(format!(
                "`{}` escaped a finally branch",
                jump.kind()
            )));
        }
        if let Some(jump) = pending {
            ctx.set_jump(jump);
        }
        Ok(Execution::next("exit"))
    }

    fn execute_step(
        &self,
        ctx: &mut ExecCtx<'_>,
        _input: &str,
        step: u32,
    ) -> Result<StepOutcome, RuntimeError> {
        match step {
            0 => {
                ctx.set_data::<Option<JumpStatement>>("pending", None);
                ctx.set_data("in_try", true);
                Ok(StepOutcome::Call {
                    output: "try".to_string(),
                    resume_step: STEP_AFTER_TRY,
                })
            }
            STEP_AFTER_TRY | STEP_AFTER_CATCH => {
                ctx.set_data("in_try", false);
                let pending = ctx.take_jump();
                ctx.set_data("pending", pending);
                Ok(StepOutcome::Call {
                    output: "finally".to_string(),
                    resume_step: STEP_AFTER_FINALLY,
                })
            }
            STEP_AFTER_FINALLY => {
                if let Some(jump) = ctx.take_jump() {
                    return Err(RuntimeError::Custom(format!(
                        "`{}` escaped a finally branch",
                        jump.kind()
                    )));
                }
                if let Some(jump) = ctx.get_data::<Option<JumpStatement>>("pending").flatten() {
                    ctx.set_jump(jump);
                }
                Ok(StepOutcome::finish_into("exit"))
            }
            STEP_ON_ERROR => {
                let error = ctx
                    .take_caught_error()
                    .unwrap_or_else(|| RuntimeError::Custom("missing caught error".to_string()));
                let in_try = ctx.get_data::<bool>("in_try").unwrap_or(false);
                match catchable_payload(&error) {
                    Some(payload) if in_try => {
                        ctx.set_data("in_try", false);
                        ctx.set_data("exception", payload);
                        Ok(StepOutcome::Call {
                            output: "catch".to_string(),
                            resume_step: STEP_AFTER_CATCH,
                        })
                    }
                    _ => {
                        // Not interceptable here: run finally, then
                        // re-raise.
                        ctx.set_data("rethrow", error);
                        Ok(StepOutcome::Call {
                            output: "finally".to_string(),
                            resume_step: STEP_RETHROW,
                        })
                    }
                }
            }
            STEP_RETHROW => {
                let error = ctx
                    .instance()
                    .take_data::<RuntimeError>(ctx.node(), "rethrow")
                    .unwrap_or_else(|| RuntimeError::Custom("missing rethrow error".to_string()));
                Err(error)
            }
            other => {
                debug_assert!(false, "unexpected try_catch step {other}");
                Ok(StepOutcome::end())
            }
        }
    }

    fn error_step(&self) -> Option<u32> {
        Some(STEP_ON_ERROR)
    }

    fn get_value(&self, ctx: &mut ExecCtx<'_>, output: &str) -> Result<Value, RuntimeError> {
        match output {
            "exception" => Ok(ctx.get_data::<Value>("exception").unwrap_or(Value::Null)),
            other => Err(ctx.port_not_found(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jumps::ReturnNode;
    use crate::test_support::{probe, Entry, Log};
    use flowscript_graph::{Function, Graph, GraphInstance, RegularGraphRunner};
    use std::sync::Arc;

    fn harness() -> (Graph, flowscript_graph::NodeId, flowscript_graph::NodeId, Log) {
        let log: Log = Log::default();
        let mut graph = Graph::new("exceptions");
        let entry = graph.add_node(Arc::new(Entry));
        let tc = graph.add_node(Arc::new(TryCatch));
        graph.connect_flow(entry, "exit", tc, "in").unwrap();
        (graph, entry, tc, log)
    }

    #[test]
    fn test_throw_is_caught_with_payload() {
        let (mut graph, entry, tc, log) = harness();
        let throw = graph.add_node(Arc::new(Throw));
        let caught = graph.add_node(probe(&log, "caught"));
        let exit = graph.add_node(probe(&log, "exit"));
        graph.connect_flow(tc, "try", throw, "in").unwrap();
        graph.connect_flow(tc, "catch", caught, "in").unwrap();
        graph.connect_flow(tc, "exit", exit, "in").unwrap();
        graph
            .set_literal(throw, "value", Value::String("boom".to_string()))
            .unwrap();

        let graph = Arc::new(graph);
        let instance = Arc::new(GraphInstance::new());
        RegularGraphRunner::run(&graph, &instance, entry, "exit").unwrap();

        assert_eq!(*log.lock(), vec!["caught", "exit"]);
        assert_eq!(
            instance.get_data::<Value>(tc, "exception"),
            Some(Value::String("boom".to_string()))
        );
    }

    #[test]
    fn test_finally_runs_before_return_surfaces() {
        let (mut graph, entry, tc, log) = harness();
        let ret = graph.add_node(Arc::new(ReturnNode));
        let fin = graph.add_node(probe(&log, "finally"));
        graph.connect_flow(tc, "try", ret, "in").unwrap();
        graph.connect_flow(tc, "finally", fin, "in").unwrap();
        graph.set_literal(ret, "value", Value::Int(9)).unwrap();
        graph.add_function(Function::new("f").with_entry(entry).with_return_type(ValueType::Int));

        let graph = Arc::new(graph);
        let instance = Arc::new(GraphInstance::new());
        let result = RegularGraphRunner::call(&graph, &instance, "f", &[]).unwrap();

        // The finally branch ran, and the return value still surfaced.
        assert_eq!(*log.lock(), vec!["finally"]);
        assert_eq!(result, Some(Value::Int(9)));
    }

    #[test]
    fn test_uncaught_error_still_runs_finally() {
        let (mut graph, entry, tc, log) = harness();
        // A port-not-found style error is a configuration error: the
        // catch branch must NOT swallow it.
        struct Broken;
        impl NodeBehavior for Broken {
            fn type_name(&self) -> &'static str {
                "broken"
            }
            fn register(&self, spec: &mut NodeSpec) {
                spec.flow_input("in");
            }
            fn execute(
                &self,
                ctx: &mut ExecCtx<'_>,
                _input: &str,
            ) -> Result<Execution, RuntimeError> {
                Err(ctx.port_not_found("ghost"))
            }
        }
        let broken = graph.add_node(Arc::new(Broken));
        let caught = graph.add_node(probe(&log, "caught"));
        let fin = graph.add_node(probe(&log, "finally"));
        graph.connect_flow(tc, "try", broken, "in").unwrap();
        graph.connect_flow(tc, "catch", caught, "in").unwrap();
        graph.connect_flow(tc, "finally", fin, "in").unwrap();

        let graph = Arc::new(graph);
        let instance = Arc::new(GraphInstance::new());
        let err = RegularGraphRunner::run(&graph, &instance, entry, "exit").unwrap_err();

        assert!(matches!(err, RuntimeError::PortNotFound { .. }));
        assert_eq!(*log.lock(), vec!["finally"]);
    }

    #[test]
    fn test_no_throw_takes_exit() {
        let (mut graph, entry, tc, log) = harness();
        let body = graph.add_node(probe(&log, "try"));
        let exit = graph.add_node(probe(&log, "exit"));
        graph.connect_flow(tc, "try", body, "in").unwrap();
        graph.connect_flow(tc, "exit", exit, "in").unwrap();

        let graph = Arc::new(graph);
        let instance = Arc::new(GraphInstance::new());
        RegularGraphRunner::run(&graph, &instance, entry, "exit").unwrap();
        assert_eq!(*log.lock(), vec!["try", "exit"]);
    }
}
