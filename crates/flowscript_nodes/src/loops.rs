// SPDX-License-Identifier: MIT OR Apache-2.0
//! Loop nodes. Loops are the constructs that consume `break` and
//! `continue` jump statements; `return` passes through them untouched.

use flowscript_graph::{
    ExecCtx, Execution, JumpStatement, NodeBehavior, NodeSpec, RuntimeError, StepOutcome, Value,
    ValueInput, ValueOutput, ValueType,
};

/// What a loop should do after its body ran.
enum LoopSignal {
    KeepGoing,
    Stop,
    Unwind,
}

fn body_signal(jump: Option<JumpStatement>, ctx: &mut ExecCtx<'_>) -> LoopSignal {
    match jump {
        None | Some(JumpStatement::Continue) => LoopSignal::KeepGoing,
        Some(JumpStatement::Break) => LoopSignal::Stop,
        Some(ret @ JumpStatement::Return(_)) => {
            ctx.set_jump(ret);
            LoopSignal::Unwind
        }
    }
}

/// Runs its body while the condition holds.
pub struct WhileLoop;

impl NodeBehavior for WhileLoop {
    fn type_name(&self) -> &'static str {
        "while_loop"
    }

    fn register(&self, spec: &mut NodeSpec) {
        spec.flow_input("in");
        spec.value_input(ValueInput::new("condition", ValueType::Bool).required());
        spec.flow_output("body");
        spec.flow_output("exit");
    }

    fn execute(&self, ctx: &mut ExecCtx<'_>, _input: &str) -> Result<Execution, RuntimeError> {
        while ctx.input_bool("condition")? {
            let jump = ctx.trigger("body")?;
            match body_signal(jump, ctx) {
                LoopSignal::KeepGoing => {}
                LoopSignal::Stop => break,
                LoopSignal::Unwind => return Ok(Execution::End),
            }
        }
        Ok(Execution::next("exit"))
    }

    fn execute_step(
        &self,
        ctx: &mut ExecCtx<'_>,
        _input: &str,
        step: u32,
    ) -> Result<StepOutcome, RuntimeError> {
        if step == 1 {
            match ctx.jump().cloned() {
                None => {}
                Some(JumpStatement::Continue) => {
                    ctx.take_jump();
                }
                Some(JumpStatement::Break) => {
                    ctx.take_jump();
                    return Ok(StepOutcome::finish_into("exit"));
                }
                Some(JumpStatement::Return(_)) => return Ok(StepOutcome::end()),
            }
        }
        if ctx.input_bool("condition")? {
            Ok(StepOutcome::Call {
                output: "body".to_string(),
                resume_step: 1,
            })
        } else {
            Ok(StepOutcome::finish_into("exit"))
        }
    }
}

/// Counts from `first` to `last` (exclusive) by `step`, exposing the
/// current index as a value output.
pub struct ForLoop;

impl ForLoop {
    fn bounds(ctx: &mut ExecCtx<'_>) -> Result<(i64, i64, i64), RuntimeError> {
        let first = ctx.input_int("first")?;
        let last = ctx.input_int("last")?;
        let step = ctx.input_int("step")?;
        if step == 0 {
            return Err(RuntimeError::Custom(
                "for_loop step must not be zero".to_string(),
            ));
        }
        Ok((first, last, step))
    }

    fn in_range(index: i64, last: i64, step: i64) -> bool {
        if step > 0 {
            index < last
        } else {
            index > last
        }
    }
}

impl NodeBehavior for ForLoop {
    fn type_name(&self) -> &'static str {
        "for_loop"
    }

    fn register(&self, spec: &mut NodeSpec) {
        spec.flow_input("in");
        spec.value_input(ValueInput::new("first", ValueType::Int).with_literal(Value::Int(0)));
        spec.value_input(ValueInput::new("last", ValueType::Int).required());
        spec.value_input(ValueInput::new("step", ValueType::Int).with_literal(Value::Int(1)));
        spec.flow_output("body");
        spec.flow_output("exit");
        spec.value_output(ValueOutput::new("index", ValueType::Int));
    }

    fn execute(&self, ctx: &mut ExecCtx<'_>, _input: &str) -> Result<Execution, RuntimeError> {
        let (first, last, step) = Self::bounds(ctx)?;
        let mut index = first;
        while Self::in_range(index, last, step) {
            ctx.set_data("index", index);
            let jump = ctx.trigger("body")?;
            match body_signal(jump, ctx) {
                LoopSignal::KeepGoing => {}
                LoopSignal::Stop => break,
                LoopSignal::Unwind => return Ok(Execution::End),
            }
            index += step;
        }
        Ok(Execution::next("exit"))
    }

    fn execute_step(
        &self,
        ctx: &mut ExecCtx<'_>,
        _input: &str,
        step_index: u32,
    ) -> Result<StepOutcome, RuntimeError> {
        let (first, last, step) = Self::bounds(ctx)?;
        let index = match step_index {
            0 => first,
            _ => {
                let current = ctx.get_data::<i64>("index").unwrap_or(first);
                match ctx.jump().cloned() {
                    None => current + step,
                    Some(JumpStatement::Continue) => {
                        ctx.take_jump();
                        current + step
                    }
                    Some(JumpStatement::Break) => {
                        ctx.take_jump();
                        return Ok(StepOutcome::finish_into("exit"));
                    }
                    Some(JumpStatement::Return(_)) => return Ok(StepOutcome::end()),
                }
            }
        };
        if !Self::in_range(index, last, step) {
            return Ok(StepOutcome::finish_into("exit"));
        }
        ctx.set_data("index", index);
        Ok(StepOutcome::Call {
            output: "body".to_string(),
            resume_step: 1,
        })
    }

    fn get_value(&self, ctx: &mut ExecCtx<'_>, output: &str) -> Result<Value, RuntimeError> {
        match output {
            "index" => Ok(Value::Int(ctx.get_data::<i64>("index").unwrap_or(0))),
            other => Err(ctx.port_not_found(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow_control::Branch;
    use crate::jumps::{BreakNode, ContinueNode};
    use crate::test_support::{probe, Entry, Log};
    use crate::values::Compare;
    use flowscript_graph::{Graph, GraphInstance, RegularGraphRunner};
    use std::sync::Arc;

    #[test]
    fn test_for_loop_runs_body_per_index() {
        let log: Log = Log::default();
        let mut graph = Graph::new("for");
        let entry = graph.add_node(Arc::new(Entry));
        let looper = graph.add_node(Arc::new(ForLoop));
        let body = graph.add_node(probe(&log, "body"));
        let done = graph.add_node(probe(&log, "done"));
        graph.connect_flow(entry, "exit", looper, "in").unwrap();
        graph.connect_flow(looper, "body", body, "in").unwrap();
        graph.connect_flow(looper, "exit", done, "in").unwrap();
        graph.set_literal(looper, "last", Value::Int(3)).unwrap();

        let graph = Arc::new(graph);
        let instance = Arc::new(GraphInstance::new());
        RegularGraphRunner::run(&graph, &instance, entry, "exit").unwrap();
        assert_eq!(*log.lock(), vec!["body", "body", "body", "done"]);
    }

    #[test]
    fn test_break_stops_loop_and_is_consumed() {
        let log: Log = Log::default();
        let mut graph = Graph::new("for-break");
        let entry = graph.add_node(Arc::new(Entry));
        let looper = graph.add_node(Arc::new(ForLoop));
        let body = graph.add_node(probe(&log, "body"));
        // Break once index == 2.
        let branch = graph.add_node(Arc::new(Branch));
        let compare = graph.add_node(Arc::new(Compare));
        let brk = graph.add_node(Arc::new(BreakNode));
        let done = graph.add_node(probe(&log, "done"));
        graph.connect_flow(entry, "exit", looper, "in").unwrap();
        graph.connect_flow(looper, "body", body, "in").unwrap();
        graph.connect_flow(body, "exit", branch, "in").unwrap();
        graph.connect_flow(branch, "true", brk, "in").unwrap();
        graph.connect_flow(looper, "exit", done, "in").unwrap();
        graph.connect_value(branch, "condition", compare, "result").unwrap();
        graph.connect_value(compare, "a", looper, "index").unwrap();
        graph.set_literal(compare, "b", Value::Int(2)).unwrap();
        graph.set_literal(looper, "last", Value::Int(100)).unwrap();

        let graph = Arc::new(graph);
        let instance = Arc::new(GraphInstance::new());
        let jump = RegularGraphRunner::run(&graph, &instance, entry, "exit").unwrap();

        // Indices 0, 1, 2 ran; the break was consumed by the loop.
        assert_eq!(*log.lock(), vec!["body", "body", "body", "done"]);
        assert_eq!(jump, None);
    }

    #[test]
    fn test_continue_skips_rest_of_body() {
        let log: Log = Log::default();
        let mut graph = Graph::new("for-continue");
        let entry = graph.add_node(Arc::new(Entry));
        let looper = graph.add_node(Arc::new(ForLoop));
        // continue when index == 1, otherwise log.
        let branch = graph.add_node(Arc::new(Branch));
        let compare = graph.add_node(Arc::new(Compare));
        let cont = graph.add_node(Arc::new(ContinueNode));
        let body = graph.add_node(probe(&log, "body"));
        graph.connect_flow(entry, "exit", looper, "in").unwrap();
        graph.connect_flow(looper, "body", branch, "in").unwrap();
        graph.connect_flow(branch, "true", cont, "in").unwrap();
        graph.connect_flow(branch, "false", body, "in").unwrap();
        graph.connect_value(branch, "condition", compare, "result").unwrap();
        graph.connect_value(compare, "a", looper, "index").unwrap();
        graph.set_literal(compare, "b", Value::Int(1)).unwrap();
        graph.set_literal(looper, "last", Value::Int(3)).unwrap();

        let graph = Arc::new(graph);
        let instance = Arc::new(GraphInstance::new());
        RegularGraphRunner::run(&graph, &instance, entry, "exit").unwrap();
        // Index 1 was skipped.
        assert_eq!(*log.lock(), vec!["body", "body"]);
    }

    #[test]
    fn test_zero_step_is_an_error() {
        let mut graph = Graph::new("for-zero");
        let entry = graph.add_node(Arc::new(Entry));
        let looper = graph.add_node(Arc::new(ForLoop));
        graph.connect_flow(entry, "exit", looper, "in").unwrap();
        graph.set_literal(looper, "last", Value::Int(3)).unwrap();
        graph.set_literal(looper, "step", Value::Int(0)).unwrap();

        let graph = Arc::new(graph);
        let instance = Arc::new(GraphInstance::new());
        let err = RegularGraphRunner::run(&graph, &instance, entry, "exit").unwrap_err();
        assert!(matches!(err, RuntimeError::Custom(_)));
    }
}
