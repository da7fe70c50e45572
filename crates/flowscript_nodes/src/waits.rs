// SPDX-License-Identifier: MIT OR Apache-2.0
//! Suspension nodes. These are the runtime's coroutine surface: legal
//! only inside coroutine flows, a fatal configuration error anywhere
//! else.

use flowscript_graph::{
    ExecCtx, Execution, NodeBehavior, NodeSpec, RuntimeError, StepOutcome, Value, ValueInput,
    ValueType, YieldInstruction,
};

fn reject_regular(ctx: &mut ExecCtx<'_>) -> Result<Execution, RuntimeError> {
    Err(ctx.coroutine_required())
}

/// Suspends the flow for a duration, reported to the host scheduler.
pub struct WaitSeconds;

impl NodeBehavior for WaitSeconds {
    fn type_name(&self) -> &'static str {
        "wait_seconds"
    }

    fn register(&self, spec: &mut NodeSpec) {
        spec.flow_input("in");
        spec.value_input(ValueInput::new("seconds", ValueType::Float).with_literal(Value::Float(1.0)));
        spec.flow_output("exit");
    }

    fn is_coroutine(&self) -> bool {
        true
    }

    fn execute(&self, ctx: &mut ExecCtx<'_>, _input: &str) -> Result<Execution, RuntimeError> {
        reject_regular(ctx)
    }

    fn execute_step(
        &self,
        ctx: &mut ExecCtx<'_>,
        _input: &str,
        step: u32,
    ) -> Result<StepOutcome, RuntimeError> {
        match step {
            0 => {
                let seconds = ctx.input_float("seconds")?;
                Ok(StepOutcome::Yield {
                    instruction: YieldInstruction::WaitSeconds(seconds),
                    resume_step: 1,
                })
            }
            _ => Ok(StepOutcome::finish_into("exit")),
        }
    }
}

/// Suspends until its condition becomes true, re-checking on every
/// resume.
pub struct WaitUntil;

impl NodeBehavior for WaitUntil {
    fn type_name(&self) -> &'static str {
        "wait_until"
    }

    fn register(&self, spec: &mut NodeSpec) {
        spec.flow_input("in");
        spec.value_input(ValueInput::new("condition", ValueType::Bool).required());
        spec.flow_output("exit");
    }

    fn is_coroutine(&self) -> bool {
        true
    }

    fn execute(&self, ctx: &mut ExecCtx<'_>, _input: &str) -> Result<Execution, RuntimeError> {
        reject_regular(ctx)
    }

    fn execute_step(
        &self,
        ctx: &mut ExecCtx<'_>,
        _input: &str,
        step: u32,
    ) -> Result<StepOutcome, RuntimeError> {
        let _ = step;
        if ctx.input_bool("condition")? {
            Ok(StepOutcome::finish_into("exit"))
        } else {
            Ok(StepOutcome::Yield {
                instruction: YieldInstruction::NextPoll,
                resume_step: 0,
            })
        }
    }
}

/// Suspends while its condition stays true.
pub struct WaitWhile;

impl NodeBehavior for WaitWhile {
    fn type_name(&self) -> &'static str {
        "wait_while"
    }

    fn register(&self, spec: &mut NodeSpec) {
        spec.flow_input("in");
        spec.value_input(ValueInput::new("condition", ValueType::Bool).required());
        spec.flow_output("exit");
    }

    fn is_coroutine(&self) -> bool {
        true
    }

    fn execute(&self, ctx: &mut ExecCtx<'_>, _input: &str) -> Result<Execution, RuntimeError> {
        reject_regular(ctx)
    }

    fn execute_step(
        &self,
        ctx: &mut ExecCtx<'_>,
        _input: &str,
        step: u32,
    ) -> Result<StepOutcome, RuntimeError> {
        let _ = step;
        if ctx.input_bool("condition")? {
            Ok(StepOutcome::Yield {
                instruction: YieldInstruction::NextPoll,
                resume_step: 0,
            })
        } else {
            Ok(StepOutcome::finish_into("exit"))
        }
    }
}

/// Yields a value to the caller of the coroutine, then continues.
pub struct YieldValue;

impl NodeBehavior for YieldValue {
    fn type_name(&self) -> &'static str {
        "yield_value"
    }

    fn register(&self, spec: &mut NodeSpec) {
        spec.flow_input("in");
        spec.value_input(ValueInput::new("value", ValueType::Any).required());
        spec.flow_output("exit");
    }

    fn is_coroutine(&self) -> bool {
        true
    }

    fn execute(&self, ctx: &mut ExecCtx<'_>, _input: &str) -> Result<Execution, RuntimeError> {
        reject_regular(ctx)
    }

    fn execute_step(
        &self,
        ctx: &mut ExecCtx<'_>,
        _input: &str,
        step: u32,
    ) -> Result<StepOutcome, RuntimeError> {
        match step {
            0 => {
                let value = ctx.input("value")?;
                Ok(StepOutcome::Yield {
                    instruction: YieldInstruction::Value(value),
                    resume_step: 1,
                })
            }
            _ => Ok(StepOutcome::finish_into("exit")),
        }
    }
}
