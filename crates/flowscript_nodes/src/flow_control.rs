// SPDX-License-Identifier: MIT OR Apache-2.0
//! Flow control nodes: branch, fan-out, once, toggle, switch.

use flowscript_graph::{
    ExecCtx, Execution, JumpStatement, NodeBehavior, NodeSpec, RuntimeError, StepOutcome, Value,
    ValueInput, ValueOutput, ValueType,
};

/// If/else branching on a boolean condition.
pub struct Branch;

impl NodeBehavior for Branch {
    fn type_name(&self) -> &'static str {
        "branch"
    }

    fn register(&self, spec: &mut NodeSpec) {
        spec.flow_input("in");
        spec.value_input(ValueInput::new("condition", ValueType::Bool).required());
        spec.flow_output("true");
        spec.flow_output("false");
    }

    fn execute(&self, ctx: &mut ExecCtx<'_>, _input: &str) -> Result<Execution, RuntimeError> {
        let condition = ctx.input_bool("condition")?;
        Ok(Execution::next(if condition { "true" } else { "false" }))
    }
}

/// Ordered fan-out: triggers each of its outputs in declaration order.
///
/// Flow outputs are single-target by construction; this node is how a
/// branch point with several successors is expressed.
pub struct FlowControl {
    count: usize,
}

impl FlowControl {
    /// Create a fan-out with `count` outputs
    pub fn new(count: usize) -> Self {
        Self { count }
    }
}

impl NodeBehavior for FlowControl {
    fn type_name(&self) -> &'static str {
        "flow_control"
    }

    fn register(&self, spec: &mut NodeSpec) {
        spec.flow_input("in");
        for index in 0..self.count {
            spec.flow_output(index.to_string());
        }
    }

    fn execute(&self, ctx: &mut ExecCtx<'_>, _input: &str) -> Result<Execution, RuntimeError> {
        for index in 0..self.count {
            ctx.next(&index.to_string())?;
            if ctx.jump().is_some() {
                break;
            }
        }
        Ok(Execution::End)
    }

    fn execute_step(
        &self,
        ctx: &mut ExecCtx<'_>,
        _input: &str,
        step: u32,
    ) -> Result<StepOutcome, RuntimeError> {
        if ctx.jump().is_some() {
            return Ok(StepOutcome::end());
        }
        let index = step as usize;
        if index < self.count {
            Ok(StepOutcome::Call {
                output: index.to_string(),
                resume_step: step + 1,
            })
        } else {
            Ok(StepOutcome::end())
        }
    }
}

/// Routes the first trigger to `once` and every later one to `after`,
/// until `reset` rearms it.
pub struct FlowOnce;

impl NodeBehavior for FlowOnce {
    fn type_name(&self) -> &'static str {
        "flow_once"
    }

    fn register(&self, spec: &mut NodeSpec) {
        spec.flow_input("in");
        spec.flow_input("reset");
        spec.flow_output("once");
        spec.flow_output("after");
    }

    fn execute(&self, ctx: &mut ExecCtx<'_>, input: &str) -> Result<Execution, RuntimeError> {
        match input {
            "reset" => {
                ctx.set_data("fired", false);
                Ok(Execution::End)
            }
            _ => {
                let fired = ctx.get_data::<bool>("fired").unwrap_or(false);
                if fired {
                    Ok(Execution::next("after"))
                } else {
                    ctx.set_data("fired", true);
                    Ok(Execution::next("once"))
                }
            }
        }
    }
}

/// On/off latch with per-instance state.
pub struct Toggle;

impl Toggle {
    fn state(ctx: &ExecCtx<'_>) -> bool {
        ctx.get_data::<bool>("on").unwrap_or(false)
    }
}

impl NodeBehavior for Toggle {
    fn type_name(&self) -> &'static str {
        "toggle"
    }

    fn register(&self, spec: &mut NodeSpec) {
        spec.flow_input("in");
        spec.flow_input("on");
        spec.flow_input("off");
        spec.flow_output("turned_on");
        spec.flow_output("turned_off");
        spec.value_output(ValueOutput::new("is_on", ValueType::Bool));
    }

    fn execute(&self, ctx: &mut ExecCtx<'_>, input: &str) -> Result<Execution, RuntimeError> {
        let current = Self::state(ctx);
        match input {
            "on" => {
                if current {
                    Ok(Execution::End)
                } else {
                    ctx.set_data("on", true);
                    Ok(Execution::next("turned_on"))
                }
            }
            "off" => {
                if current {
                    ctx.set_data("on", false);
                    Ok(Execution::next("turned_off"))
                } else {
                    Ok(Execution::End)
                }
            }
            _ => {
                ctx.set_data("on", !current);
                Ok(Execution::next(if current { "turned_off" } else { "turned_on" }))
            }
        }
    }

    fn get_value(&self, ctx: &mut ExecCtx<'_>, output: &str) -> Result<Value, RuntimeError> {
        match output {
            "is_on" => Ok(Value::Bool(Self::state(ctx))),
            other => Err(ctx.port_not_found(other)),
        }
    }
}

/// Matches a value against case literals; a `break` inside the taken
/// branch stops at the switch, everything else propagates.
pub struct SwitchCase {
    cases: Vec<Value>,
}

impl SwitchCase {
    /// Create a switch over the given case literals
    pub fn new(cases: Vec<Value>) -> Self {
        Self { cases }
    }

    fn select(&self, value: &Value) -> String {
        match self.cases.iter().position(|c| c == value) {
            Some(index) => format!("case_{index}"),
            None => "default".to_string(),
        }
    }
}

impl NodeBehavior for SwitchCase {
    fn type_name(&self) -> &'static str {
        "switch_case"
    }

    fn register(&self, spec: &mut NodeSpec) {
        spec.flow_input("in");
        spec.value_input(ValueInput::new("value", ValueType::Any).required());
        for index in 0..self.cases.len() {
            spec.flow_output(format!("case_{index}"));
        }
        spec.flow_output("default");
        spec.flow_output("exit");
    }

    fn execute(&self, ctx: &mut ExecCtx<'_>, _input: &str) -> Result<Execution, RuntimeError> {
        let value = ctx.input("value")?;
        let branch = self.select(&value);
        match ctx.trigger(&branch)? {
            Some(JumpStatement::Break) => {}
            Some(other) => ctx.set_jump(other),
            None => {}
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
                let value = ctx.input("value")?;
                Ok(StepOutcome::Call {
                    output: self.select(&value),
                    resume_step: 1,
                })
            }
            _ => {
                if matches!(ctx.jump(), Some(JumpStatement::Break)) {
                    ctx.take_jump();
                }
                Ok(StepOutcome::finish_into("exit"))
            }
        }
    }
}
