// SPDX-License-Identifier: MIT OR Apache-2.0
//! Variable and parameter access.
//!
//! Variable names are fed through the `name` input (usually as an
//! inline literal), so persisted graphs carry them without any
//! per-node configuration payload.

use flowscript_graph::{
    ExecCtx, Execution, NodeBehavior, NodeSpec, RuntimeError, Value, ValueInput, ValueOutput,
    ValueType,
};

/// Reads a graph variable from the running instance.
pub struct GetVariable;

impl NodeBehavior for GetVariable {
    fn type_name(&self) -> &'static str {
        "get_variable"
    }

    fn register(&self, spec: &mut NodeSpec) {
        spec.value_input(ValueInput::new("name", ValueType::String).required());
        spec.value_output(ValueOutput::new("value", ValueType::Any));
    }

    fn get_value(&self, ctx: &mut ExecCtx<'_>, output: &str) -> Result<Value, RuntimeError> {
        match output {
            "value" => {
                let name = ctx.input_string("name")?;
                ctx.variable(&name)
            }
            other => Err(ctx.port_not_found(other)),
        }
    }
}

/// Writes a graph variable on the running instance.
pub struct SetVariable;

impl NodeBehavior for SetVariable {
    fn type_name(&self) -> &'static str {
        "set_variable"
    }

    fn register(&self, spec: &mut NodeSpec) {
        spec.flow_input("in");
        spec.value_input(ValueInput::new("name", ValueType::String).required());
        spec.value_input(ValueInput::new("value", ValueType::Any).required());
        spec.flow_output("exit");
    }

    fn execute(&self, ctx: &mut ExecCtx<'_>, _input: &str) -> Result<Execution, RuntimeError> {
        let name = ctx.input_string("name")?;
        let value = ctx.input("value")?;
        ctx.set_variable(&name, value)?;
        Ok(Execution::next("exit"))
    }
}

/// Reads a parameter of the current function invocation.
pub struct Parameter;

impl NodeBehavior for Parameter {
    fn type_name(&self) -> &'static str {
        "parameter"
    }

    fn register(&self, spec: &mut NodeSpec) {
        spec.value_input(ValueInput::new("name", ValueType::String).required());
        spec.value_output(ValueOutput::new("value", ValueType::Any));
    }

    fn get_value(&self, ctx: &mut ExecCtx<'_>, output: &str) -> Result<Value, RuntimeError> {
        match output {
            "value" => {
                let name = ctx.input_string("name")?;
                ctx.local(&name).ok_or_else(|| {
                    RuntimeError::Custom(format!(
                        "parameter `{name}` is not bound in this invocation"
                    ))
                })
            }
            other => Err(ctx.port_not_found(other)),
        }
    }
}
