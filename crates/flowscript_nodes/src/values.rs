// SPDX-License-Identifier: MIT OR Apache-2.0
//! Value producer and operator nodes.

use flowscript_graph::{
    ExecCtx, NodeBehavior, NodeSpec, RuntimeError, TypeHint, Value, ValueInput, ValueOutput,
    ValueType,
};

/// A constant value.
pub struct Literal {
    value: Value,
}

impl Literal {
    /// Create a constant node
    pub fn new(value: Value) -> Self {
        Self { value }
    }
}

impl NodeBehavior for Literal {
    fn type_name(&self) -> &'static str {
        "literal"
    }

    fn register(&self, spec: &mut NodeSpec) {
        spec.value_output(ValueOutput::new(
            "out",
            TypeHint::Fixed(self.value.type_of()),
        ));
    }

    fn get_value(&self, ctx: &mut ExecCtx<'_>, output: &str) -> Result<Value, RuntimeError> {
        match output {
            "out" => Ok(self.value.clone()),
            other => Err(ctx.port_not_found(other)),
        }
    }
}

/// Compares two values; the operator comes through the `op` input
/// (`eq`, `ne`, `lt`, `le`, `gt`, `ge`).
pub struct Compare;

impl Compare {
    fn ordering(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
        match (a, b) {
            (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
            _ => {
                let x = a.as_float()?;
                let y = b.as_float()?;
                x.partial_cmp(&y)
            }
        }
    }
}

impl NodeBehavior for Compare {
    fn type_name(&self) -> &'static str {
        "compare"
    }

    fn register(&self, spec: &mut NodeSpec) {
        spec.value_input(ValueInput::new("a", ValueType::Any).required());
        spec.value_input(ValueInput::new("b", ValueType::Any).required());
        spec.value_input(
            ValueInput::new("op", ValueType::String).with_literal(Value::String("eq".to_string())),
        );
        spec.value_output(ValueOutput::new("result", ValueType::Bool));
    }

    fn get_value(&self, ctx: &mut ExecCtx<'_>, output: &str) -> Result<Value, RuntimeError> {
        if output != "result" {
            return Err(ctx.port_not_found(output));
        }
        let a = ctx.input("a")?;
        let b = ctx.input("b")?;
        let op = ctx.input_string("op")?;
        let result = match op.as_str() {
            "eq" => a == b,
            "ne" => a != b,
            ordered => {
                let ordering = Self::ordering(&a, &b).ok_or_else(|| {
                    RuntimeError::Custom(format!(
                        "compare `{ordered}` needs two ordered values, got {:?} and {:?}",
                        a.type_of(),
                        b.type_of()
                    ))
                })?;
                match ordered {
                    "lt" => ordering.is_lt(),
                    "le" => ordering.is_le(),
                    "gt" => ordering.is_gt(),
                    "ge" => ordering.is_ge(),
                    unknown => {
                        return Err(RuntimeError::Custom(format!(
                            "unknown compare operator `{unknown}`"
                        )))
                    }
                }
            }
        };
        Ok(Value::Bool(result))
    }
}

/// Boolean negation.
pub struct Not;

impl NodeBehavior for Not {
    fn type_name(&self) -> &'static str {
        "not"
    }

    fn register(&self, spec: &mut NodeSpec) {
        spec.value_input(ValueInput::new("value", ValueType::Bool).required());
        spec.value_output(ValueOutput::new("result", ValueType::Bool));
    }

    fn get_value(&self, ctx: &mut ExecCtx<'_>, output: &str) -> Result<Value, RuntimeError> {
        match output {
            "result" => Ok(Value::Bool(!ctx.input_bool("value")?)),
            other => Err(ctx.port_not_found(other)),
        }
    }
}
