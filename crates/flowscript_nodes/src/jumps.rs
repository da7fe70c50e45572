// SPDX-License-Identifier: MIT OR Apache-2.0
//! Jump statement nodes: return, break, continue.
//!
//! These set the flow's jump statement and end their branch; every hop
//! above them short-circuits until a consuming construct (loop or
//! function boundary) clears the jump.

use flowscript_graph::{
    ExecCtx, Execution, JumpStatement, NodeBehavior, NodeSpec, RuntimeError, Value, ValueInput,
    ValueType,
};

/// Unwinds to the enclosing function invocation, optionally carrying a
/// value.
pub struct ReturnNode;

impl NodeBehavior for ReturnNode {
    fn type_name(&self) -> &'static str {
        "return"
    }

    fn register(&self, spec: &mut NodeSpec) {
        spec.flow_input("in");
        spec.value_input(ValueInput::new("value", ValueType::Any));
    }

    fn execute(&self, ctx: &mut ExecCtx<'_>, _input: &str) -> Result<Execution, RuntimeError> {
        let value = ctx.input("value")?;
        let payload = match value {
            Value::Null => None,
            other => Some(other),
        };
        ctx.set_jump(JumpStatement::Return(payload));
        Ok(Execution::End)
    }
}

/// Unwinds to the enclosing loop and stops it.
pub struct BreakNode;

impl NodeBehavior for BreakNode {
    fn type_name(&self) -> &'static str {
        "break"
    }

    fn register(&self, spec: &mut NodeSpec) {
        spec.flow_input("in");
    }

    fn execute(&self, ctx: &mut ExecCtx<'_>, _input: &str) -> Result<Execution, RuntimeError> {
        ctx.set_jump(JumpStatement::Break);
        Ok(Execution::End)
    }
}

/// Unwinds to the enclosing loop and starts its next iteration.
pub struct ContinueNode;

impl NodeBehavior for ContinueNode {
    fn type_name(&self) -> &'static str {
        "continue"
    }

    fn register(&self, spec: &mut NodeSpec) {
        spec.flow_input("in");
    }

    fn execute(&self, ctx: &mut ExecCtx<'_>, _input: &str) -> Result<Execution, RuntimeError> {
        ctx.set_jump(JumpStatement::Continue);
        Ok(Execution::End)
    }
}
