// SPDX-License-Identifier: MIT OR Apache-2.0
//! Debug output.

use flowscript_graph::{
    ExecCtx, Execution, NodeBehavior, NodeSpec, RuntimeError, ValueInput, ValueType,
};

/// Logs its message through the tracing layer and continues.
pub struct Print;

impl NodeBehavior for Print {
    fn type_name(&self) -> &'static str {
        "print"
    }

    fn register(&self, spec: &mut NodeSpec) {
        spec.flow_input("in");
        spec.value_input(ValueInput::new("message", ValueType::Any));
        spec.flow_output("exit");
    }

    fn execute(&self, ctx: &mut ExecCtx<'_>, _input: &str) -> Result<Execution, RuntimeError> {
        let message = ctx.input("message")?;
        tracing::info!(target: "flowscript", node = ctx.node().0, "{message}");
        Ok(Execution::next("exit"))
    }
}
