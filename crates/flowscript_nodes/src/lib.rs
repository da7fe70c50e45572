// SPDX-License-Identifier: MIT OR Apache-2.0
//! Standard node library for FlowScript.
//!
//! The constructs the runtime's semantics are built from:
//! - Flow control: branch, ordered fan-out, once, toggle, switch
//! - Loops (the consumers of `break`/`continue`)
//! - Jump statements: return, break, continue
//! - Exceptions: throw and try/catch/finally
//! - Suspension points: waits and yield (coroutine flows only)
//! - Variables, parameters, literals and comparisons
//! - Host event entry points and debug output

pub mod debug;
pub mod events;
pub mod exceptions;
pub mod flow_control;
pub mod jumps;
pub mod loops;
pub mod values;
pub mod variables;
pub mod waits;

#[cfg(test)]
pub(crate) mod test_support;

pub use debug::Print;
pub use events::{bind_instance, OnCustomEvent, OnStart, OnUpdate};
pub use exceptions::{Throw, TryCatch};
pub use flow_control::{Branch, FlowControl, FlowOnce, SwitchCase, Toggle};
pub use jumps::{BreakNode, ContinueNode, ReturnNode};
pub use loops::{ForLoop, WhileLoop};
pub use values::{Compare, Literal, Not};
pub use variables::{GetVariable, Parameter, SetVariable};
pub use waits::{WaitSeconds, WaitUntil, WaitWhile, YieldValue};

use flowscript_graph::{NodeCategory, NodeRegistry, NodeTypeInfo, Value};
use std::sync::Arc;

/// Register every standard node type.
pub fn register_standard_nodes(registry: &mut NodeRegistry) {
    let mut add = |id: &str,
                   name: &str,
                   category: NodeCategory,
                   description: &str,
                   factory: fn() -> Arc<dyn flowscript_graph::NodeBehavior>| {
        registry.register(
            NodeTypeInfo {
                id: id.to_string(),
                name: name.to_string(),
                category,
                description: description.to_string(),
            },
            factory,
        );
    };

    add("branch", "Branch", NodeCategory::FlowControl, "If/else branching", || {
        Arc::new(Branch)
    });
    add(
        "flow_control",
        "Flow Control",
        NodeCategory::FlowControl,
        "Ordered fan-out over several outputs",
        || Arc::new(FlowControl::new(2)),
    );
    add(
        "flow_once",
        "Once",
        NodeCategory::FlowControl,
        "First trigger goes one way, later ones another",
        || Arc::new(FlowOnce),
    );
    add("toggle", "Toggle", NodeCategory::FlowControl, "On/off latch", || {
        Arc::new(Toggle)
    });
    add(
        "switch_case",
        "Switch",
        NodeCategory::FlowControl,
        "Route by matching a value against case literals",
        || Arc::new(SwitchCase::new(Vec::new())),
    );
    add("while_loop", "While", NodeCategory::FlowControl, "Loop while a condition holds", || {
        Arc::new(WhileLoop)
    });
    add("for_loop", "For", NodeCategory::FlowControl, "Counted loop with an index output", || {
        Arc::new(ForLoop)
    });
    add("return", "Return", NodeCategory::FlowControl, "Unwind to the function boundary", || {
        Arc::new(ReturnNode)
    });
    add("break", "Break", NodeCategory::FlowControl, "Stop the enclosing loop", || {
        Arc::new(BreakNode)
    });
    add(
        "continue",
        "Continue",
        NodeCategory::FlowControl,
        "Skip to the enclosing loop's next iteration",
        || Arc::new(ContinueNode),
    );
    add("throw", "Throw", NodeCategory::FlowControl, "Raise a graph exception", || {
        Arc::new(Throw)
    });
    add(
        "try_catch",
        "Try/Catch",
        NodeCategory::FlowControl,
        "Catch graph exceptions; finally always runs",
        || Arc::new(TryCatch),
    );
    add(
        "wait_seconds",
        "Wait Seconds",
        NodeCategory::Coroutine,
        "Suspend for a duration",
        || Arc::new(WaitSeconds),
    );
    add(
        "wait_until",
        "Wait Until",
        NodeCategory::Coroutine,
        "Suspend until a condition becomes true",
        || Arc::new(WaitUntil),
    );
    add(
        "wait_while",
        "Wait While",
        NodeCategory::Coroutine,
        "Suspend while a condition stays true",
        || Arc::new(WaitWhile),
    );
    add(
        "yield_value",
        "Yield",
        NodeCategory::Coroutine,
        "Yield a value to the coroutine's caller",
        || Arc::new(YieldValue),
    );
    add(
        "get_variable",
        "Get Variable",
        NodeCategory::Variable,
        "Read a graph variable",
        || Arc::new(GetVariable),
    );
    add(
        "set_variable",
        "Set Variable",
        NodeCategory::Variable,
        "Write a graph variable",
        || Arc::new(SetVariable),
    );
    add(
        "parameter",
        "Parameter",
        NodeCategory::Variable,
        "Read a parameter of the current function call",
        || Arc::new(Parameter),
    );
    add("literal", "Literal", NodeCategory::Value, "A constant value", || {
        Arc::new(Literal::new(Value::Null))
    });
    add("compare", "Compare", NodeCategory::Value, "Compare two values", || {
        Arc::new(Compare)
    });
    add("not", "Not", NodeCategory::Value, "Boolean negation", || Arc::new(Not));
    add("on_start", "On Start", NodeCategory::Event, "Runs when the instance starts", || {
        Arc::new(OnStart)
    });
    add("on_update", "On Update", NodeCategory::Event, "Runs every host frame", || {
        Arc::new(OnUpdate)
    });
    add(
        "on_custom_event",
        "On Custom Event",
        NodeCategory::Event,
        "Runs when a named event is raised",
        || Arc::new(OnCustomEvent),
    );
    add("print", "Print", NodeCategory::Utility, "Log a message", || Arc::new(Print));
}
