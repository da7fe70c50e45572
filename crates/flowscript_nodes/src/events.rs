// SPDX-License-Identifier: MIT OR Apache-2.0
//! Event entry nodes and host wiring.
//!
//! Event nodes are roots: the host raises lifecycle events through the
//! [`EventHub`] and [`bind_instance`] turns each raise into a regular
//! flow run from the matching node. Jump statements never escape an
//! event flow.

use flowscript_graph::{
    EventHub, EventKey, ExecCtx, Graph, GraphInstance, NodeBehavior, NodeSpec, RegularGraphRunner,
    RuntimeError, Value, ValueInput, ValueOutput, ValueType,
};
use std::sync::Arc;

/// Fires once when the instance starts.
pub struct OnStart;

impl NodeBehavior for OnStart {
    fn type_name(&self) -> &'static str {
        "on_start"
    }

    fn register(&self, spec: &mut NodeSpec) {
        spec.flow_output("exit");
    }
}

/// Fires every host frame, exposing the frame delta in seconds.
pub struct OnUpdate;

impl NodeBehavior for OnUpdate {
    fn type_name(&self) -> &'static str {
        "on_update"
    }

    fn register(&self, spec: &mut NodeSpec) {
        spec.flow_output("exit");
        spec.value_output(ValueOutput::new("delta", ValueType::Float));
    }

    fn get_value(&self, ctx: &mut ExecCtx<'_>, output: &str) -> Result<Value, RuntimeError> {
        match output {
            "delta" => Ok(ctx.get_data::<Value>("delta").unwrap_or(Value::Float(0.0))),
            other => Err(ctx.port_not_found(other)),
        }
    }
}

/// Fires on a named custom event, exposing the raised payload.
pub struct OnCustomEvent;

impl NodeBehavior for OnCustomEvent {
    fn type_name(&self) -> &'static str {
        "on_custom_event"
    }

    fn register(&self, spec: &mut NodeSpec) {
        spec.value_input(ValueInput::new("name", ValueType::String).required());
        spec.flow_output("exit");
        spec.value_output(ValueOutput::new("payload", ValueType::Any));
    }

    fn get_value(&self, ctx: &mut ExecCtx<'_>, output: &str) -> Result<Value, RuntimeError> {
        match output {
            "payload" => Ok(ctx.get_data::<Value>("payload").unwrap_or(Value::Null)),
            other => Err(ctx.port_not_found(other)),
        }
    }
}

/// Register every event node of a graph with the hub, owned by the
/// given instance.
///
/// Each raise stores the event argument in the node's element data and
/// runs the node's `exit` flow through the regular runner; errors are
/// logged, not rethrown into the host. Unregister the instance from
/// the hub (or destroy it through the runtime session) to unbind.
pub fn bind_instance(
    graph: &Arc<Graph>,
    instance: &Arc<GraphInstance>,
    hub: &EventHub,
) -> Result<(), RuntimeError> {
    for node in graph.nodes() {
        let (key, slot) = match node.type_name() {
            "on_start" => (EventKey::Start, None),
            "on_update" => (EventKey::Update, Some("delta")),
            "on_custom_event" => {
                let mut flow = RegularGraphRunner::new_flow(graph, instance);
                let name = match flow.value(node.id, "name")? {
                    Value::String(name) => name,
                    other => {
                        return Err(RuntimeError::TypeMismatch {
                            node: node.id,
                            port: "name".to_string(),
                            expected: ValueType::String,
                            found: other.type_of(),
                            graph: graph.name.clone(),
                        })
                    }
                };
                (EventKey::Custom(name), Some("payload"))
            }
            _ => continue,
        };

        let node_id = node.id;
        let graph = Arc::clone(graph);
        let instance_handle = Arc::clone(instance);
        hub.register(key, instance.id(), move |arg| {
            if let Some(slot) = slot {
                instance_handle.set_data(node_id, slot, arg.clone());
            }
            // Event flows are jump-isolated: a reified jump is dropped.
            if let Err(e) = RegularGraphRunner::run(&graph, &instance_handle, node_id, "exit") {
                tracing::error!(error = %e, node = node_id.0, "event flow failed");
            }
        });
    }
    Ok(())
}
