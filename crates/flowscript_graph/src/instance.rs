// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-instantiation storage.
//!
//! A `GraphInstance` isolates one running copy of a graph from all
//! others: element data, variable values and user-data slots live here,
//! never on the graph definition. Slots are created lazily on first
//! access and die with the instance.

use crate::error::RuntimeError;
use crate::graph::Graph;
use crate::node::NodeId;
use crate::value::Value;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use uuid::Uuid;

/// Unique identifier for a graph instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(pub Uuid);

impl InstanceId {
    /// Create a new random instance ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

type DataKey = (NodeId, &'static str);

/// Storage for one running instantiation of a graph.
///
/// Execution is single-threaded and cooperative; the locks exist so
/// `Arc<GraphInstance>` handles can be shared between flows and the
/// host, not for contention.
pub struct GraphInstance {
    id: InstanceId,
    element_data: Mutex<HashMap<DataKey, Box<dyn Any + Send>>>,
    variables: Mutex<HashMap<String, Value>>,
}

impl GraphInstance {
    /// Create a fresh instance with empty storage
    pub fn new() -> Self {
        Self {
            id: InstanceId::new(),
            element_data: Mutex::new(HashMap::new()),
            variables: Mutex::new(HashMap::new()),
        }
    }

    /// This instance's id
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Access an element-data slot, creating it on first use.
    ///
    /// The slot is exclusive to this instance; keys are scoped by the
    /// owning node, so two nodes never collide.
    pub fn with_data<T, R>(
        &self,
        node: NodeId,
        key: &'static str,
        init: impl FnOnce() -> T,
        f: impl FnOnce(&mut T) -> R,
    ) -> R
    where
        T: Any + Send,
    {
        let mut map = self.element_data.lock();
        let slot = map
            .entry((node, key))
            .or_insert_with(|| Box::new(init()) as Box<dyn Any + Send>);
        let value = slot
            .downcast_mut::<T>()
            .expect("element data slot reused with a different type");
        f(value)
    }

    /// Read a copy of an element-data slot, if present
    pub fn get_data<T>(&self, node: NodeId, key: &'static str) -> Option<T>
    where
        T: Any + Send + Clone,
    {
        let map = self.element_data.lock();
        map.get(&(node, key)).and_then(|b| b.downcast_ref::<T>()).cloned()
    }

    /// Overwrite an element-data slot
    pub fn set_data<T>(&self, node: NodeId, key: &'static str, value: T)
    where
        T: Any + Send,
    {
        self.element_data.lock().insert((node, key), Box::new(value));
    }

    /// Remove and return an element-data slot
    pub fn take_data<T>(&self, node: NodeId, key: &'static str) -> Option<T>
    where
        T: Any + Send,
    {
        self.element_data
            .lock()
            .remove(&(node, key))
            .and_then(|b| b.downcast::<T>().ok())
            .map(|b| *b)
    }

    /// Read a variable, seeding it from the graph default on first access
    pub fn variable(&self, graph: &Graph, name: &str) -> Result<Value, RuntimeError> {
        let mut vars = self.variables.lock();
        if let Some(value) = vars.get(name) {
            return Ok(value.clone());
        }
        let decl = graph
            .variable(name)
            .ok_or_else(|| RuntimeError::UnknownVariable {
                name: name.to_string(),
                graph: graph.name.clone(),
            })?;
        vars.insert(name.to_string(), decl.default.clone());
        Ok(decl.default.clone())
    }

    /// Write a variable, checking the value against the declared type
    pub fn set_variable(
        &self,
        graph: &Graph,
        name: &str,
        value: Value,
    ) -> Result<(), RuntimeError> {
        let decl = graph
            .variable(name)
            .ok_or_else(|| RuntimeError::UnknownVariable {
                name: name.to_string(),
                graph: graph.name.clone(),
            })?;
        if !value.conforms_to(&decl.ty) {
            return Err(RuntimeError::VariableTypeMismatch {
                name: name.to_string(),
                expected: decl.ty.clone(),
                found: value.type_of(),
                graph: graph.name.clone(),
            });
        }
        self.variables.lock().insert(name.to_string(), value);
        Ok(())
    }

    /// Drop all element data and variable values (instance restart)
    pub fn reset(&self) {
        self.element_data.lock().clear();
        self.variables.lock().clear();
    }
}

impl Default for GraphInstance {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GraphInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphInstance")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lazy_slot_creation() {
        let instance = GraphInstance::new();
        let node = NodeId(0);
        assert_eq!(instance.get_data::<i32>(node, "count"), None);

        let value = instance.with_data(node, "count", || 0i32, |c| {
            *c += 1;
            *c
        });
        assert_eq!(value, 1);
        assert_eq!(instance.get_data::<i32>(node, "count"), Some(1));
    }

    #[test]
    fn test_instances_do_not_share_slots() {
        let a = GraphInstance::new();
        let b = GraphInstance::new();
        let node = NodeId(3);

        a.set_data(node, "flag", true);
        assert_eq!(a.get_data::<bool>(node, "flag"), Some(true));
        assert_eq!(b.get_data::<bool>(node, "flag"), None);
    }

    #[test]
    fn test_reset_drops_slots() {
        let instance = GraphInstance::new();
        instance.set_data(NodeId(1), "x", 42i64);
        instance.reset();
        assert_eq!(instance.get_data::<i64>(NodeId(1), "x"), None);
    }
}
