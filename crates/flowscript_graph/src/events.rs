// SPDX-License-Identifier: MIT OR Apache-2.0
//! Host lifecycle event hub.
//!
//! The runtime never polls the host; it registers callbacks here and the
//! host raises events at its own cadence (per-frame update, enable/
//! disable, physics-style callbacks). The hub is session-scoped and
//! constructor-injected; there is no process-wide event table.

use crate::instance::InstanceId;
use crate::value::Value;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

/// Identifies a host lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKey {
    /// First frame after an instance starts
    Start,
    /// Per-frame tick
    Update,
    /// Fixed-timestep tick
    FixedUpdate,
    /// End-of-frame tick
    LateUpdate,
    /// Instance enabled
    Enable,
    /// Instance disabled
    Disable,
    /// Instance destroyed
    Destroy,
    /// Host- or graph-defined event, matched by name
    Custom(String),
}

type Callback = Box<dyn FnMut(&Value) + Send>;

struct Handler {
    owner: InstanceId,
    callback: Callback,
}

/// Registration table from event to callbacks.
///
/// Callbacks registered during a dispatch are invoked from the next
/// `raise`; owners unregistered during a dispatch stop receiving events
/// as soon as the current `raise` completes.
#[derive(Default)]
pub struct EventHub {
    handlers: Mutex<HashMap<EventKey, Vec<Handler>>>,
    dispatching: Mutex<u32>,
    pending_removal: Mutex<HashSet<InstanceId>>,
}

impl EventHub {
    /// Create an empty hub
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for an event, owned by an instance
    pub fn register(
        &self,
        event: EventKey,
        owner: InstanceId,
        callback: impl FnMut(&Value) + Send + 'static,
    ) {
        self.handlers.lock().entry(event).or_default().push(Handler {
            owner,
            callback: Box::new(callback),
        });
    }

    /// Remove every callback owned by an instance
    pub fn unregister_owner(&self, owner: InstanceId) {
        if *self.dispatching.lock() > 0 {
            self.pending_removal.lock().insert(owner);
            return;
        }
        let mut map = self.handlers.lock();
        for handlers in map.values_mut() {
            handlers.retain(|h| h.owner != owner);
        }
    }

    /// Number of callbacks registered for an event
    pub fn handler_count(&self, event: &EventKey) -> usize {
        self.handlers.lock().get(event).map_or(0, Vec::len)
    }

    /// Invoke every callback registered for an event, in registration
    /// order.
    pub fn raise(&self, event: &EventKey, arg: &Value) {
        let mut current = {
            let mut map = self.handlers.lock();
            map.get_mut(event).map(std::mem::take).unwrap_or_default()
        };
        if current.is_empty() {
            return;
        }
        *self.dispatching.lock() += 1;
        for handler in &mut current {
            (handler.callback)(arg);
        }
        *self.dispatching.lock() -= 1;

        let mut map = self.handlers.lock();
        let slot = map.entry(event.clone()).or_default();
        // Callbacks registered during dispatch were appended to the slot
        // while `current` was taken out; keep registration order.
        let registered_during_dispatch = std::mem::take(slot);
        *slot = current;
        slot.extend(registered_during_dispatch);
        drop(map);

        let removed: Vec<InstanceId> = self.pending_removal.lock().drain().collect();
        for owner in removed {
            self.unregister_owner(owner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_register_and_raise() {
        let hub = EventHub::new();
        let owner = InstanceId::new();
        let hits = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&hits);
        hub.register(EventKey::Update, owner, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        hub.raise(&EventKey::Update, &Value::Float(0.016));
        hub.raise(&EventKey::Update, &Value::Float(0.016));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unregister_owner_removes_all() {
        let hub = EventHub::new();
        let owner = InstanceId::new();
        let other = InstanceId::new();
        let hits = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&hits);
        hub.register(EventKey::Update, owner, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = Arc::clone(&hits);
        hub.register(EventKey::Start, owner, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = Arc::clone(&hits);
        hub.register(EventKey::Update, other, move |_| {
            counter.fetch_add(10, Ordering::SeqCst);
        });

        hub.unregister_owner(owner);
        hub.raise(&EventKey::Update, &Value::Null);
        hub.raise(&EventKey::Start, &Value::Null);
        assert_eq!(hits.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_custom_events_match_by_name() {
        let hub = EventHub::new();
        let owner = InstanceId::new();
        let hits = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&hits);
        hub.register(EventKey::Custom("damage".to_string()), owner, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        hub.raise(&EventKey::Custom("damage".to_string()), &Value::Int(5));
        hub.raise(&EventKey::Custom("heal".to_string()), &Value::Int(5));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
