// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared fixtures for the node library tests.

use flowscript_graph::{ExecCtx, Execution, NodeBehavior, NodeSpec, RuntimeError};
use parking_lot::Mutex;
use std::sync::Arc;

pub type Log = Arc<Mutex<Vec<String>>>;

/// Entry point: a single `exit` flow output.
pub struct Entry;

impl NodeBehavior for Entry {
    fn type_name(&self) -> &'static str {
        "entry"
    }

    fn register(&self, spec: &mut NodeSpec) {
        spec.flow_output("exit");
    }
}

/// Appends its label to a shared log, then continues.
pub struct Probe {
    pub label: &'static str,
    pub log: Log,
}

impl NodeBehavior for Probe {
    fn type_name(&self) -> &'static str {
        "probe"
    }

    fn register(&self, spec: &mut NodeSpec) {
        spec.flow_input("in");
        spec.flow_output("exit");
    }

    fn execute(&self, _ctx: &mut ExecCtx<'_>, _input: &str) -> Result<Execution, RuntimeError> {
        self.log.lock().push(self.label.to_string());
        Ok(Execution::next("exit"))
    }
}

pub fn probe(log: &Log, label: &'static str) -> Arc<Probe> {
    Arc::new(Probe {
        label,
        log: Arc::clone(log),
    })
}
