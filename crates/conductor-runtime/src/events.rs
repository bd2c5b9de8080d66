//! Event sinks: where lifecycle transitions go
//!
//! The orchestrator emits a [`WorkflowEvent`] on every state transition;
//! these are the bundled sinks. Dashboards and audit stores plug in their
//! own implementations of [`EventSink`].

use conductor_types::{EventSink, WorkflowEvent, WorkflowInstanceId};
use std::sync::{Mutex, PoisonError};

/// Logs every transition through `tracing`
#[derive(Clone, Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: WorkflowEvent) {
        tracing::info!(
            instance_id = %event.instance_id,
            from = %event.from,
            to = %event.to,
            stage = event.stage_name.as_deref().unwrap_or("-"),
            verdict = event.verdict.map(|v| v.to_string()).unwrap_or_default(),
            "Workflow transition"
        );
    }
}

/// Collects events in memory; used by tests and simple dashboards
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<WorkflowEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events recorded so far, in emission order
    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Events for one instance, in emission order
    pub fn events_for(&self, instance_id: &WorkflowInstanceId) -> Vec<WorkflowEvent> {
        self.events()
            .into_iter()
            .filter(|e| &e.instance_id == instance_id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: WorkflowEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// Discards everything
#[derive(Clone, Debug, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: WorkflowEvent) {}
}
