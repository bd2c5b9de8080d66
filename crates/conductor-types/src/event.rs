//! Lifecycle events emitted on every workflow state transition
//!
//! Consumers (dashboards, audit stores) subscribe passively via an
//! [`EventSink`]; the engine emits and moves on. Concrete sinks live with
//! the runtime.

use crate::{Verdict, WorkflowInstanceId, WorkflowStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One state transition of a workflow instance
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub instance_id: WorkflowInstanceId,
    pub timestamp: DateTime<Utc>,
    pub from: WorkflowStatus,
    pub to: WorkflowStatus,
    /// The stage involved, for stage-level transitions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_name: Option<String>,
    /// The verdict that drove the transition, when one did
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
}

impl WorkflowEvent {
    pub fn transition(instance_id: WorkflowInstanceId, from: WorkflowStatus, to: WorkflowStatus) -> Self {
        Self {
            instance_id,
            timestamp: Utc::now(),
            from,
            to,
            stage_name: None,
            verdict: None,
        }
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage_name = Some(stage.into());
        self
    }

    pub fn with_verdict(mut self, verdict: Verdict) -> Self {
        self.verdict = Some(verdict);
        self
    }
}

/// Receives lifecycle events. Implementations must be cheap and
/// non-blocking; the orchestrator emits from the instance's own task.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: WorkflowEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_builders() {
        let event = WorkflowEvent::transition(
            WorkflowInstanceId::new("inst-1"),
            WorkflowStatus::Running,
            WorkflowStatus::Running,
        )
        .with_stage("classify")
        .with_verdict(Verdict::Pass);

        assert_eq!(event.stage_name.as_deref(), Some("classify"));
        assert_eq!(event.verdict, Some(Verdict::Pass));
    }

    #[test]
    fn test_event_serializes() {
        let event = WorkflowEvent::transition(
            WorkflowInstanceId::new("inst-1"),
            WorkflowStatus::Submitted,
            WorkflowStatus::Running,
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["from"], "Submitted");
        assert_eq!(json["to"], "Running");
        // Optional fields omitted entirely
        assert!(json.get("stage_name").is_none());
    }
}
