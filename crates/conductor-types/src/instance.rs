//! Workflow instances: running executions of workflow definitions
//!
//! A WorkflowInstance tracks the runtime state of one unit of work: the
//! current stage index, the append-only result log, the accumulated context,
//! and the escalation depth. While active it is owned exclusively by the
//! task driving it — no other actor writes to it.

use crate::{BackendRole, WorkflowContext, WorkflowDefinitionId, WorkflowError, WorkflowResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ── Instance Identifier ──────────────────────────────────────────────

/// Unique identifier for a workflow instance
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowInstanceId(pub String);

impl WorkflowInstanceId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl std::fmt::Display for WorkflowInstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Status & Verdicts ────────────────────────────────────────────────

/// The lifecycle state of a workflow instance.
///
/// Legal transitions: `Submitted → Running → {Completed,
/// AwaitingHumanReview, Failed}` and `AwaitingHumanReview → {Running,
/// Failed}`. `Completed` and `Failed` are terminal — no further mutation
/// is permitted once either is reached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum WorkflowStatus {
    #[default]
    Submitted,
    Running,
    AwaitingHumanReview,
    Completed,
    Failed,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Submitted => "submitted",
            Self::Running => "running",
            Self::AwaitingHumanReview => "awaiting_human_review",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Why a workflow instance reached `Failed`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// The escalation depth bound was hit
    EscalationExhausted,
    /// Cancellation was requested externally
    Cancelled,
    /// A stage failed with no remaining fallback
    StageFailed(String),
    /// The human reviewer rejected the output
    ReviewRejected,
    /// The human-review wait exceeded its deadline
    ReviewTimeout,
    /// No human-review capability was registered
    ReviewUnavailable,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EscalationExhausted => write!(f, "escalation exhausted"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::StageFailed(s) => write!(f, "stage failed: {}", s),
            Self::ReviewRejected => write!(f, "review rejected"),
            Self::ReviewTimeout => write!(f, "review timed out"),
            Self::ReviewUnavailable => write!(f, "review unavailable"),
        }
    }
}

/// The quality assessor's classification of a stage result
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// Confidence met the gate; the workflow advances
    Pass,
    /// Confidence fell short; the fallback coordinator decides what's next
    Escalate,
    /// The executor exhausted every attempt
    Fail,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pass => "pass",
            Self::Escalate => "escalate",
            Self::Fail => "fail",
        };
        write!(f, "{}", s)
    }
}

// ── Stage Result ─────────────────────────────────────────────────────

/// One executed attempt at a stage. Immutable once appended to the
/// instance's result log; the log is the audit trail and the input
/// context for later stages.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StageResult {
    /// Which stage executed
    pub stage_name: String,
    /// The backend role that served the stage
    pub role_used: BackendRole,
    /// The concrete adapter that produced the output
    pub backend_id: String,
    /// Opaque structured output (or `{"error": …}` on failure)
    pub payload: serde_json::Value,
    /// Backend-reported confidence, 0.0–1.0
    pub confidence: f64,
    /// Wall-clock latency in milliseconds; equals the timeout bound for
    /// attempts that timed out
    pub latency_ms: u64,
    /// The quality gate's classification
    pub verdict: Verdict,
    /// How many invocation attempts this result consumed
    pub attempts: u32,
    /// When the result was recorded
    pub executed_at: DateTime<Utc>,
}

// ── Workflow Instance ────────────────────────────────────────────────

/// A running instance of a workflow definition
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowInstance {
    /// Unique instance identifier
    pub id: WorkflowInstanceId,
    /// The definition this instance was created from
    pub definition_id: WorkflowDefinitionId,
    /// Lifecycle state
    pub status: WorkflowStatus,
    /// Index into the instance's resolved stage sequence.
    ///
    /// Monotonically non-decreasing, except that the fallback coordinator
    /// may rerun the current stage (the index simply does not advance).
    pub current_stage: usize,
    /// Ordered, append-only log of executed stage attempts
    pub results: Vec<StageResult>,
    /// Accumulated context visible to later stages and the evaluator
    pub context: WorkflowContext,
    /// Fallback escalations consumed so far; never exceeds the
    /// definition's `max_escalation_depth`
    pub escalation_depth: u32,
    /// Why the instance failed, when it did
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
    /// Adapter ids already tried per stage (drives alternate selection)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tried_backends: HashMap<String, Vec<String>>,
    /// When the instance was created
    pub created_at: DateTime<Utc>,
    /// When the instance was last updated
    pub updated_at: DateTime<Utc>,
    /// When the instance reached a terminal status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowInstance {
    pub fn new(definition_id: WorkflowDefinitionId, context: WorkflowContext) -> Self {
        let now = Utc::now();
        Self {
            id: WorkflowInstanceId::generate(),
            definition_id,
            status: WorkflowStatus::Submitted,
            current_stage: 0,
            results: Vec::new(),
            context,
            escalation_depth: 0,
            failure: None,
            tried_backends: HashMap::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────────

    /// Start executing (Submitted → Running)
    pub fn start(&mut self) -> WorkflowResult<()> {
        self.transition_to(WorkflowStatus::Running, &[WorkflowStatus::Submitted])
    }

    /// Hand off to the human review tier (Running → AwaitingHumanReview)
    pub fn await_review(&mut self) -> WorkflowResult<()> {
        self.transition_to(
            WorkflowStatus::AwaitingHumanReview,
            &[WorkflowStatus::Running],
        )
    }

    /// Resume after an approving reviewer decision
    pub fn resume(&mut self) -> WorkflowResult<()> {
        self.transition_to(
            WorkflowStatus::Running,
            &[WorkflowStatus::AwaitingHumanReview],
        )
    }

    /// Complete successfully. Terminal.
    pub fn complete(&mut self) -> WorkflowResult<()> {
        self.transition_to(WorkflowStatus::Completed, &[WorkflowStatus::Running])?;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Fail with a reason. Terminal.
    pub fn fail(&mut self, reason: FailureReason) -> WorkflowResult<()> {
        self.transition_to(
            WorkflowStatus::Failed,
            &[
                WorkflowStatus::Submitted,
                WorkflowStatus::Running,
                WorkflowStatus::AwaitingHumanReview,
            ],
        )?;
        self.failure = Some(reason);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    // ── Mutation (active only) ───────────────────────────────────────

    /// Append a stage result. The log is append-only; results are never
    /// edited once recorded.
    ///
    /// A parallel result carries its branch ids joined with `+`; each
    /// branch counts as tried individually, so an escalating parallel
    /// stage never reruns the same fan-out.
    pub fn record_result(&mut self, result: StageResult) {
        let tried = self
            .tried_backends
            .entry(result.stage_name.clone())
            .or_default();
        for backend_id in result.backend_id.split('+') {
            tried.push(backend_id.to_string());
        }
        self.results.push(result);
        self.updated_at = Utc::now();
    }

    /// Advance to the next stage position
    pub fn advance(&mut self) {
        self.current_stage += 1;
        self.updated_at = Utc::now();
    }

    /// Consume one unit of escalation depth
    pub fn bump_escalation(&mut self) {
        self.escalation_depth += 1;
        self.updated_at = Utc::now();
    }

    // ── Query ────────────────────────────────────────────────────────

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_running(&self) -> bool {
        self.status == WorkflowStatus::Running
    }

    /// Adapter ids already tried for a stage
    pub fn tried_for(&self, stage: &str) -> &[String] {
        self.tried_backends
            .get(stage)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Results recorded for a specific stage, in execution order
    pub fn results_for(&self, stage: &str) -> Vec<&StageResult> {
        self.results
            .iter()
            .filter(|r| r.stage_name == stage)
            .collect()
    }

    /// The caller-facing snapshot of this instance
    pub fn snapshot(&self) -> InstanceSnapshot {
        InstanceSnapshot {
            instance_id: self.id.clone(),
            status: self.status,
            current_stage: self.current_stage,
            results: self.results.clone(),
            failure: self.failure.clone(),
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn transition_to(
        &mut self,
        to: WorkflowStatus,
        allowed_from: &[WorkflowStatus],
    ) -> WorkflowResult<()> {
        if self.status.is_terminal() {
            return Err(WorkflowError::AlreadyTerminal);
        }
        if !allowed_from.contains(&self.status) {
            return Err(WorkflowError::InvalidTransition(format!(
                "{} -> {}",
                self.status, to
            )));
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }
}

// ── Snapshot ─────────────────────────────────────────────────────────

/// The serde record shape for `get_status` and for durable storage: one
/// record per instance keyed by id, carrying the full result log — enough
/// to diagnose exactly which stage and verdict caused a termination, and
/// to resume at `current_stage` after a restart.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InstanceSnapshot {
    pub instance_id: WorkflowInstanceId,
    pub status: WorkflowStatus,
    pub current_stage: usize,
    pub results: Vec<StageResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
}
