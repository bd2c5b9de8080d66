//! State machine: applies verdicts to a workflow instance
//!
//! The state machine owns the transition rules of the per-stage algorithm:
//! pass → advance (or complete), anything else → fallback, with the
//! escalation-depth bound enforced here so no coordinator decision can
//! produce an unbounded retry loop. It is synchronous; the runtime's
//! orchestrator drives it and performs the actual backend and review calls.

use crate::{FallbackAction, QualityAssessor};
use conductor_types::{
    BackendRole, FailureReason, StageResult, StageTemplate, Verdict, WorkflowInstance,
    WorkflowResult,
};

/// What the orchestrator should do after a stage result is applied
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    /// The stage passed; execute the next stage
    Continue,
    /// The sequence is exhausted; the instance completed
    Completed,
    /// The verdict requires a fallback decision
    NeedsFallback(Verdict),
}

/// What the orchestrator should do after a fallback action is applied
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FallbackStep {
    /// Rerun the current stage (alternate backend; depth was consumed)
    RerunStage,
    /// The instance is parked awaiting a human decision
    AwaitReview,
    /// The instance reached terminal failure
    Terminated,
}

/// Sequences stages and applies quality verdicts to workflow instances
#[derive(Clone, Debug, Default)]
pub struct StateMachine {
    assessor: QualityAssessor,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            assessor: QualityAssessor::new(),
        }
    }

    /// Begin executing a submitted instance
    pub fn begin(&self, instance: &mut WorkflowInstance) -> WorkflowResult<()> {
        instance.start()
    }

    /// Assess and record a stage result, then advance or flag fallback.
    ///
    /// The final verdict is written onto the result before it is appended;
    /// once in the log it is immutable. `sequence_len` is the length of the
    /// instance's resolved stage sequence.
    pub fn apply_result(
        &self,
        instance: &mut WorkflowInstance,
        template: &StageTemplate,
        mut result: StageResult,
        sequence_len: usize,
    ) -> WorkflowResult<Transition> {
        // Review-tier backends are judged against the review gate's bar
        let threshold = if result.role_used == BackendRole::Review {
            template.review_gate_threshold()
        } else {
            template.threshold
        };
        let verdict = self.assessor.assess(&result, threshold);
        result.verdict = verdict;
        if verdict == Verdict::Pass {
            Self::fold_context(instance, &result);
        }
        instance.record_result(result);

        match verdict {
            Verdict::Pass => {
                instance.advance();
                if instance.current_stage >= sequence_len {
                    instance.complete()?;
                    Ok(Transition::Completed)
                } else {
                    Ok(Transition::Continue)
                }
            }
            other => Ok(Transition::NeedsFallback(other)),
        }
    }

    /// Carry out a fallback decision on the instance's state.
    ///
    /// The depth bound is enforced here regardless of what the coordinator
    /// decided: exceeding `max_depth` forces terminal failure, never
    /// another retry.
    pub fn apply_fallback(
        &self,
        instance: &mut WorkflowInstance,
        action: &FallbackAction,
        max_depth: u32,
    ) -> WorkflowResult<FallbackStep> {
        match action {
            FallbackAction::RetryWithAlternateBackend => {
                if instance.escalation_depth >= max_depth {
                    instance.fail(FailureReason::EscalationExhausted)?;
                    return Ok(FallbackStep::Terminated);
                }
                instance.bump_escalation();
                Ok(FallbackStep::RerunStage)
            }
            FallbackAction::EscalateToHumanReview => {
                instance.await_review()?;
                Ok(FallbackStep::AwaitReview)
            }
            FallbackAction::TerminateFailed { reason } => {
                instance.fail(reason.clone())?;
                Ok(FallbackStep::Terminated)
            }
        }
    }

    /// Record an approving reviewer decision: the reviewed stage counts as
    /// passed with the (possibly revised) payload appended as a fresh
    /// result, and the instance resumes.
    pub fn apply_review_approval(
        &self,
        instance: &mut WorkflowInstance,
        result: StageResult,
        sequence_len: usize,
    ) -> WorkflowResult<Transition> {
        instance.resume()?;
        Self::fold_context(instance, &result);
        instance.record_result(result);
        instance.advance();
        if instance.current_stage >= sequence_len {
            instance.complete()?;
            Ok(Transition::Completed)
        } else {
            Ok(Transition::Continue)
        }
    }

    /// Fold a passing result's output into the instance context, making it
    /// visible to later stages and to the condition evaluator. Only
    /// top-level string fields of the payload carry over. The context is
    /// append-only per key: the first contribution wins, a collision is
    /// logged and dropped.
    fn fold_context(instance: &mut WorkflowInstance, result: &StageResult) {
        let Some(fields) = result.payload.as_object() else {
            return;
        };
        for (key, value) in fields {
            let Some(value) = value.as_str() else { continue };
            if let Err(err) = instance.context.append(&result.stage_name, key.clone(), value) {
                tracing::warn!(
                    stage = %result.stage_name,
                    key = %key,
                    error = %err,
                    "Context contribution dropped"
                );
            }
        }
    }
}
