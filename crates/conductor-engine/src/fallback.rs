//! Fallback coordinator: what happens after a non-pass verdict
//!
//! The coordinator returns a decision — it does not retry, route, or fail
//! anything itself; the orchestrator acts on its answer. The decision
//! ordering reflects a cost/latency gradient and is preserved exactly:
//! alternate backend before human escalation before termination.

use conductor_types::{FailureReason, StageTemplate, Verdict, WorkflowInstance};

/// The coordinator's answer for a stage that did not pass its gate
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FallbackAction {
    /// Rerun the same stage with a different eligible backend
    RetryWithAlternateBackend,
    /// Hand the stage output to the human review tier
    EscalateToHumanReview,
    /// No fallback remains; the instance fails with this reason
    TerminateFailed { reason: FailureReason },
}

/// Decides between alternate backends, human review, and termination
#[derive(Clone, Debug, Default)]
pub struct FallbackCoordinator;

impl FallbackCoordinator {
    pub fn new() -> Self {
        Self
    }

    /// Resolve the fallback for a stage whose verdict was `Escalate` or
    /// `Fail`.
    ///
    /// Policy, in order:
    /// 1. Rerun with an alternate eligible backend, if one exists and
    ///    `escalation_depth < max_depth`. A `Fail` on a high-stakes stage
    ///    never takes this branch — repeated automated attempts are not
    ///    acceptable there.
    /// 2. Otherwise escalate to human review, if the capability is
    ///    registered.
    /// 3. Otherwise terminate: `EscalationExhausted` when the escalation
    ///    path ran out, `StageFailed` when the executor itself gave up.
    pub fn resolve(
        &self,
        instance: &WorkflowInstance,
        template: &StageTemplate,
        verdict: Verdict,
        alternate_available: bool,
        review_available: bool,
        max_depth: u32,
    ) -> FallbackAction {
        debug_assert_ne!(verdict, Verdict::Pass);

        let depth_remaining = instance.escalation_depth < max_depth;
        let high_stakes_fail = verdict == Verdict::Fail && template.high_stakes;

        if alternate_available && depth_remaining && !high_stakes_fail {
            return FallbackAction::RetryWithAlternateBackend;
        }

        if review_available {
            return FallbackAction::EscalateToHumanReview;
        }

        let reason = if verdict == Verdict::Fail {
            FailureReason::StageFailed(template.name.clone())
        } else {
            FailureReason::EscalationExhausted
        };
        FallbackAction::TerminateFailed { reason }
    }
}
