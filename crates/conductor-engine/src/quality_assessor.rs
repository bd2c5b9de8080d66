//! Quality assessor: scores stage output against the configured gate
//!
//! Assessment and transition are deliberately separated — the assessor
//! returns a verdict and the state machine decides what the verdict means.
//! That keeps this logic unit-testable without any state machine at all.

use conductor_types::{StageResult, Verdict};

/// Classifies stage results against per-stage confidence thresholds
#[derive(Clone, Debug, Default)]
pub struct QualityAssessor;

impl QualityAssessor {
    pub fn new() -> Self {
        Self
    }

    /// Verdict rules, evaluated in order:
    ///
    /// 1. An executor-marked `Fail` stays `Fail` — the assessor never
    ///    overrides executor-level failures.
    /// 2. `confidence >= threshold` is a `Pass`.
    /// 3. Everything else escalates.
    ///
    /// The result itself is never mutated.
    pub fn assess(&self, result: &StageResult, threshold: f64) -> Verdict {
        if result.verdict == Verdict::Fail {
            return Verdict::Fail;
        }
        if result.confidence >= threshold {
            Verdict::Pass
        } else {
            Verdict::Escalate
        }
    }
}
