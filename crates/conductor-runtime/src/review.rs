//! Human review interface
//!
//! The review tier is an external collaborator: the engine requests a
//! review, waits for the decision, and acts on approve/reject. Concrete
//! reviewer integrations (ticketing, chat, consoles) implement this trait
//! outside the core.

use async_trait::async_trait;
use conductor_types::{StageResult, WorkflowContext, WorkflowResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Opaque handle identifying one pending review
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReviewToken(pub String);

impl ReviewToken {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// The reviewer's decision on an escalated stage result
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReviewDecision {
    pub approved: bool,
    /// Replacement payload, when the reviewer revised the output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revised_payload: Option<serde_json::Value>,
}

/// External decision point for outputs the automated gates could not
/// clear. `await_decision` must honor the timeout when given one; a `None`
/// timeout waits indefinitely.
#[async_trait]
pub trait HumanReview: Send + Sync {
    async fn request_review(
        &self,
        result: &StageResult,
        context: &WorkflowContext,
    ) -> WorkflowResult<ReviewToken>;

    async fn await_decision(
        &self,
        token: ReviewToken,
        timeout: Option<Duration>,
    ) -> WorkflowResult<ReviewDecision>;
}
