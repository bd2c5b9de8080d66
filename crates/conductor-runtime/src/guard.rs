//! Submission guard: the pluggable security-check capability
//!
//! The engine does not implement authentication or authorization; it only
//! invokes this hook before admitting a submission. Deployments wire in
//! their own policy.

use conductor_types::{WorkflowDefinition, WorkflowResult};

pub trait SubmissionGuard: Send + Sync {
    /// Reject the submission by returning `WorkflowError::SubmissionRejected`
    fn check(&self, definition: &WorkflowDefinition, input: &serde_json::Value)
        -> WorkflowResult<()>;
}
