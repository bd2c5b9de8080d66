//! Error types for the Conductor engine

use crate::{BackendRole, WorkflowDefinitionId, WorkflowInstanceId};

/// Errors that can occur in workflow operations
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// Bad workflow definition — raised at registration, never at run time
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Workflow definition not found: {0}")]
    DefinitionNotFound(WorkflowDefinitionId),

    #[error("Workflow instance not found: {0}")]
    InstanceNotFound(WorkflowInstanceId),

    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    #[error("Workflow instance not active")]
    NotActive,

    #[error("Workflow instance already terminal")]
    AlreadyTerminal,

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Context key '{key}' already written by stage '{stage}'")]
    ContextKeyConflict { key: String, stage: String },

    #[error("No eligible backend for role: {0}")]
    NoEligibleBackend(BackendRole),

    #[error("Escalation depth exhausted")]
    EscalationExhausted,

    #[error("Workflow cancelled")]
    Cancelled,

    #[error("Human review capability unavailable")]
    ReviewUnavailable,

    #[error("Submission rejected: {0}")]
    SubmissionRejected(String),
}

/// Result type alias for workflow operations
pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Adapter-level failures, consumed and retried by the stage executor.
///
/// These never surface past the executor unless every configured attempt
/// is exhausted, at which point the stage result carries verdict `Fail`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendFailure {
    #[error("Backend invocation timed out after {limit_ms}ms")]
    Timeout { limit_ms: u64 },

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Backend invocation cancelled")]
    Cancelled,
}
