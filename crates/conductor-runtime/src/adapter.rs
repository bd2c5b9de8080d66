//! Backend adapter contract
//!
//! Every processing backend — text, vision, reasoning, whatever sits behind
//! it — satisfies this one envelope. The core never depends on a concrete
//! backend's request or response shape beyond `{payload, confidence,
//! latency}`, so backends are interchangeable per capability role.

use async_trait::async_trait;
use conductor_types::{BackendFailure, BackendRole, WorkflowContext};
use serde::{Deserialize, Serialize};

/// The input handed to an adapter for one stage invocation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StageRequest {
    /// The stage being executed
    pub stage_name: String,
    /// The capability role the adapter was resolved under
    pub role: BackendRole,
    /// The workflow's input payload (opaque to the engine)
    pub input: serde_json::Value,
    /// Snapshot of accumulated context from prior stages
    pub context: WorkflowContext,
}

/// What an adapter returns on success
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackendResponse {
    /// Opaque structured output
    pub payload: serde_json::Value,
    /// Backend-reported confidence, 0.0–1.0
    pub confidence: f64,
    /// Backend-reported processing latency in milliseconds
    pub latency_ms: u64,
}

/// Uniform contract each processing backend must satisfy.
///
/// Invocation futures may be dropped at any time (timeout or
/// cancellation); implementations must tolerate that without corrupting
/// their own state.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    /// Stable identifier for this concrete adapter
    fn id(&self) -> &str;

    /// Capability roles this adapter declares
    fn roles(&self) -> &[BackendRole];

    /// Invoke the backend for one stage attempt
    async fn invoke(&self, request: StageRequest) -> Result<BackendResponse, BackendFailure>;
}
