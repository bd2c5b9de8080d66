//! Stage executor: invokes backends under timeout and retry policy
//!
//! The executor normalizes every outcome into a StageResult. Attempt-level
//! failures (timeout, backend error) are retried here with exponential
//! backoff and never surface past the executor; only when every configured
//! attempt is exhausted does a `Fail` result emerge. The executor holds no
//! cross-call state.

use crate::{AdapterRegistry, BackendAdapter, BackendResponse, StageRequest};
use chrono::Utc;
use conductor_types::{
    BackendFailure, BackendRole, StageResult, StageTemplate, Verdict, WorkflowContext,
};
use std::sync::Arc;
use std::time::Duration;

/// Executes single stage attempts against resolved backend adapters
#[derive(Clone, Debug, Default)]
pub struct StageExecutor;

impl StageExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Execute a stage against one adapter, retrying per the template's
    /// policy. Successful results carry a provisional `Pass` verdict that
    /// the quality assessor refines; exhausted attempts produce `Fail`
    /// with the last error reason in the payload.
    pub async fn execute(
        &self,
        template: &StageTemplate,
        role: BackendRole,
        adapter: Arc<dyn BackendAdapter>,
        input: &serde_json::Value,
        context: &WorkflowContext,
    ) -> StageResult {
        let timeout = Duration::from_millis(template.timeout_ms);
        let mut last_error = BackendFailure::Backend("no attempt executed".into());

        for attempt in 0..template.retry.max_attempts {
            if attempt > 0 {
                let delay = template.retry.backoff_delay_ms(attempt - 1);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let request = StageRequest {
                stage_name: template.name.clone(),
                role,
                input: input.clone(),
                context: context.clone(),
            };

            match self.attempt(&*adapter, request, timeout, template.timeout_ms).await {
                Ok(response) => {
                    return self.success_result(template, role, adapter.id(), response, attempt + 1)
                }
                Err(failure) => {
                    tracing::warn!(
                        stage = %template.name,
                        backend_id = adapter.id(),
                        attempt = attempt + 1,
                        error = %failure,
                        "Stage attempt failed"
                    );
                    last_error = failure;
                }
            }
        }

        self.failure_result(template, role, adapter.id(), &last_error)
    }

    /// Execute a parallel stage: fan out to every provided adapter, await
    /// all branches, and fold them into one logical result. Payload is the
    /// array of branch payloads, confidence the minimum across successful
    /// branches (the gate is only as strong as the weakest branch), latency
    /// the slowest branch. Branches failing all their attempts fail the
    /// whole logical stage.
    pub async fn execute_parallel(
        &self,
        template: &StageTemplate,
        role: BackendRole,
        adapters: Vec<Arc<dyn BackendAdapter>>,
        input: &serde_json::Value,
        context: &WorkflowContext,
    ) -> StageResult {
        let branches = adapters.iter().map(|adapter| {
            self.execute(template, role, Arc::clone(adapter), input, context)
        });
        let results = futures::future::join_all(branches).await;

        let attempts = results.iter().map(|r| r.attempts).sum();
        let latency_ms = results.iter().map(|r| r.latency_ms).max().unwrap_or(0);
        let backend_ids = adapters
            .iter()
            .map(|a| a.id().to_string())
            .collect::<Vec<_>>()
            .join("+");

        if let Some(failed) = results.iter().find(|r| r.verdict == Verdict::Fail) {
            return StageResult {
                stage_name: template.name.clone(),
                role_used: role,
                backend_id: backend_ids,
                payload: failed.payload.clone(),
                confidence: 0.0,
                latency_ms,
                verdict: Verdict::Fail,
                attempts,
                executed_at: Utc::now(),
            };
        }

        let confidence = results
            .iter()
            .map(|r| r.confidence)
            .fold(f64::INFINITY, f64::min);
        let payload = serde_json::Value::Array(results.into_iter().map(|r| r.payload).collect());

        StageResult {
            stage_name: template.name.clone(),
            role_used: role,
            backend_id: backend_ids,
            payload,
            confidence,
            latency_ms,
            verdict: Verdict::Pass,
            attempts,
            executed_at: Utc::now(),
        }
    }

    /// Resolve and execute according to the template: parallel stages fan
    /// out to all eligible adapters, sequential stages use the one the
    /// registry picked.
    pub async fn execute_resolved(
        &self,
        template: &StageTemplate,
        role: BackendRole,
        registry: &AdapterRegistry,
        exclude: &[String],
        input: &serde_json::Value,
        context: &WorkflowContext,
    ) -> StageResult {
        if template.parallel {
            let adapters = registry.all_for(role);
            if adapters.is_empty() {
                return self.failure_result(
                    template,
                    role,
                    "unresolved",
                    &BackendFailure::Backend(format!("no adapter registered for role {role}")),
                );
            }
            return self
                .execute_parallel(template, role, adapters, input, context)
                .await;
        }

        match registry.resolve(role, exclude) {
            Some(adapter) => self.execute(template, role, adapter, input, context).await,
            None => self.failure_result(
                template,
                role,
                "unresolved",
                &BackendFailure::Backend(format!("no adapter registered for role {role}")),
            ),
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    async fn attempt(
        &self,
        adapter: &dyn BackendAdapter,
        request: StageRequest,
        timeout: Duration,
        limit_ms: u64,
    ) -> Result<BackendResponse, BackendFailure> {
        match tokio::time::timeout(timeout, adapter.invoke(request)).await {
            Ok(result) => result,
            Err(_) => Err(BackendFailure::Timeout { limit_ms }),
        }
    }

    fn success_result(
        &self,
        template: &StageTemplate,
        role: BackendRole,
        backend_id: &str,
        response: BackendResponse,
        attempts: u32,
    ) -> StageResult {
        StageResult {
            stage_name: template.name.clone(),
            role_used: role,
            backend_id: backend_id.to_string(),
            payload: response.payload,
            confidence: response.confidence,
            latency_ms: response.latency_ms,
            // Provisional; the quality assessor has the final word
            verdict: Verdict::Pass,
            attempts,
            executed_at: Utc::now(),
        }
    }

    fn failure_result(
        &self,
        template: &StageTemplate,
        role: BackendRole,
        backend_id: &str,
        failure: &BackendFailure,
    ) -> StageResult {
        // A timed-out attempt records latency equal to the timeout bound
        let latency_ms = match failure {
            BackendFailure::Timeout { limit_ms } => *limit_ms,
            _ => 0,
        };
        StageResult {
            stage_name: template.name.clone(),
            role_used: role,
            backend_id: backend_id.to_string(),
            payload: serde_json::json!({ "error": failure.to_string() }),
            confidence: 0.0,
            latency_ms,
            verdict: Verdict::Fail,
            attempts: template.retry.max_attempts,
            executed_at: Utc::now(),
        }
    }
}
