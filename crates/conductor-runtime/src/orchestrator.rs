//! Workflow orchestrator: the submission surface and per-instance driver
//!
//! The orchestrator composes the decision engine with the acting pieces:
//! it registers definitions, admits submissions through the security hook,
//! spawns one tokio task per instance, and carries out the engine's
//! decisions — backend execution, fallback, human review — while emitting
//! an event on every transition.
//!
//! Collaborators are injected at construction; there are no globals. The
//! instance itself is written only by its driver task. Status reads take
//! the shared lock briefly and are idempotent.

use crate::{
    AdapterRegistry, HumanReview, ReviewDecision, RuntimeConfig, StageExecutor, SubmissionGuard,
    TracingEventSink,
};
use chrono::Utc;
use conductor_engine::{
    ConditionEvaluator, DefinitionRegistry, FallbackCoordinator, FallbackStep, StateMachine,
    Transition,
};
use conductor_types::{
    BackendRole, EventSink, FailureReason, InstanceSnapshot, StageResult, StageTemplate, Verdict,
    WorkflowContext, WorkflowDefinition, WorkflowDefinitionId, WorkflowError, WorkflowEvent,
    WorkflowInstance, WorkflowInstanceId, WorkflowResult, WorkflowStatus,
};
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::watch;

/// Identifier the review tier reports as the producing backend
const REVIEW_BACKEND_ID: &str = "human-review";

struct InstanceHandle {
    instance: Arc<tokio::sync::RwLock<WorkflowInstance>>,
    cancel: watch::Sender<bool>,
}

/// Holds one concurrency slot for the lifetime of a driver task. The slot
/// is released exactly once, when the task ends at its terminal state.
struct SlotGuard(Arc<AtomicUsize>);

impl SlotGuard {
    fn acquire(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }

    /// Acquire only if the counter is below `max`. Check and increment are
    /// a single atomic update, so concurrent submissions cannot overshoot
    /// the cap.
    fn try_acquire(counter: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < max).then_some(n + 1)
            })
            .ok()
            .map(|_| Self(Arc::clone(counter)))
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The workflow engine's public surface: submit, observe, cancel
pub struct WorkflowOrchestrator {
    definitions: RwLock<DefinitionRegistry>,
    adapters: Arc<AdapterRegistry>,
    events: Arc<dyn EventSink>,
    review: Option<Arc<dyn HumanReview>>,
    guard: Option<Arc<dyn SubmissionGuard>>,
    config: RuntimeConfig,
    instances: DashMap<WorkflowInstanceId, InstanceHandle>,
    live: Arc<AtomicUsize>,
}

impl WorkflowOrchestrator {
    pub fn new(adapters: Arc<AdapterRegistry>) -> Self {
        Self {
            definitions: RwLock::new(DefinitionRegistry::new()),
            adapters,
            events: Arc::new(TracingEventSink),
            review: None,
            guard: None,
            config: RuntimeConfig::default(),
            instances: DashMap::new(),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    pub fn with_review(mut self, review: Arc<dyn HumanReview>) -> Self {
        self.review = Some(review);
        self
    }

    pub fn with_guard(mut self, guard: Arc<dyn SubmissionGuard>) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    // ── Definition Management ────────────────────────────────────────

    /// Register a workflow definition. This is the fail-fast gate: bad
    /// configuration is rejected here, never during execution.
    pub fn register_definition(
        &self,
        definition: WorkflowDefinition,
    ) -> WorkflowResult<WorkflowDefinitionId> {
        self.definitions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .register(definition)
    }

    /// Number of registered definitions
    pub fn definition_count(&self) -> usize {
        self.definitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .count()
    }

    // ── Submission Surface ───────────────────────────────────────────

    /// Submit a unit of work. Spawns the instance's driver task and
    /// returns immediately with its id.
    pub fn submit(
        &self,
        definition_id: &WorkflowDefinitionId,
        input: serde_json::Value,
        context: WorkflowContext,
    ) -> WorkflowResult<WorkflowInstanceId> {
        let definition = Arc::new(
            self.definitions
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(definition_id)?
                .clone(),
        );

        if let Some(guard) = &self.guard {
            guard.check(&definition, &input)?;
        }

        let slot = match self.config.max_live_instances {
            Some(max) => SlotGuard::try_acquire(&self.live, max).ok_or_else(|| {
                WorkflowError::SubmissionRejected(format!("live instance limit reached ({max})"))
            })?,
            None => SlotGuard::acquire(&self.live),
        };

        let instance = WorkflowInstance::new(definition_id.clone(), context);
        let instance_id = instance.id.clone();
        let shared = Arc::new(tokio::sync::RwLock::new(instance));
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let driver = InstanceDriver {
            definition,
            instance: Arc::clone(&shared),
            input,
            adapters: Arc::clone(&self.adapters),
            events: Arc::clone(&self.events),
            review: self.review.clone(),
            config: self.config.clone(),
            evaluator: ConditionEvaluator::new(),
            state_machine: StateMachine::new(),
            coordinator: FallbackCoordinator::new(),
            executor: StageExecutor::new(),
            cancel: cancel_rx,
            _slot: slot,
        };

        tracing::info!(instance_id = %instance_id, definition_id = %definition_id, "Workflow instance submitted");
        tokio::spawn(driver.run());

        self.instances.insert(
            instance_id.clone(),
            InstanceHandle {
                instance: shared,
                cancel: cancel_tx,
            },
        );
        Ok(instance_id)
    }

    /// Current status plus the full result log up to this point.
    /// Idempotent: identical snapshots absent an intervening transition.
    pub async fn get_status(&self, id: &WorkflowInstanceId) -> WorkflowResult<InstanceSnapshot> {
        let handle = self
            .instances
            .get(id)
            .ok_or_else(|| WorkflowError::InstanceNotFound(id.clone()))?;
        let snapshot = handle.instance.read().await.snapshot();
        Ok(snapshot)
    }

    /// Request cancellation. The driver observes it at its next suspension
    /// point, drops any in-flight backend call, and transitions the
    /// instance to `Failed(Cancelled)`.
    pub async fn cancel(&self, id: &WorkflowInstanceId) -> WorkflowResult<()> {
        let handle = self
            .instances
            .get(id)
            .ok_or_else(|| WorkflowError::InstanceNotFound(id.clone()))?;
        if handle.instance.read().await.is_terminal() {
            return Err(WorkflowError::AlreadyTerminal);
        }
        // Ignore a closed channel: the driver finished in the meantime
        let _ = handle.cancel.send(true);
        tracing::info!(instance_id = %id, "Cancellation requested");
        Ok(())
    }

    /// Number of live or archived instances
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Number of instances that have not yet reached a terminal state
    pub fn live_instances(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

// ── Instance Driver ──────────────────────────────────────────────────

/// Drives one workflow instance from submission to a terminal status.
/// Exactly one driver exists per instance, so stage execution within an
/// instance is strictly sequential.
struct InstanceDriver {
    definition: Arc<WorkflowDefinition>,
    instance: Arc<tokio::sync::RwLock<WorkflowInstance>>,
    input: serde_json::Value,
    adapters: Arc<AdapterRegistry>,
    events: Arc<dyn EventSink>,
    review: Option<Arc<dyn HumanReview>>,
    config: RuntimeConfig,
    evaluator: ConditionEvaluator,
    state_machine: StateMachine,
    coordinator: FallbackCoordinator,
    executor: StageExecutor,
    cancel: watch::Receiver<bool>,
    /// Released on drop, when the task ends at its terminal state
    _slot: SlotGuard,
}

impl InstanceDriver {
    async fn run(mut self) {
        if let Err(err) = self.drive().await {
            // Defensive: a driver error means an internal invariant broke;
            // surface it as a stage failure rather than hanging the task.
            tracing::error!(error = %err, "Instance driver error");
            let mut inst = self.instance.write().await;
            if !inst.is_terminal() {
                let from = inst.status;
                if inst
                    .fail(FailureReason::StageFailed(err.to_string()))
                    .is_ok()
                {
                    self.emit(&inst, from, WorkflowStatus::Failed, None, None);
                }
            }
        }
    }

    async fn drive(&mut self) -> WorkflowResult<()> {
        {
            let mut inst = self.instance.write().await;
            self.state_machine.begin(&mut inst)?;
            self.emit(
                &inst,
                WorkflowStatus::Submitted,
                WorkflowStatus::Running,
                None,
                None,
            );
        }

        loop {
            if *self.cancel.borrow() {
                return self.fail_cancelled().await;
            }

            // Snapshot what this iteration needs; the lock is never held
            // across a backend call.
            let (context, current, tried, decision) = {
                let inst = self.instance.read().await;
                let decision =
                    self.evaluator
                        .evaluate(&inst.context, &self.definition, inst.current_stage);
                let tried = decision
                    .sequence
                    .get(inst.current_stage)
                    .map(|name| inst.tried_for(name).to_vec())
                    .unwrap_or_default();
                (inst.context.clone(), inst.current_stage, tried, decision)
            };

            let Some(stage_name) = decision.sequence.get(current).cloned() else {
                // A routing override ended the sequence here
                let mut inst = self.instance.write().await;
                inst.complete()?;
                self.emit(
                    &inst,
                    WorkflowStatus::Running,
                    WorkflowStatus::Completed,
                    None,
                    None,
                );
                return Ok(());
            };
            let template = self
                .definition
                .get_stage(&stage_name)
                .ok_or_else(|| WorkflowError::UnknownStage(stage_name.clone()))?
                .clone();

            // Suspension point: backend invocation, cancellable
            let result = tokio::select! {
                _ = self.cancel.changed() => return self.fail_cancelled().await,
                result = self.executor.execute_resolved(
                    &template,
                    decision.role,
                    &self.adapters,
                    &tried,
                    &self.input,
                    &context,
                ) => result,
            };

            let outcome = self.apply_result(&template, result, &decision.sequence).await?;
            match outcome {
                StepOutcome::Continue => continue,
                StepOutcome::Done => return Ok(()),
            }
        }
    }

    /// Assess a stage result, apply the verdict, and follow the fallback
    /// chain until the instance either advances or terminates.
    async fn apply_result(
        &mut self,
        template: &StageTemplate,
        result: StageResult,
        sequence: &[String],
    ) -> WorkflowResult<StepOutcome> {
        let role = result.role_used;

        let (transition, tried) = {
            let mut inst = self.instance.write().await;
            let transition =
                self.state_machine
                    .apply_result(&mut inst, template, result, sequence.len())?;
            let recorded = inst
                .results
                .last()
                .ok_or_else(|| WorkflowError::InvalidTransition("empty result log".into()))?;
            self.emit(
                &inst,
                WorkflowStatus::Running,
                inst.status,
                Some(template.name.clone()),
                Some(recorded.verdict),
            );
            (transition, inst.tried_for(&template.name).to_vec())
        };

        match transition {
            Transition::Continue => Ok(StepOutcome::Continue),
            Transition::Completed => Ok(StepOutcome::Done),
            Transition::NeedsFallback(verdict) => {
                self.resolve_fallback(template, verdict, role, &tried, sequence)
                    .await
            }
        }
    }

    async fn resolve_fallback(
        &mut self,
        template: &StageTemplate,
        verdict: Verdict,
        role: BackendRole,
        tried: &[String],
        sequence: &[String],
    ) -> WorkflowResult<StepOutcome> {
        let alternate = self.adapters.has_alternate(role, tried);
        let review_available = self.review.is_some();

        let mut inst = self.instance.write().await;
        let action = self.coordinator.resolve(
            &inst,
            template,
            verdict,
            alternate,
            review_available,
            self.definition.max_escalation_depth,
        );
        tracing::debug!(
            instance_id = %inst.id,
            stage = %template.name,
            verdict = %verdict,
            action = ?action,
            "Fallback resolved"
        );

        match self
            .state_machine
            .apply_fallback(&mut inst, &action, self.definition.max_escalation_depth)?
        {
            FallbackStep::RerunStage => Ok(StepOutcome::Continue),
            FallbackStep::Terminated => {
                self.emit(&inst, WorkflowStatus::Running, WorkflowStatus::Failed, Some(template.name.clone()), Some(verdict));
                Ok(StepOutcome::Done)
            }
            FallbackStep::AwaitReview => {
                self.emit(
                    &inst,
                    WorkflowStatus::Running,
                    WorkflowStatus::AwaitingHumanReview,
                    Some(template.name.clone()),
                    Some(verdict),
                );
                drop(inst);
                self.run_review(template, sequence).await
            }
        }
    }

    /// The human-review wait: the second suspension point.
    async fn run_review(
        &mut self,
        template: &StageTemplate,
        sequence: &[String],
    ) -> WorkflowResult<StepOutcome> {
        let Some(review) = self.review.clone() else {
            return self
                .fail_review(template, FailureReason::ReviewUnavailable)
                .await;
        };

        let (escalated, context) = {
            let inst = self.instance.read().await;
            let escalated = inst
                .results
                .last()
                .cloned()
                .ok_or_else(|| WorkflowError::InvalidTransition("review without result".into()))?;
            (escalated, inst.context.clone())
        };

        let token = match review.request_review(&escalated, &context).await {
            Ok(token) => token,
            Err(err) => {
                tracing::warn!(error = %err, "Review request failed");
                return self
                    .fail_review(template, FailureReason::ReviewUnavailable)
                    .await;
            }
        };

        let deadline = self
            .definition
            .review_deadline_ms
            .or(self.config.review_deadline_ms)
            .map(Duration::from_millis);

        // The deadline is enforced here, not trusted to the reviewer
        let decision = match deadline {
            Some(limit) => tokio::select! {
                _ = self.cancel.changed() => {
                    self.fail_cancelled().await?;
                    return Ok(StepOutcome::Done);
                }
                outcome = tokio::time::timeout(limit, review.await_decision(token, deadline)) => {
                    match outcome {
                        Ok(decision) => decision,
                        Err(_) => {
                            return self
                                .fail_review(template, FailureReason::ReviewTimeout)
                                .await
                        }
                    }
                }
            },
            None => tokio::select! {
                _ = self.cancel.changed() => {
                    self.fail_cancelled().await?;
                    return Ok(StepOutcome::Done);
                }
                decision = review.await_decision(token, None) => decision,
            },
        };

        match decision {
            Ok(ReviewDecision {
                approved: true,
                revised_payload,
            }) => {
                let result = StageResult {
                    stage_name: template.name.clone(),
                    role_used: escalated.role_used,
                    backend_id: REVIEW_BACKEND_ID.to_string(),
                    payload: revised_payload.unwrap_or(escalated.payload),
                    confidence: 1.0,
                    latency_ms: 0,
                    verdict: Verdict::Pass,
                    attempts: 1,
                    executed_at: Utc::now(),
                };

                let mut inst = self.instance.write().await;
                let transition = self.state_machine.apply_review_approval(
                    &mut inst,
                    result,
                    sequence.len(),
                )?;
                // The approval resumes the instance first; completion, when
                // it follows, is its own transition and its own event.
                self.emit(
                    &inst,
                    WorkflowStatus::AwaitingHumanReview,
                    WorkflowStatus::Running,
                    Some(template.name.clone()),
                    Some(Verdict::Pass),
                );
                match transition {
                    Transition::Completed => {
                        self.emit(
                            &inst,
                            WorkflowStatus::Running,
                            WorkflowStatus::Completed,
                            None,
                            None,
                        );
                        Ok(StepOutcome::Done)
                    }
                    _ => Ok(StepOutcome::Continue),
                }
            }
            Ok(ReviewDecision { approved: false, .. }) => {
                self.fail_review(template, FailureReason::ReviewRejected)
                    .await
            }
            Err(err) => {
                tracing::warn!(error = %err, "Review decision unavailable");
                self.fail_review(template, FailureReason::ReviewTimeout)
                    .await
            }
        }
    }

    // ── Terminal helpers ─────────────────────────────────────────────

    async fn fail_cancelled(&self) -> WorkflowResult<()> {
        let mut inst = self.instance.write().await;
        if inst.is_terminal() {
            return Ok(());
        }
        let from = inst.status;
        inst.fail(FailureReason::Cancelled)?;
        self.emit(&inst, from, WorkflowStatus::Failed, None, None);
        tracing::info!(instance_id = %inst.id, "Workflow cancelled");
        Ok(())
    }

    async fn fail_review(
        &self,
        template: &StageTemplate,
        reason: FailureReason,
    ) -> WorkflowResult<StepOutcome> {
        let mut inst = self.instance.write().await;
        let from = inst.status;
        inst.fail(reason)?;
        self.emit(
            &inst,
            from,
            WorkflowStatus::Failed,
            Some(template.name.clone()),
            None,
        );
        Ok(StepOutcome::Done)
    }

    fn emit(
        &self,
        inst: &WorkflowInstance,
        from: WorkflowStatus,
        to: WorkflowStatus,
        stage: Option<String>,
        verdict: Option<Verdict>,
    ) {
        let mut event = WorkflowEvent::transition(inst.id.clone(), from, to);
        event.stage_name = stage;
        event.verdict = verdict;
        self.events.emit(event);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StepOutcome {
    Continue,
    Done,
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_types::{BackendRole, StageTemplate};

    fn orchestrator() -> WorkflowOrchestrator {
        WorkflowOrchestrator::new(Arc::new(AdapterRegistry::new()))
    }

    #[test]
    fn test_register_validates() {
        let orch = orchestrator();
        let bad = WorkflowDefinition::new("Empty");
        assert!(matches!(
            orch.register_definition(bad),
            Err(WorkflowError::Configuration(_))
        ));
        assert_eq!(orch.definition_count(), 0);

        let good = WorkflowDefinition::new("Ok")
            .with_stage(StageTemplate::new("a", BackendRole::Reasoning));
        orch.register_definition(good).unwrap();
        assert_eq!(orch.definition_count(), 1);
    }

    #[tokio::test]
    async fn test_submit_unknown_definition() {
        let orch = orchestrator();
        let result = orch.submit(
            &WorkflowDefinitionId::new("missing"),
            serde_json::json!({}),
            WorkflowContext::default(),
        );
        assert!(matches!(result, Err(WorkflowError::DefinitionNotFound(_))));
    }

    #[tokio::test]
    async fn test_status_of_unknown_instance() {
        let orch = orchestrator();
        let result = orch.get_status(&WorkflowInstanceId::new("missing")).await;
        assert!(matches!(result, Err(WorkflowError::InstanceNotFound(_))));
    }

    struct DenyAll;

    impl SubmissionGuard for DenyAll {
        fn check(
            &self,
            _definition: &WorkflowDefinition,
            _input: &serde_json::Value,
        ) -> WorkflowResult<()> {
            Err(WorkflowError::SubmissionRejected("denied by policy".into()))
        }
    }

    #[test]
    fn test_slot_guard_releases_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let _a = SlotGuard::acquire(&counter);
            let _b = SlotGuard::acquire(&counter);
            assert_eq!(counter.load(Ordering::SeqCst), 2);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_slot_cap_check_and_increment_are_one_operation() {
        let counter = Arc::new(AtomicUsize::new(0));
        let a = SlotGuard::try_acquire(&counter, 2).unwrap();
        let _b = SlotGuard::try_acquire(&counter, 2).unwrap();

        // At the cap: no slot, and the counter is untouched
        assert!(SlotGuard::try_acquire(&counter, 2).is_none());
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        drop(a);
        assert!(SlotGuard::try_acquire(&counter, 2).is_some());
    }

    #[test]
    fn test_slot_cap_holds_under_contention() {
        let counter = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let counter = Arc::clone(&counter);
                std::thread::spawn(move || SlotGuard::try_acquire(&counter, 4))
            })
            .collect();

        let guards: Vec<_> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(guards.len(), 4);
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_guard_rejects_submission() {
        let orch = orchestrator().with_guard(Arc::new(DenyAll));
        let def_id = orch
            .register_definition(
                WorkflowDefinition::new("Guarded")
                    .with_stage(StageTemplate::new("a", BackendRole::Reasoning)),
            )
            .unwrap();

        let result = orch.submit(&def_id, serde_json::json!({}), WorkflowContext::default());
        assert!(matches!(result, Err(WorkflowError::SubmissionRejected(_))));
        assert_eq!(orch.instance_count(), 0);
    }
}
