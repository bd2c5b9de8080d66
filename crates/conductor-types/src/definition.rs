//! Workflow definitions: immutable templates for stage sequences
//!
//! A WorkflowDefinition is an ordered list of stage templates plus routing
//! rules. Definitions are validated at registration and never mutated —
//! concurrently running instances share them read-only. To modify one,
//! register a new version.

use crate::{RoutingRule, WorkflowError, WorkflowResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ── Identifiers ──────────────────────────────────────────────────────

/// Unique identifier for a workflow definition
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowDefinitionId(pub String);

impl WorkflowDefinitionId {
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

impl std::fmt::Display for WorkflowDefinitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Backend Roles ────────────────────────────────────────────────────

/// An abstract backend capability category.
///
/// Stages request a role, never a concrete backend. Any adapter declaring
/// the role is eligible to serve the stage, which keeps backend identities
/// out of control flow entirely.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendRole {
    /// Content classification (type, topic, sensitivity)
    Classification,
    /// Structured data extraction
    Extraction,
    /// Multi-step reasoning and analysis
    Reasoning,
    /// Language generation (summaries, reports)
    Generation,
    /// Image and document vision
    Vision,
    /// Output review and critique
    Review,
}

impl std::fmt::Display for BackendRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Classification => "classification",
            Self::Extraction => "extraction",
            Self::Reasoning => "reasoning",
            Self::Generation => "generation",
            Self::Vision => "vision",
            Self::Review => "review",
        };
        write!(f, "{}", s)
    }
}

// ── Retry Policy ─────────────────────────────────────────────────────

/// Per-stage retry behavior for backend invocation failures
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum invocation attempts (including the first)
    pub max_attempts: u32,
    /// Base backoff delay in milliseconds
    pub base_delay_ms: u64,
    /// Cap on the backoff delay in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Backoff delay before the given retry: base × 2^attempt, capped.
    ///
    /// `attempt` is zero-based (0 = delay before the first retry).
    pub fn backoff_delay_ms(&self, attempt: u32) -> u64 {
        let factor = 2u64.saturating_pow(attempt);
        self.base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms)
    }
}

// ── Stage Template ───────────────────────────────────────────────────

/// A single processing stage within a workflow definition
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StageTemplate {
    /// Stage name, unique within a definition
    pub name: String,
    /// Backend roles admissible for this stage, in preference order
    pub roles: Vec<BackendRole>,
    /// Confidence threshold for the automatic quality gate (0.0–1.0)
    pub threshold: f64,
    /// Threshold applied at the human-review gate, if different
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_threshold: Option<f64>,
    /// Retry policy for backend invocation failures
    pub retry: RetryPolicy,
    /// Per-attempt invocation timeout in milliseconds
    pub timeout_ms: u64,
    /// High-stakes stages route straight to human review on failure
    pub high_stakes: bool,
    /// Fan out to all eligible backends and fold into one logical result
    pub parallel: bool,
}

impl StageTemplate {
    pub fn new(name: impl Into<String>, role: BackendRole) -> Self {
        Self {
            name: name.into(),
            roles: vec![role],
            threshold: 0.8,
            review_threshold: None,
            retry: RetryPolicy::default(),
            timeout_ms: 30_000,
            high_stakes: false,
            parallel: false,
        }
    }

    pub fn with_role(mut self, role: BackendRole) -> Self {
        self.roles.push(role);
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_review_threshold(mut self, threshold: f64) -> Self {
        self.review_threshold = Some(threshold);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn high_stakes(mut self) -> Self {
        self.high_stakes = true;
        self
    }

    pub fn parallel(mut self) -> Self {
        self.parallel = true;
        self
    }

    /// The preferred role for this stage: the first admissible one, or
    /// `Reasoning` for a template whose role list is empty (`validate()`
    /// rejects such templates at registration).
    pub fn preferred_role(&self) -> BackendRole {
        self.roles.first().copied().unwrap_or(BackendRole::Reasoning)
    }

    /// Check whether a role is admissible for this stage
    pub fn admits(&self, role: BackendRole) -> bool {
        self.roles.contains(&role)
    }

    /// The threshold applied at the human-review gate
    pub fn review_gate_threshold(&self) -> f64 {
        self.review_threshold.unwrap_or(self.threshold)
    }
}

// ── Workflow Definition ──────────────────────────────────────────────

/// An immutable workflow template: ordered stages plus routing rules
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Unique identifier
    pub id: WorkflowDefinitionId,
    /// Human-readable name
    pub name: String,
    /// The ordered stage templates (the default sequence)
    pub stages: Vec<StageTemplate>,
    /// Routing rules, evaluated in declaration order; first match wins
    pub rules: Vec<RoutingRule>,
    /// Maximum fallback escalations before terminal failure
    pub max_escalation_depth: u32,
    /// Deadline for a human-review wait; unbounded when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_deadline_ms: Option<u64>,
    /// When this definition was created
    pub created_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: WorkflowDefinitionId::generate(),
            name: name.into(),
            stages: Vec::new(),
            rules: Vec::new(),
            max_escalation_depth: 2,
            review_deadline_ms: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_stage(mut self, stage: StageTemplate) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn with_rule(mut self, rule: RoutingRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_max_escalation_depth(mut self, depth: u32) -> Self {
        self.max_escalation_depth = depth;
        self
    }

    pub fn with_review_deadline_ms(mut self, deadline_ms: u64) -> Self {
        self.review_deadline_ms = Some(deadline_ms);
        self
    }

    /// Get a stage template by name
    pub fn get_stage(&self, name: &str) -> Option<&StageTemplate> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// The default stage sequence, in declaration order
    pub fn default_sequence(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.name.clone()).collect()
    }

    /// Validate the definition.
    ///
    /// This is the fail-fast gate: a rule referencing an unknown stage or an
    /// inadmissible role is rejected here, at registration time, and can
    /// never surface during execution.
    pub fn validate(&self) -> WorkflowResult<()> {
        if self.stages.is_empty() {
            return Err(WorkflowError::Configuration(
                "workflow must declare at least one stage".into(),
            ));
        }

        let mut seen = HashSet::new();
        for stage in &self.stages {
            if !seen.insert(stage.name.as_str()) {
                return Err(WorkflowError::Configuration(format!(
                    "duplicate stage name '{}'",
                    stage.name
                )));
            }
            if stage.roles.is_empty() {
                return Err(WorkflowError::Configuration(format!(
                    "stage '{}' declares no admissible backend roles",
                    stage.name
                )));
            }
            if !(0.0..=1.0).contains(&stage.threshold) {
                return Err(WorkflowError::Configuration(format!(
                    "stage '{}' threshold {} outside [0.0, 1.0]",
                    stage.name, stage.threshold
                )));
            }
            if let Some(rt) = stage.review_threshold {
                if !(0.0..=1.0).contains(&rt) {
                    return Err(WorkflowError::Configuration(format!(
                        "stage '{}' review threshold {} outside [0.0, 1.0]",
                        stage.name, rt
                    )));
                }
            }
            if stage.retry.max_attempts == 0 {
                return Err(WorkflowError::Configuration(format!(
                    "stage '{}' retry policy allows zero attempts",
                    stage.name
                )));
            }
            if stage.timeout_ms == 0 {
                return Err(WorkflowError::Configuration(format!(
                    "stage '{}' timeout must be positive",
                    stage.name
                )));
            }
        }

        for (idx, rule) in self.rules.iter().enumerate() {
            if let Some(sequence) = &rule.sequence {
                for name in sequence {
                    if self.get_stage(name).is_none() {
                        return Err(WorkflowError::Configuration(format!(
                            "routing rule #{} references unknown stage '{}'",
                            idx, name
                        )));
                    }
                }
            }
            if let Some(role) = rule.role {
                // The role constraint applies to the stage a rule fires on;
                // it must be admissible for some declared stage.
                if !self.stages.iter().any(|s| s.admits(role)) {
                    return Err(WorkflowError::Configuration(format!(
                        "routing rule #{} constrains to role '{}' admitted by no stage",
                        idx, role
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RoutingCondition, RoutingRule};

    fn two_stage_definition() -> WorkflowDefinition {
        WorkflowDefinition::new("Document Pipeline")
            .with_stage(StageTemplate::new("classify", BackendRole::Classification))
            .with_stage(StageTemplate::new("summarize", BackendRole::Generation))
    }

    #[test]
    fn test_valid_definition() {
        let def = two_stage_definition();
        assert!(def.validate().is_ok());
        assert_eq!(def.default_sequence(), vec!["classify", "summarize"]);
    }

    #[test]
    fn test_empty_definition_rejected() {
        let def = WorkflowDefinition::new("Empty");
        assert!(matches!(
            def.validate(),
            Err(WorkflowError::Configuration(_))
        ));
    }

    #[test]
    fn test_duplicate_stage_rejected() {
        let def = WorkflowDefinition::new("Dup")
            .with_stage(StageTemplate::new("a", BackendRole::Reasoning))
            .with_stage(StageTemplate::new("a", BackendRole::Generation));
        assert!(def.validate().is_err());
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let def = WorkflowDefinition::new("Bad").with_stage(
            StageTemplate::new("a", BackendRole::Reasoning).with_threshold(1.5),
        );
        assert!(def.validate().is_err());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let def = WorkflowDefinition::new("Bad").with_stage(
            StageTemplate::new("a", BackendRole::Reasoning).with_retry(RetryPolicy {
                max_attempts: 0,
                ..RetryPolicy::default()
            }),
        );
        assert!(def.validate().is_err());
    }

    #[test]
    fn test_rule_unknown_stage_rejected() {
        let def = two_stage_definition().with_rule(RoutingRule::new(
            RoutingCondition::default(),
            Some(vec!["classify".into(), "missing".into()]),
            None,
        ));
        let err = def.validate().unwrap_err();
        assert!(matches!(err, WorkflowError::Configuration(_)));
    }

    #[test]
    fn test_rule_inadmissible_role_rejected() {
        let def = two_stage_definition().with_rule(RoutingRule::new(
            RoutingCondition::default(),
            None,
            Some(BackendRole::Vision),
        ));
        assert!(def.validate().is_err());
    }

    #[test]
    fn test_backoff_delay_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        };
        assert_eq!(policy.backoff_delay_ms(0), 100);
        assert_eq!(policy.backoff_delay_ms(1), 200);
        assert_eq!(policy.backoff_delay_ms(2), 400);
        // 100 × 2^4 = 1600, capped
        assert_eq!(policy.backoff_delay_ms(4), 1_000);
        // Huge attempt counts never overflow
        assert_eq!(policy.backoff_delay_ms(64), 1_000);
    }

    #[test]
    fn test_stage_template_builders() {
        let stage = StageTemplate::new("assess", BackendRole::Reasoning)
            .with_role(BackendRole::Review)
            .with_threshold(0.9)
            .with_review_threshold(0.95)
            .with_timeout_ms(10_000)
            .high_stakes();

        assert_eq!(stage.preferred_role(), BackendRole::Reasoning);
        assert!(stage.admits(BackendRole::Review));
        assert!(!stage.admits(BackendRole::Vision));
        assert_eq!(stage.review_gate_threshold(), 0.95);
        assert!(stage.high_stakes);
    }

    #[test]
    fn test_preferred_role_on_empty_role_list() {
        let mut stage = StageTemplate::new("assess", BackendRole::Vision);
        stage.roles.clear();
        assert_eq!(stage.preferred_role(), BackendRole::Reasoning);
    }

    #[test]
    fn test_definition_id() {
        let id = WorkflowDefinitionId::generate();
        assert!(!id.0.is_empty());
        assert!(id.short().len() <= 8);

        let named = WorkflowDefinitionId::new("def-1");
        assert_eq!(format!("{}", named), "def-1");
    }
}
