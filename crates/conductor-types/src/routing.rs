//! Routing: classification axes, rules, and decisions
//!
//! Routing rules are an ordered list of explicit condition→decision records.
//! The condition evaluator walks them in declaration order and the first
//! matching rule wins — rule order is a documented, testable contract, not
//! an accident of map iteration.

use crate::{BackendRole, WorkflowError, WorkflowResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ── Classification Axes ──────────────────────────────────────────────

/// What kind of work unit is flowing through the workflow
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentType {
    Document,
    Dataset,
    Task,
}

/// How urgently the work needs to complete
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum Urgency {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// How demanding the work is expected to be
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum Complexity {
    Simple,
    #[default]
    Moderate,
    Complex,
}

// ── Workflow Context ─────────────────────────────────────────────────

/// The accumulated context a workflow instance carries between stages.
///
/// Classification axes are fixed at submission. `values` collects stage
/// outputs visible to later stages and to the condition evaluator, and is
/// append-only per key: a later stage may read but never overwrite an
/// earlier stage's contribution.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowContext {
    pub content_type: ContentType,
    pub urgency: Urgency,
    pub complexity: Complexity,
    values: HashMap<String, String>,
    /// Which stage contributed each key (for conflict diagnostics)
    contributors: HashMap<String, String>,
}

impl WorkflowContext {
    pub fn new(content_type: ContentType, urgency: Urgency, complexity: Complexity) -> Self {
        Self {
            content_type,
            urgency,
            complexity,
            values: HashMap::new(),
            contributors: HashMap::new(),
        }
    }

    /// Append a stage's contribution. Overwriting an existing key is an
    /// error — silent cross-stage data corruption is not permitted.
    pub fn append(
        &mut self,
        stage: &str,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> WorkflowResult<()> {
        let key = key.into();
        if let Some(owner) = self.contributors.get(&key) {
            return Err(WorkflowError::ContextKeyConflict {
                key,
                stage: owner.clone(),
            });
        }
        self.contributors.insert(key.clone(), stage.to_string());
        self.values.insert(key, value.into());
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Default for WorkflowContext {
    fn default() -> Self {
        Self::new(ContentType::Document, Urgency::default(), Complexity::default())
    }
}

// ── Routing Rules ────────────────────────────────────────────────────

/// The condition half of a routing rule. All present clauses must hold.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RoutingCondition {
    /// Match a specific content type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<ContentType>,
    /// Match urgency at or above this level
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_urgency: Option<Urgency>,
    /// Match complexity at or above this level
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_complexity: Option<Complexity>,
    /// Required key=value pairs among prior stage outputs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<(String, String)>,
}

impl RoutingCondition {
    pub fn content_type(content_type: ContentType) -> Self {
        Self {
            content_type: Some(content_type),
            ..Self::default()
        }
    }

    pub fn min_urgency(mut self, urgency: Urgency) -> Self {
        self.min_urgency = Some(urgency);
        self
    }

    pub fn min_complexity(mut self, complexity: Complexity) -> Self {
        self.min_complexity = Some(complexity);
        self
    }

    pub fn requiring(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.requires.push((key.into(), value.into()));
        self
    }

    /// Check this condition against an instance's context
    pub fn matches(&self, ctx: &WorkflowContext) -> bool {
        if let Some(ct) = self.content_type {
            if ctx.content_type != ct {
                return false;
            }
        }
        if let Some(min) = self.min_urgency {
            if ctx.urgency < min {
                return false;
            }
        }
        if let Some(min) = self.min_complexity {
            if ctx.complexity < min {
                return false;
            }
        }
        self.requires
            .iter()
            .all(|(k, v)| ctx.get(k) == Some(v.as_str()))
    }
}

/// One condition→decision record in a definition's ordered rule list
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoutingRule {
    /// When this rule applies
    pub condition: RoutingCondition,
    /// Stage-sequence override (replaces the remaining default sequence)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<Vec<String>>,
    /// Backend-role constraint for the current stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<BackendRole>,
    /// Why this rule exists
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl RoutingRule {
    pub fn new(
        condition: RoutingCondition,
        sequence: Option<Vec<String>>,
        role: Option<BackendRole>,
    ) -> Self {
        Self {
            condition,
            sequence,
            role,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }
}

// ── Routing Decision ─────────────────────────────────────────────────

/// The ephemeral per-stage answer from the condition evaluator: which stage
/// sequence executes next and which backend role serves the current stage.
/// Not persisted beyond the decision point; the resulting StageResult
/// records the role that was actually used.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutingDecision {
    /// The concrete stage sequence to execute, starting at the current stage
    pub sequence: Vec<String>,
    /// The backend role serving the current stage
    pub role: BackendRole,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> WorkflowContext {
        WorkflowContext::new(ContentType::Document, Urgency::High, Complexity::Moderate)
    }

    #[test]
    fn test_empty_condition_matches_everything() {
        assert!(RoutingCondition::default().matches(&ctx()));
    }

    #[test]
    fn test_content_type_clause() {
        assert!(RoutingCondition::content_type(ContentType::Document).matches(&ctx()));
        assert!(!RoutingCondition::content_type(ContentType::Dataset).matches(&ctx()));
    }

    #[test]
    fn test_min_urgency_is_at_or_above() {
        let cond = RoutingCondition::default().min_urgency(Urgency::High);
        assert!(cond.matches(&ctx()));

        let cond = RoutingCondition::default().min_urgency(Urgency::Critical);
        assert!(!cond.matches(&ctx()));
    }

    #[test]
    fn test_min_complexity_is_at_or_above() {
        let cond = RoutingCondition::default().min_complexity(Complexity::Simple);
        assert!(cond.matches(&ctx()));

        let cond = RoutingCondition::default().min_complexity(Complexity::Complex);
        assert!(!cond.matches(&ctx()));
    }

    #[test]
    fn test_requires_clause_reads_context_values() {
        let mut c = ctx();
        c.append("classify", "category", "legal").unwrap();

        let cond = RoutingCondition::default().requiring("category", "legal");
        assert!(cond.matches(&c));

        let cond = RoutingCondition::default().requiring("category", "marketing");
        assert!(!cond.matches(&c));

        let cond = RoutingCondition::default().requiring("missing", "x");
        assert!(!cond.matches(&c));
    }

    #[test]
    fn test_all_clauses_must_hold() {
        let cond = RoutingCondition::content_type(ContentType::Document)
            .min_urgency(Urgency::Critical);
        assert!(!cond.matches(&ctx()));
    }

    #[test]
    fn test_context_append_only_per_key() {
        let mut c = ctx();
        c.append("classify", "category", "legal").unwrap();

        let err = c.append("summarize", "category", "business").unwrap_err();
        match err {
            WorkflowError::ContextKeyConflict { key, stage } => {
                assert_eq!(key, "category");
                assert_eq!(stage, "classify");
            }
            other => panic!("unexpected error: {other}"),
        }

        // Original value untouched
        assert_eq!(c.get("category"), Some("legal"));
    }

    #[test]
    fn test_urgency_ordering() {
        assert!(Urgency::Low < Urgency::Normal);
        assert!(Urgency::Normal < Urgency::High);
        assert!(Urgency::High < Urgency::Critical);
    }
}
