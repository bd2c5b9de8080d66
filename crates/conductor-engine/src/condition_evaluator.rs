//! Condition evaluator: maps workflow context to a routing decision
//!
//! Pure and deterministic — the same context and definition always produce
//! the same decision, which is what makes replay during testing and
//! post-incident analysis possible. Rules are walked in declaration order
//! and the first matching rule wins; when none matches, the definition's
//! default stage sequence applies.

use conductor_types::{BackendRole, RoutingDecision, WorkflowContext, WorkflowDefinition};

/// Evaluates routing rules against accumulated workflow context
#[derive(Clone, Debug, Default)]
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Produce the routing decision for the given stage position.
    ///
    /// The returned sequence is the full concrete stage sequence the
    /// instance should be executing; the caller indexes it with the
    /// instance's `current_stage`. The role constrains the current stage
    /// only, and a rule's role constraint is honored only when the current
    /// stage template actually admits that role.
    ///
    /// Definitions are validated at registration, so an unknown stage or
    /// role reference cannot reach this point.
    pub fn evaluate(
        &self,
        context: &WorkflowContext,
        definition: &WorkflowDefinition,
        current_stage: usize,
    ) -> RoutingDecision {
        let matched = definition.rules.iter().find(|r| r.condition.matches(context));

        let sequence = matched
            .and_then(|r| r.sequence.clone())
            .unwrap_or_else(|| definition.default_sequence());

        let role = self.role_for(definition, &sequence, current_stage, matched.and_then(|r| r.role));

        RoutingDecision { sequence, role }
    }

    fn role_for(
        &self,
        definition: &WorkflowDefinition,
        sequence: &[String],
        current_stage: usize,
        constraint: Option<BackendRole>,
    ) -> BackendRole {
        let template = sequence
            .get(current_stage)
            .and_then(|name| definition.get_stage(name));

        match template {
            Some(t) => match constraint {
                Some(role) if t.admits(role) => role,
                _ => t.preferred_role(),
            },
            // Past the end of the sequence; the caller completes the
            // instance before executing anything, so the role is moot.
            None => constraint.unwrap_or(BackendRole::Reasoning),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_types::{
        Complexity, ContentType, RoutingCondition, RoutingRule, StageTemplate, Urgency,
    };
    use proptest::prelude::*;

    fn definition() -> WorkflowDefinition {
        WorkflowDefinition::new("Pipeline")
            .with_stage(StageTemplate::new("classify", BackendRole::Classification))
            .with_stage(
                StageTemplate::new("analyze", BackendRole::Reasoning)
                    .with_role(BackendRole::Review),
            )
            .with_stage(StageTemplate::new("summarize", BackendRole::Generation))
    }

    fn ctx(urgency: Urgency) -> WorkflowContext {
        WorkflowContext::new(ContentType::Document, urgency, Complexity::Moderate)
    }

    #[test]
    fn test_no_rules_yields_default_sequence() {
        let def = definition();
        let decision = ConditionEvaluator::new().evaluate(&ctx(Urgency::Normal), &def, 0);

        assert_eq!(decision.sequence, vec!["classify", "analyze", "summarize"]);
        assert_eq!(decision.role, BackendRole::Classification);
    }

    #[test]
    fn test_no_matching_rule_yields_default_sequence() {
        let def = definition().with_rule(RoutingRule::new(
            RoutingCondition::content_type(ContentType::Dataset),
            Some(vec!["analyze".into()]),
            None,
        ));
        let decision = ConditionEvaluator::new().evaluate(&ctx(Urgency::Normal), &def, 0);
        assert_eq!(decision.sequence, def.default_sequence());
    }

    #[test]
    fn test_first_matching_rule_wins() {
        // Both rules match; declaration order breaks the tie.
        let def = definition()
            .with_rule(RoutingRule::new(
                RoutingCondition::default().min_urgency(Urgency::High),
                Some(vec!["classify".into(), "summarize".into()]),
                None,
            ))
            .with_rule(RoutingRule::new(
                RoutingCondition::default(),
                Some(vec!["analyze".into()]),
                None,
            ));

        let decision = ConditionEvaluator::new().evaluate(&ctx(Urgency::High), &def, 0);
        assert_eq!(decision.sequence, vec!["classify", "summarize"]);
    }

    #[test]
    fn test_rule_order_determinism() {
        let def = definition()
            .with_rule(RoutingRule::new(
                RoutingCondition::default(),
                Some(vec!["classify".into()]),
                None,
            ))
            .with_rule(RoutingRule::new(
                RoutingCondition::default(),
                Some(vec!["summarize".into()]),
                None,
            ));

        let evaluator = ConditionEvaluator::new();
        let context = ctx(Urgency::Normal);
        let first = evaluator.evaluate(&context, &def, 0);
        for _ in 0..1_000 {
            assert_eq!(evaluator.evaluate(&context, &def, 0), first);
        }
    }

    #[test]
    fn test_role_constraint_honored_when_admissible() {
        let def = definition().with_rule(RoutingRule::new(
            RoutingCondition::default(),
            None,
            Some(BackendRole::Review),
        ));

        // Stage 1 ("analyze") admits Review
        let decision = ConditionEvaluator::new().evaluate(&ctx(Urgency::Normal), &def, 1);
        assert_eq!(decision.role, BackendRole::Review);

        // Stage 0 ("classify") does not; preferred role applies
        let decision = ConditionEvaluator::new().evaluate(&ctx(Urgency::Normal), &def, 0);
        assert_eq!(decision.role, BackendRole::Classification);
    }

    #[test]
    fn test_rule_can_react_to_prior_stage_output() {
        let def = definition().with_rule(
            RoutingRule::new(
                RoutingCondition::default().requiring("category", "legal"),
                Some(vec!["classify".into(), "analyze".into()]),
                None,
            )
            .with_description("legal content needs the reasoning pass"),
        );

        let mut context = ctx(Urgency::Normal);
        let before = ConditionEvaluator::new().evaluate(&context, &def, 0);
        assert_eq!(before.sequence, def.default_sequence());

        context.append("classify", "category", "legal").unwrap();
        let after = ConditionEvaluator::new().evaluate(&context, &def, 1);
        assert_eq!(after.sequence, vec!["classify", "analyze"]);
    }

    proptest! {
        // Whatever the classification axes, an empty rule list always
        // yields the default sequence.
        #[test]
        fn prop_default_sequence_without_rules(urgency_idx in 0usize..4, complexity_idx in 0usize..3) {
            let urgency = [Urgency::Low, Urgency::Normal, Urgency::High, Urgency::Critical][urgency_idx];
            let complexity = [Complexity::Simple, Complexity::Moderate, Complexity::Complex][complexity_idx];
            let context = WorkflowContext::new(ContentType::Task, urgency, complexity);

            let def = definition();
            let decision = ConditionEvaluator::new().evaluate(&context, &def, 0);
            prop_assert_eq!(decision.sequence, def.default_sequence());
        }
    }
}
