//! Decision engine for Conductor workflows
//!
//! Everything in this crate is synchronous, deterministic, and
//! side-effect-free: it decides, it never acts. The runtime's orchestrator
//! calls these components and carries out their decisions. The split exists
//! so routing, quality gates, and fallback policy can be unit-tested and
//! replayed without a scheduler, a backend, or a clock.
//!
//! # Components
//!
//! - [`ConditionEvaluator`] — maps workflow context to a routing decision;
//!   rules are evaluated in declaration order, first match wins
//! - [`QualityAssessor`] — scores a stage result against its threshold
//! - [`FallbackCoordinator`] — picks the next move after a non-pass verdict:
//!   alternate backend, human review, or terminal failure, in that order
//! - [`StateMachine`] — applies verdicts to an instance: advance, complete,
//!   or hand off to fallback, with the escalation-depth bound enforced
//! - [`DefinitionRegistry`] — stores validated workflow definitions; bad
//!   configuration is rejected here, never at execution time

#![deny(unsafe_code)]

pub mod condition_evaluator;
pub mod definition_registry;
pub mod fallback;
pub mod quality_assessor;
pub mod state_machine;

pub use condition_evaluator::ConditionEvaluator;
pub use definition_registry::DefinitionRegistry;
pub use fallback::{FallbackAction, FallbackCoordinator};
pub use quality_assessor::QualityAssessor;
pub use state_machine::{FallbackStep, StateMachine, Transition};
