//! Domain types for the Conductor workflow engine
//!
//! Conductor routes a unit of work (a document, dataset, or task) through an
//! ordered sequence of processing stages. Each stage is delegated to one of
//! several interchangeable backend adapters, and every stage output passes a
//! quality gate before the workflow advances.
//!
//! # Key Concepts
//!
//! - **WorkflowDefinition**: An immutable template — ordered stage templates
//!   plus routing rules. Registered once, shared read-only across instances.
//! - **WorkflowInstance**: A running execution of a definition. Owned
//!   exclusively by the task driving it; never mutated concurrently.
//! - **StageResult**: One executed attempt at a stage. Appended to the
//!   instance's result log, never edited — the log is the audit trail.
//! - **RoutingDecision**: The ephemeral answer to "which stages next, which
//!   backend role now", produced per stage by the condition evaluator.
//! - **Verdict**: The quality assessor's classification of a stage result
//!   (Pass / Escalate / Fail), which drives the next transition.
//!
//! # Design Principles
//!
//! 1. Definitions are immutable once validated; bad configuration fails at
//!    registration, never at run time.
//! 2. The result log is append-only and totally ordered per instance.
//! 3. Escalation is bounded — depth never exceeds the configured maximum,
//!    so a failing stage can never retry forever.
//! 4. Backends are capability roles, not named endpoints: control flow never
//!    hardcodes a concrete backend identity.

#![deny(unsafe_code)]

mod definition;
mod errors;
mod event;
mod instance;
mod routing;

pub use definition::*;
pub use errors::*;
pub use event::*;
pub use instance::*;
pub use routing::*;
