//! Conductor runtime: the acting half of the workflow engine
//!
//! The decision logic lives in `conductor-engine`; this crate carries it
//! out. It owns the backend adapter contract and registry, the stage
//! executor (timeouts, retries, backoff, parallel fan-out), the human
//! review interface, event sinks, and the orchestrator that drives one
//! tokio task per workflow instance.
//!
//! # Concurrency model
//!
//! Each instance runs on its own task; many instances execute
//! concurrently, but within one instance execution is strictly sequential
//! (except stages explicitly declared parallel, which fan out inside the
//! executor and rejoin before assessment). Suspension points are exactly
//! the backend invocation and the human-review wait. Cancellation is
//! observed at those points and transitions the instance straight to
//! `Failed(Cancelled)`, dropping any in-flight backend call — the adapter
//! contract requires cancellation to be safe at any time.

#![deny(unsafe_code)]

pub mod adapter;
pub mod config;
pub mod events;
pub mod executor;
pub mod guard;
pub mod orchestrator;
pub mod registry;
pub mod review;

pub use adapter::{BackendAdapter, BackendResponse, StageRequest};
pub use config::RuntimeConfig;
pub use events::{MemoryEventSink, NullEventSink, TracingEventSink};
pub use executor::StageExecutor;
pub use guard::SubmissionGuard;
pub use orchestrator::WorkflowOrchestrator;
pub use registry::AdapterRegistry;
pub use review::{HumanReview, ReviewDecision, ReviewToken};
