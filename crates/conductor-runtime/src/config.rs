//! Runtime configuration
//!
//! Typed and injected at construction; the orchestrator never reaches for
//! globals or environment lookups. Per-stage settings in a workflow
//! definition always win over these values.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Human-review deadline applied when a definition sets none; `None`
    /// waits indefinitely
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_deadline_ms: Option<u64>,
    /// Concurrency cap: submissions beyond this many non-terminal
    /// instances are rejected. `None` is unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_live_instances: Option<usize>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            review_deadline_ms: None,
            max_live_instances: None,
        }
    }
}

impl RuntimeConfig {
    pub fn with_review_deadline_ms(mut self, deadline_ms: u64) -> Self {
        self.review_deadline_ms = Some(deadline_ms);
        self
    }

    pub fn with_max_live_instances(mut self, max: usize) -> Self {
        self.max_live_instances = Some(max);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_unbounded() {
        let config = RuntimeConfig::default();
        assert!(config.review_deadline_ms.is_none());
        assert!(config.max_live_instances.is_none());
    }

    #[test]
    fn test_round_trips_through_serde() {
        let config = RuntimeConfig::default()
            .with_review_deadline_ms(60_000)
            .with_max_live_instances(32);
        let json = serde_json::to_string(&config).unwrap();
        let back: RuntimeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.review_deadline_ms, Some(60_000));
        assert_eq!(back.max_live_instances, Some(32));
    }

    #[test]
    fn test_deserializes_from_empty_object() {
        let config: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert!(config.max_live_instances.is_none());
    }
}
