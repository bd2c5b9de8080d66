//! Definition registry: stores and retrieves workflow definitions
//!
//! Definitions are immutable once registered; to modify one, register a
//! new version under the same name. Registration runs validation — this is
//! where bad configuration fails, as a fail-fast guarantee, so execution
//! never encounters a rule referencing an unknown stage or role.

use conductor_types::{
    WorkflowDefinition, WorkflowDefinitionId, WorkflowError, WorkflowResult,
};
use std::collections::HashMap;

/// Registry of validated workflow definitions
#[derive(Clone, Debug, Default)]
pub struct DefinitionRegistry {
    /// All registered definitions, keyed by ID
    definitions: HashMap<WorkflowDefinitionId, WorkflowDefinition>,
    /// Index by name → definition IDs in registration order (versioning)
    by_name: HashMap<String, Vec<WorkflowDefinitionId>>,
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and store a definition. Returns its ID.
    pub fn register(
        &mut self,
        definition: WorkflowDefinition,
    ) -> WorkflowResult<WorkflowDefinitionId> {
        definition.validate()?;

        let id = definition.id.clone();
        let name = definition.name.clone();

        self.definitions.insert(id.clone(), definition);
        self.by_name.entry(name).or_default().push(id.clone());

        tracing::info!(definition_id = %id, "Workflow definition registered");
        Ok(id)
    }

    /// Get a definition by ID
    pub fn get(&self, id: &WorkflowDefinitionId) -> WorkflowResult<&WorkflowDefinition> {
        self.definitions
            .get(id)
            .ok_or_else(|| WorkflowError::DefinitionNotFound(id.clone()))
    }

    /// Get the most recently registered definition with this name
    pub fn get_latest_by_name(&self, name: &str) -> Option<&WorkflowDefinition> {
        self.by_name
            .get(name)
            .and_then(|ids| ids.last())
            .and_then(|id| self.definitions.get(id))
    }

    /// List all registered definitions
    pub fn list(&self) -> Vec<&WorkflowDefinition> {
        self.definitions.values().collect()
    }

    /// Total number of registered definitions
    pub fn count(&self) -> usize {
        self.definitions.len()
    }

    pub fn contains(&self, id: &WorkflowDefinitionId) -> bool {
        self.definitions.contains_key(id)
    }

    /// Remove a definition
    pub fn remove(&mut self, id: &WorkflowDefinitionId) -> WorkflowResult<WorkflowDefinition> {
        let def = self
            .definitions
            .remove(id)
            .ok_or_else(|| WorkflowError::DefinitionNotFound(id.clone()))?;

        if let Some(ids) = self.by_name.get_mut(&def.name) {
            ids.retain(|i| i != id);
            if ids.is_empty() {
                self.by_name.remove(&def.name);
            }
        }

        tracing::info!(definition_id = %id, "Workflow definition removed");
        Ok(def)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_types::{BackendRole, StageTemplate};

    fn make_definition(name: &str) -> WorkflowDefinition {
        WorkflowDefinition::new(name)
            .with_stage(StageTemplate::new("classify", BackendRole::Classification))
            .with_stage(StageTemplate::new("summarize", BackendRole::Generation))
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = DefinitionRegistry::new();
        let id = registry.register(make_definition("Pipeline")).unwrap();

        assert_eq!(registry.get(&id).unwrap().name, "Pipeline");
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_register_rejects_invalid() {
        let mut registry = DefinitionRegistry::new();
        // No stages at all
        let result = registry.register(WorkflowDefinition::new("Bad"));
        assert!(matches!(result, Err(WorkflowError::Configuration(_))));
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_versioning_by_name() {
        let mut registry = DefinitionRegistry::new();
        registry.register(make_definition("Pipeline")).unwrap();
        let id2 = registry.register(make_definition("Pipeline")).unwrap();

        let latest = registry.get_latest_by_name("Pipeline").unwrap();
        assert_eq!(latest.id, id2);
        assert!(registry.get_latest_by_name("Other").is_none());
    }

    #[test]
    fn test_remove() {
        let mut registry = DefinitionRegistry::new();
        let id = registry.register(make_definition("Gone")).unwrap();

        assert!(registry.contains(&id));
        registry.remove(&id).unwrap();
        assert!(!registry.contains(&id));
        assert!(registry.get_latest_by_name("Gone").is_none());
    }

    #[test]
    fn test_get_nonexistent() {
        let registry = DefinitionRegistry::new();
        let result = registry.get(&WorkflowDefinitionId::new("missing"));
        assert!(matches!(result, Err(WorkflowError::DefinitionNotFound(_))));
    }
}
