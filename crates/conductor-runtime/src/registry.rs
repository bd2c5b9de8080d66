//! Adapter registry: capability-keyed backend resolution
//!
//! The registry is read-mostly: lookups happen on every stage attempt,
//! mutation only when adapters are registered or deregistered. The lock is
//! held only for the map access, never across an adapter call. Selection
//! among multiple eligible adapters is round-robin by default.

use crate::BackendAdapter;
use conductor_types::BackendRole;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Default)]
struct RoleEntry {
    adapters: Vec<Arc<dyn BackendAdapter>>,
    /// Round-robin cursor for this role
    cursor: AtomicUsize,
}

/// Registry of backend adapters, keyed by capability role
#[derive(Default)]
pub struct AdapterRegistry {
    roles: RwLock<HashMap<BackendRole, RoleEntry>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under every role it declares
    pub fn register(&self, adapter: Arc<dyn BackendAdapter>) {
        let mut roles = self.roles.write().unwrap_or_else(PoisonError::into_inner);
        for role in adapter.roles() {
            roles
                .entry(*role)
                .or_default()
                .adapters
                .push(Arc::clone(&adapter));
        }
        tracing::info!(adapter_id = adapter.id(), "Backend adapter registered");
    }

    /// Remove an adapter from every role
    pub fn deregister(&self, adapter_id: &str) {
        let mut roles = self.roles.write().unwrap_or_else(PoisonError::into_inner);
        for entry in roles.values_mut() {
            entry.adapters.retain(|a| a.id() != adapter_id);
        }
        tracing::info!(adapter_id, "Backend adapter deregistered");
    }

    /// Resolve one eligible adapter for a role, skipping excluded ids.
    ///
    /// Eligible adapters are tried round-robin so load spreads across
    /// equivalent backends. Returns `None` when no adapter declaring the
    /// role remains after exclusion.
    pub fn resolve(&self, role: BackendRole, exclude: &[String]) -> Option<Arc<dyn BackendAdapter>> {
        let roles = self.roles.read().unwrap_or_else(PoisonError::into_inner);
        let entry = roles.get(&role)?;
        let n = entry.adapters.len();
        if n == 0 {
            return None;
        }

        let start = entry.cursor.fetch_add(1, Ordering::Relaxed);
        (0..n)
            .map(|i| &entry.adapters[(start + i) % n])
            .find(|a| !exclude.iter().any(|e| e == a.id()))
            .map(Arc::clone)
    }

    /// All eligible adapters for a role (parallel fan-out)
    pub fn all_for(&self, role: BackendRole) -> Vec<Arc<dyn BackendAdapter>> {
        let roles = self.roles.read().unwrap_or_else(PoisonError::into_inner);
        roles
            .get(&role)
            .map(|e| e.adapters.clone())
            .unwrap_or_default()
    }

    /// Whether an adapter for the role exists outside the excluded set
    pub fn has_alternate(&self, role: BackendRole, exclude: &[String]) -> bool {
        let roles = self.roles.read().unwrap_or_else(PoisonError::into_inner);
        roles
            .get(&role)
            .map(|e| {
                e.adapters
                    .iter()
                    .any(|a| !exclude.iter().any(|x| x == a.id()))
            })
            .unwrap_or(false)
    }

    /// Number of adapters registered for a role
    pub fn count_for(&self, role: BackendRole) -> usize {
        let roles = self.roles.read().unwrap_or_else(PoisonError::into_inner);
        roles.get(&role).map(|e| e.adapters.len()).unwrap_or(0)
    }
}
