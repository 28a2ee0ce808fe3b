//! State-set CRUD (spec.md §4.1 "State-set operations mirror the tag
//! operations"), split out from the tag-definition operations in
//! [`super`] so each file stays focused on one kind of managed object —
//! the way the teacher keeps `storage/graph/{node_ops,edge_ops}.rs` apart.

use std::sync::Arc;

use crate::model::StateSet;

use super::{normalize, RegistryError, RegistryResult, TagRegistry};

impl TagRegistry {
    /// Creates a state set. See spec.md §4.1.
    pub fn create_state_set(&self, principal: &str, set: StateSet) -> RegistryResult<StateSet> {
        self.check_authorized(principal)?;
        if !set.validate() {
            return Err(RegistryError::Conflict("state set member values must be unique".into()));
        }
        let mut inner = self.inner.write();
        let key = normalize(&set.name);
        if inner.state_sets.contains_key(&key) {
            return Err(RegistryError::NameTaken(set.name.clone()));
        }
        inner.state_sets.insert(key, Arc::new(set.clone()));
        Ok(set)
    }

    /// Replaces a state set's contents wholesale. The set must already
    /// exist; tags referencing it by name are unaffected (the reference is
    /// by name, not by value, per spec.md §3).
    pub fn replace_state_set(&self, principal: &str, set: StateSet) -> RegistryResult<StateSet> {
        self.check_authorized(principal)?;
        if !set.validate() {
            return Err(RegistryError::Conflict("state set member values must be unique".into()));
        }
        let mut inner = self.inner.write();
        let key = normalize(&set.name);
        if !inner.state_sets.contains_key(&key) {
            return Err(RegistryError::NotFound("state set"));
        }
        inner.state_sets.insert(key, Arc::new(set.clone()));
        Ok(set)
    }

    /// Deletes a state set, refusing while it is still referenced by any tag
    /// (spec.md §4.1 "delete(state_set) fails with ReferencedByTags").
    pub fn delete_state_set(&self, principal: &str, name: &str) -> RegistryResult<()> {
        self.check_authorized(principal)?;
        let mut inner = self.inner.write();
        let key = normalize(name);
        if !inner.state_sets.contains_key(&key) {
            return Err(RegistryError::NotFound("state set"));
        }
        if inner.state_set_refs.get(&key).copied().unwrap_or(0) > 0 {
            return Err(RegistryError::ReferencedByTags(name.to_string()));
        }
        inner.state_sets.remove(&key);
        Ok(())
    }

    /// Resolves a state set by name.
    pub fn resolve_state_set(&self, name: &str) -> Option<StateSet> {
        self.inner.read().state_sets.get(&normalize(name)).map(|s| (**s).clone())
    }
}
