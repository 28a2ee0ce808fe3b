//! The tag registry (C1, spec.md §4.1): identity, definitions, and
//! state-set lifecycle.
//!
//! Grounded on the teacher's `storage::catalog::Dict`: a name index kept
//! alongside the primary map, normalized at insert time the way the
//! teacher's dictionary interns strings once and looks them up by a
//! normalized key thereafter. Readers clone an `Arc<TagDefinition>` out from
//! under a read lock rather than holding the lock across the call — the
//! "versioned snapshot" spec.md promises without a separate MVCC layer,
//! since tag metadata churns far less than the sample write path.

pub mod filter_query;
pub mod stateset;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{info, trace};

use crate::error::CoreError;
use crate::model::uuid_like::TagId;
use crate::model::{DataType, Page, StateSet, TagDefinition, TagFilter, TagSettings};

/// Errors specific to registry operations, narrower than [`CoreError`] at
/// the call site, mapped onto it at the crate boundary.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegistryError {
    /// A tag or state-set name is already taken (case-insensitively).
    #[error("name already in use: {0}")]
    NameTaken(String),
    /// The requested `data_type`/`state_set_name` combination is invalid.
    #[error("invalid tag type configuration: {0}")]
    InvalidType(String),
    /// A `State`-typed tag named a state set that does not exist.
    #[error("unknown state set: {0}")]
    UnknownStateSet(String),
    /// The principal may not perform this operation.
    #[error("unauthorized")]
    Unauthorized,
    /// The tag or state set does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),
    /// The mutation would violate a registry invariant.
    #[error("conflict: {0}")]
    Conflict(String),
    /// A state set delete was attempted while still referenced by tags.
    #[error("state set {0} is still referenced by tags")]
    ReferencedByTags(String),
}

impl From<RegistryError> for CoreError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NameTaken(m) => CoreError::Conflict(m),
            RegistryError::InvalidType(m) => CoreError::Validation(m),
            RegistryError::UnknownStateSet(m) => CoreError::Validation(m),
            RegistryError::Unauthorized => CoreError::Unauthorized,
            RegistryError::NotFound(w) => CoreError::NotFound(w),
            RegistryError::Conflict(m) => CoreError::Conflict(m),
            RegistryError::ReferencedByTags(m) => CoreError::Conflict(m),
        }
    }
}

type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// A boolean authorization hook: `(principal) -> allowed`. The core treats
/// policy evaluation itself as an external collaborator (spec.md §1); this
/// is the narrow seam it calls through.
pub type AuthorizeFn = Arc<dyn Fn(&str) -> bool + Send + Sync>;

fn normalize(name: &str) -> String {
    name.to_ascii_lowercase()
}

struct RegistryInner {
    tags: HashMap<TagId, Arc<TagDefinition>>,
    name_index: HashMap<String, TagId>,
    state_sets: HashMap<String, Arc<StateSet>>,
    state_set_refs: HashMap<String, usize>,
}

impl RegistryInner {
    fn new() -> Self {
        Self {
            tags: HashMap::new(),
            name_index: HashMap::new(),
            state_sets: HashMap::new(),
            state_set_refs: HashMap::new(),
        }
    }
}

/// Owns tag definitions and state-set definitions for a historian instance.
#[derive(Clone)]
pub struct TagRegistry {
    inner: Arc<RwLock<RegistryInner>>,
    authorize: AuthorizeFn,
}

impl Default for TagRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TagRegistry {
    /// A registry that authorizes every principal unconditionally, suitable
    /// when the embedding application enforces authorization elsewhere.
    pub fn new() -> Self {
        Self::with_authorizer(Arc::new(|_principal: &str| true))
    }

    /// A registry whose admin operations are gated by `authorize`.
    pub fn with_authorizer(authorize: AuthorizeFn) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegistryInner::new())),
            authorize,
        }
    }

    fn check_authorized(&self, principal: &str) -> RegistryResult<()> {
        if (self.authorize)(principal) {
            Ok(())
        } else {
            Err(RegistryError::Unauthorized)
        }
    }

    /// Creates a new tag. See spec.md §4.1.
    pub fn create(&self, principal: &str, settings: TagSettings) -> RegistryResult<TagDefinition> {
        self.check_authorized(principal)?;
        if settings.name.trim().is_empty() {
            return Err(RegistryError::InvalidType("tag name must not be empty".into()));
        }
        if settings.data_type == DataType::State && settings.state_set_name.is_none() {
            return Err(RegistryError::InvalidType(
                "State-typed tags require state_set_name".into(),
            ));
        }
        if settings.data_type != DataType::State && settings.state_set_name.is_some() {
            return Err(RegistryError::InvalidType(
                "only State-typed tags may reference a state set".into(),
            ));
        }

        let mut inner = self.inner.write();
        let key = normalize(&settings.name);
        if inner.name_index.contains_key(&key) {
            return Err(RegistryError::NameTaken(settings.name.clone()));
        }
        if let Some(set_name) = &settings.state_set_name {
            if !inner.state_sets.contains_key(&normalize(set_name)) {
                return Err(RegistryError::UnknownStateSet(set_name.clone()));
            }
        }

        let now = chrono::Utc::now();
        let id = TagId::new();
        let def = TagDefinition {
            id,
            name: settings.name.clone(),
            data_type: settings.data_type,
            units: settings.units,
            description: settings.description,
            state_set_name: settings.state_set_name.clone(),
            exception_cfg: settings.exception_cfg,
            compression_cfg: settings.compression_cfg,
            metadata: crate::model::Metadata {
                created_at: now,
                creator: principal.to_string(),
                modified_at: now,
                modifier: principal.to_string(),
            },
            security: crate::model::Security {
                owner: settings.owner,
                policies: settings.policies,
            },
        };
        inner.tags.insert(id, Arc::new(def.clone()));
        inner.name_index.insert(key, id);
        if let Some(set_name) = &settings.state_set_name {
            *inner.state_set_refs.entry(normalize(set_name)).or_insert(0) += 1;
        }
        info!(tag = %def.name, %id, "tag.created");
        Ok(def)
    }

    /// Updates an existing tag. See spec.md §4.1.
    pub fn update(&self, principal: &str, id: TagId, settings: TagSettings) -> RegistryResult<TagDefinition> {
        self.check_authorized(principal)?;
        let mut inner = self.inner.write();
        let existing = inner
            .tags
            .get(&id)
            .cloned()
            .ok_or(RegistryError::NotFound("tag"))?;

        let new_key = normalize(&settings.name);
        let old_key = normalize(&existing.name);
        if new_key != old_key && inner.name_index.contains_key(&new_key) {
            return Err(RegistryError::Conflict(format!(
                "name '{}' already in use",
                settings.name
            )));
        }
        if settings.data_type == DataType::State && settings.state_set_name.is_none() {
            return Err(RegistryError::Conflict(
                "State-typed tags require state_set_name".into(),
            ));
        }
        if settings.data_type != DataType::State && settings.state_set_name.is_some() {
            return Err(RegistryError::Conflict(
                "only State-typed tags may reference a state set".into(),
            ));
        }
        if let Some(set_name) = &settings.state_set_name {
            if !inner.state_sets.contains_key(&normalize(set_name)) {
                return Err(RegistryError::UnknownStateSet(set_name.clone()));
            }
        }

        let mut updated = (*existing).clone();
        if let Some(old_set) = &existing.state_set_name {
            if let Some(count) = inner.state_set_refs.get_mut(&normalize(old_set)) {
                *count = count.saturating_sub(1);
            }
        }
        updated.name = settings.name;
        updated.data_type = settings.data_type;
        updated.units = settings.units;
        updated.description = settings.description;
        updated.state_set_name = settings.state_set_name.clone();
        updated.exception_cfg = settings.exception_cfg;
        updated.compression_cfg = settings.compression_cfg;
        updated.security = crate::model::Security {
            owner: settings.owner,
            policies: settings.policies,
        };
        updated.metadata.modified_at = chrono::Utc::now();
        updated.metadata.modifier = principal.to_string();

        if new_key != old_key {
            inner.name_index.remove(&old_key);
            inner.name_index.insert(new_key, id);
        }
        if let Some(set_name) = &updated.state_set_name {
            *inner.state_set_refs.entry(normalize(set_name)).or_insert(0) += 1;
        }
        inner.tags.insert(id, Arc::new(updated.clone()));
        info!(tag = %updated.name, %id, "tag.updated");
        Ok(updated)
    }

    /// Deletes a tag. Any in-flight write for this id must subsequently
    /// fail with `Deleted` (enforced by [`crate::pipeline`], not here).
    pub fn delete(&self, principal: &str, id: TagId) -> RegistryResult<()> {
        self.check_authorized(principal)?;
        let mut inner = self.inner.write();
        let def = inner.tags.remove(&id).ok_or(RegistryError::NotFound("tag"))?;
        inner.name_index.remove(&normalize(&def.name));
        if let Some(set_name) = &def.state_set_name {
            if let Some(count) = inner.state_set_refs.get_mut(&normalize(set_name)) {
                *count = count.saturating_sub(1);
            }
        }
        info!(tag = %def.name, %id, "tag.deleted");
        Ok(())
    }

    /// Resolves a tag by case-insensitive name.
    pub fn resolve(&self, name: &str) -> Option<TagDefinition> {
        let inner = self.inner.read();
        let id = inner.name_index.get(&normalize(name))?;
        trace!(name, "registry.resolve.hit");
        inner.tags.get(id).map(|d| (**d).clone())
    }

    /// Resolves a tag by id.
    pub fn resolve_id(&self, id: TagId) -> Option<TagDefinition> {
        self.inner.read().tags.get(&id).map(|d| (**d).clone())
    }

    /// Lists tags matching `filter`, sorted by `(name_ci, id)`, paginated.
    pub fn list(&self, filter: &TagFilter, page: Page) -> RegistryResult<Vec<TagDefinition>> {
        if !(1..=100).contains(&page.page_size) || page.page < 1 {
            return Err(RegistryError::InvalidType("page_size must be in [1,100] and page >= 1".into()));
        }
        let inner = self.inner.read();
        let mut matched: Vec<&Arc<TagDefinition>> = inner
            .tags
            .values()
            .filter(|def| filter_query::matches(filter, def))
            .collect();
        matched.sort_by(|a, b| {
            normalize(&a.name)
                .cmp(&normalize(&b.name))
                .then_with(|| a.id.cmp(&b.id))
        });
        let start = (page.page - 1) * page.page_size;
        Ok(matched
            .into_iter()
            .skip(start)
            .take(page.page_size)
            .map(|d| (**d).clone())
            .collect())
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FilterConfig;

    fn settings(name: &str) -> TagSettings {
        TagSettings {
            name: name.to_string(),
            data_type: DataType::FloatingPoint,
            units: "degC".into(),
            description: String::new(),
            state_set_name: None,
            exception_cfg: FilterConfig::disabled(),
            compression_cfg: FilterConfig::disabled(),
            owner: "tester".into(),
            policies: vec![],
        }
    }

    #[test]
    fn name_uniqueness_is_case_insensitive() {
        let registry = TagRegistry::new();
        registry.create("tester", settings("Reactor.Temp")).unwrap();
        let err = registry.create("tester", settings("reactor.temp")).unwrap_err();
        assert!(matches!(err, RegistryError::NameTaken(_)));
    }

    #[test]
    fn resolve_is_case_insensitive() {
        let registry = TagRegistry::new();
        registry.create("tester", settings("Reactor.Temp")).unwrap();
        assert!(registry.resolve("REACTOR.TEMP").is_some());
    }

    #[test]
    fn state_tag_requires_known_state_set() {
        let registry = TagRegistry::new();
        let mut s = settings("Valve.State");
        s.data_type = DataType::State;
        s.state_set_name = Some("OpenClosed".into());
        let err = registry.create("tester", s).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownStateSet(_)));
    }

    #[test]
    fn delete_state_set_fails_while_referenced() {
        let registry = TagRegistry::new();
        registry
            .create_state_set(
                "tester",
                StateSet {
                    name: "OpenClosed".into(),
                    members: vec![("Open".into(), 1), ("Closed".into(), 0)],
                },
            )
            .unwrap();
        let mut s = settings("Valve.State");
        s.data_type = DataType::State;
        s.state_set_name = Some("OpenClosed".into());
        registry.create("tester", s).unwrap();

        let err = registry.delete_state_set("tester", "OpenClosed").unwrap_err();
        assert!(matches!(err, RegistryError::ReferencedByTags(_)));
    }

    #[test]
    fn pagination_orders_by_name_then_id() {
        let registry = TagRegistry::new();
        for n in ["Charlie", "alpha", "Bravo"] {
            registry.create("tester", settings(n)).unwrap();
        }
        let page = registry
            .list(&TagFilter::Any, Page { page_size: 10, page: 1 })
            .unwrap();
        let names: Vec<_> = page.iter().map(|d| d.name.clone()).collect();
        assert_eq!(names, vec!["alpha", "Bravo", "Charlie"]);
    }

    #[test]
    fn unauthorized_principal_is_rejected() {
        let registry = TagRegistry::with_authorizer(Arc::new(|p: &str| p == "admin"));
        let err = registry.create("guest", settings("X")).unwrap_err();
        assert_eq!(err, RegistryError::Unauthorized);
    }

    /// spec.md §3: `state_set_name` is required *iff* `data_type == State`.
    /// `update()` must reject attaching a state set to a non-`State` tag the
    /// same way `create()` already does.
    #[test]
    fn update_rejects_state_set_on_non_state_tag() {
        let registry = TagRegistry::new();
        registry
            .create_state_set(
                "tester",
                StateSet {
                    name: "OpenClosed".into(),
                    members: vec![("Open".into(), 1), ("Closed".into(), 0)],
                },
            )
            .unwrap();
        let def = registry.create("tester", settings("Reactor.Temp")).unwrap();

        let mut update = settings("Reactor.Temp");
        update.state_set_name = Some("OpenClosed".into());
        let err = registry.update("tester", def.id, update).unwrap_err();
        assert!(matches!(err, RegistryError::Conflict(_)));
    }
}
