//! World configuration.

use smallvec::SmallVec;

use crate::{
    Component,
    component::{ComponentId, component_id},
};

/// Components added to every query built against a world, unless the
/// query opts out.
///
/// Useful for cross-cutting markers such as a `Disabled` tag that most
/// systems should never see.
#[derive(Clone, Debug, Default)]
pub struct QueryGlobals {
    required: SmallVec<[ComponentId; 4]>,
    ignored: SmallVec<[ComponentId; 4]>,
}

impl QueryGlobals {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every query also requires `T`.
    #[must_use]
    pub fn require<T: Component>(mut self) -> Self {
        let id = component_id::<T>();
        if !self.required.contains(&id) {
            self.required.push(id);
        }
        self
    }

    /// Every query also excludes `T`.
    #[must_use]
    pub fn ignore<T: Component>(mut self) -> Self {
        let id = component_id::<T>();
        if !self.ignored.contains(&id) {
            self.ignored.push(id);
        }
        self
    }

    #[must_use]
    pub fn required(&self) -> &[ComponentId] {
        &self.required
    }

    #[must_use]
    pub fn ignored(&self) -> &[ComponentId] {
        &self.ignored
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.required.is_empty() && self.ignored.is_empty()
    }
}

/// Settings fixed when a [`World`](crate::World) is created.
#[derive(Clone, Debug)]
pub struct WorldConfig {
    /// Entity slots to reserve up front.
    pub entity_capacity: usize,
    /// Terms appended to every query.
    pub query_globals: QueryGlobals,
    /// Check that components requested by an executor agree with its
    /// filter. Queries can still opt out one by one.
    pub validate_queries: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            entity_capacity: 1024,
            query_globals: QueryGlobals::default(),
            validate_queries: true,
        }
    }
}

impl WorldConfig {
    #[must_use]
    pub fn with_entity_capacity(mut self, capacity: usize) -> Self {
        self.entity_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_query_globals(mut self, globals: QueryGlobals) -> Self {
        self.query_globals = globals;
        self
    }

    #[must_use]
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate_queries = validate;
        self
    }
}
